//! Wire protocol
//!
//! Every media channel carries a sequence of length-prefixed frames:
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! |   length L (u32 big-endian)       |  payload  |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! The length excludes the header itself. Zero-length frames are legal.

pub mod codec;
pub mod constants;

pub use codec::{decode_frame, encode_header, read_frame, write_frame, FrameReader, FrameWriter};
