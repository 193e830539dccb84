//! Peer client
//!
//! Connects one participant to the rendezvous server and runs its video and
//! audio channels. [`DirectListener`] lets two participants call each other
//! without a server.

pub mod config;
pub mod direct;
pub mod peer;

pub use config::ClientConfig;
pub use direct::DirectListener;
pub use peer::{connect_channels, synthetic_media, PeerClient, SyntheticMedia};
