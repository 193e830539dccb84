//! Server-side relay between two peers
//!
//! The relay never decodes media. A frame read on one peer's channel is
//! written verbatim to the same channel of the other peer, resolved through
//! a [`RoutingTable`] that is complete before the first frame is read.

pub mod error;
pub mod forward;
pub mod router;
pub mod table;

pub use error::RoutingError;
pub use forward::Forwarder;
pub use router::{PeerLink, RelayOutcome, RelayRouter};
pub use table::RoutingTable;
