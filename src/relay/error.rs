//! Routing error types

use crate::session::PeerId;

/// Error type for routing table operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// Both slots of the table are taken
    TableFull,
    /// Peer already has a route
    DuplicatePeer(PeerId),
    /// Peer routed to itself
    SelfRoute(PeerId),
    /// No route for this peer
    UnknownPeer(PeerId),
    /// Lookup before both peers were registered
    Incomplete,
}

impl std::fmt::Display for RoutingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingError::TableFull => write!(f, "Routing table already holds two peers"),
            RoutingError::DuplicatePeer(peer) => write!(f, "Peer already routed: {}", peer),
            RoutingError::SelfRoute(peer) => write!(f, "Peer cannot route to itself: {}", peer),
            RoutingError::UnknownPeer(peer) => write!(f, "No route for peer: {}", peer),
            RoutingError::Incomplete => write!(f, "Routing table is not complete"),
        }
    }
}

impl std::error::Error for RoutingError {}
