//! Two-peer routing table

use std::collections::HashMap;

use crate::session::PeerId;

use super::error::RoutingError;

/// Maps each peer to the peer its frames are forwarded to
///
/// Holds exactly two entries once complete. Lookups before that fail, so no
/// frame can be routed while one side is still missing.
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    routes: HashMap<PeerId, PeerId>,
}

impl RoutingTable {
    /// Number of peers a table routes between
    pub const CAPACITY: usize = 2;

    pub fn new() -> Self {
        Self::default()
    }

    /// Build a complete table routing `a` and `b` to each other
    pub fn pair(a: PeerId, b: PeerId) -> Result<Self, RoutingError> {
        let mut table = Self::new();
        table.insert(a, b)?;
        table.insert(b, a)?;
        Ok(table)
    }

    /// Add one directed route
    pub fn insert(&mut self, from: PeerId, to: PeerId) -> Result<(), RoutingError> {
        if from == to {
            return Err(RoutingError::SelfRoute(from));
        }
        if self.routes.contains_key(&from) {
            return Err(RoutingError::DuplicatePeer(from));
        }
        if self.routes.len() >= Self::CAPACITY {
            return Err(RoutingError::TableFull);
        }

        self.routes.insert(from, to);
        tracing::debug!(from = %from, to = %to, "Route added");
        Ok(())
    }

    /// Where frames arriving from `from` go
    pub fn destination(&self, from: PeerId) -> Result<PeerId, RoutingError> {
        if !self.is_complete() {
            return Err(RoutingError::Incomplete);
        }
        self.routes
            .get(&from)
            .copied()
            .ok_or(RoutingError::UnknownPeer(from))
    }

    /// Both peers are present and point at each other
    pub fn is_complete(&self) -> bool {
        self.routes.len() == Self::CAPACITY
            && self
                .routes
                .iter()
                .all(|(from, to)| self.routes.get(to) == Some(from))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
