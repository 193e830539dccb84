//! Worker and session state machines
//!
//! A channel worker moves through:
//!
//! ```text
//! Idle ──start──► Running ──request_stop──► StopRequested ──loops exit──► Stopped
//!                    └──────────────── loops end on their own ───────────────┘
//! ```
//!
//! `Stopped` is terminal; a worker is never restarted.

use std::sync::Arc;

use crate::error::Error;

use super::context::{ChannelKind, Direction, LoopContext};

/// Channel worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, no loop spawned yet
    Idle,
    /// At least one loop running
    Running,
    /// Stop signalled, waiting for loops to exit
    StopRequested,
    /// All loops exited, transport and devices released
    Stopped,
}

impl WorkerState {
    /// Whether new loops may still be spawned
    pub fn can_start(&self) -> bool {
        matches!(self, WorkerState::Idle | WorkerState::Running)
    }

    /// State after a stop request
    pub fn on_stop_requested(self) -> WorkerState {
        match self {
            WorkerState::Idle => WorkerState::Stopped,
            WorkerState::Running => WorkerState::StopRequested,
            other => other,
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self == WorkerState::Stopped
    }
}

/// How a single channel loop ended
#[derive(Debug)]
pub enum LoopOutcome {
    /// Stop was requested
    Stopped,
    /// The media source has nothing more to send
    Exhausted,
    /// The remote end closed the connection
    Closed,
    /// Unrecoverable error
    Failed(Error),
}

impl LoopOutcome {
    /// Whether this outcome ends the owning session
    pub fn ends_session(&self) -> bool {
        matches!(self, LoopOutcome::Closed | LoopOutcome::Failed(_))
    }
}

/// Report from a finished channel loop to its session
#[derive(Debug)]
pub struct WorkerEvent {
    pub context: LoopContext,
    pub outcome: LoopOutcome,
}

/// Why a peer session ended
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// Stopped locally
    Completed,
    /// The remote peer closed one of its channels
    PeerClosed { kind: ChannelKind },
    /// A channel loop failed
    Failed {
        kind: ChannelKind,
        direction: Direction,
        error: Arc<Error>,
    },
}

impl SessionOutcome {
    /// Whether the session ended because of an error
    pub fn is_failure(&self) -> bool {
        matches!(self, SessionOutcome::Failed { .. })
    }

    /// Build the session outcome for a loop outcome that ends the session
    pub fn from_event(event: WorkerEvent) -> Option<SessionOutcome> {
        match event.outcome {
            LoopOutcome::Closed => Some(SessionOutcome::PeerClosed {
                kind: event.context.kind,
            }),
            LoopOutcome::Failed(error) => Some(SessionOutcome::Failed {
                kind: event.context.kind,
                direction: event.context.direction,
                error: Arc::new(error),
            }),
            LoopOutcome::Stopped | LoopOutcome::Exhausted => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::context::PeerId;

    #[test]
    fn test_worker_state_transitions() {
        assert!(WorkerState::Idle.can_start());
        assert!(WorkerState::Running.can_start());
        assert!(!WorkerState::StopRequested.can_start());
        assert!(!WorkerState::Stopped.can_start());

        assert_eq!(WorkerState::Idle.on_stop_requested(), WorkerState::Stopped);
        assert_eq!(
            WorkerState::Running.on_stop_requested(),
            WorkerState::StopRequested
        );
        assert_eq!(
            WorkerState::StopRequested.on_stop_requested(),
            WorkerState::StopRequested
        );
        assert_eq!(WorkerState::Stopped.on_stop_requested(), WorkerState::Stopped);
    }

    #[test]
    fn test_session_outcome_from_event() {
        let context = LoopContext {
            peer: PeerId(0),
            kind: ChannelKind::Video,
            direction: Direction::Receive,
        };

        let closed = WorkerEvent {
            context,
            outcome: LoopOutcome::Closed,
        };
        assert!(closed.outcome.ends_session());
        assert!(matches!(
            SessionOutcome::from_event(closed),
            Some(SessionOutcome::PeerClosed {
                kind: ChannelKind::Video
            })
        ));

        let failed = WorkerEvent {
            context,
            outcome: LoopOutcome::Failed(Error::ConnectionClosed),
        };
        let outcome = SessionOutcome::from_event(failed).unwrap();
        assert!(outcome.is_failure());

        let stopped = WorkerEvent {
            context,
            outcome: LoopOutcome::Stopped,
        };
        assert!(!stopped.outcome.ends_session());
        assert!(SessionOutcome::from_event(stopped).is_none());
    }
}
