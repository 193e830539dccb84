//! Per-peer media sessions
//!
//! A [`PeerSession`] owns one [`ChannelWorker`] per media channel. Each
//! worker runs a send loop and a receive loop over its own [`Channel`], and
//! reports how they ended to the session supervisor as [`WorkerEvent`]s.

pub mod channel;
pub mod config;
pub mod context;
pub mod peer;
pub mod state;
pub mod worker;

pub use channel::{BoxedReader, BoxedWriter, Channel};
pub use config::{SessionConfig, WorkerConfig};
pub use context::{ChannelKind, Direction, LoopContext, PeerId};
pub use peer::{PeerMedia, PeerSession};
pub use state::{LoopOutcome, SessionOutcome, WorkerEvent, WorkerState};
pub use worker::{ChannelReader, ChannelWriter, ChannelWorker, WorkerHandle};
