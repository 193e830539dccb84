//! Two-party duplex video/audio relay
//!
//! Two peers connect to a rendezvous server, each with one video and one
//! audio TCP connection. The server forwards every frame from one peer to the
//! same channel of the other, verbatim and without buffering.
//!
//! # Architecture
//!
//! ```text
//! peer 0                      relay server                       peer 1
//! video ──► receive loop ──► Forwarder ──────────────────────► video
//! audio ──► receive loop ──► Forwarder ──────────────────────► audio
//! video ◄──────────────────────── Forwarder ◄── receive loop ◄── video
//! audio ◄──────────────────────── Forwarder ◄── receive loop ◄── audio
//! ```
//!
//! Every channel carries length-prefixed frames (see [`protocol`]). Each
//! channel is driven by a [`session::ChannelWorker`] running an independent
//! send loop and receive loop, so a stall in one direction or on one channel
//! never blocks another.
//!
//! # Example
//!
//! ```no_run
//! use avrelay::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> avrelay::Result<()> {
//!     let server = RelayServer::bind(ServerConfig::default()).await?;
//!     server.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await
//! }
//! ```

pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;

pub use client::{ClientConfig, PeerClient};
pub use error::{Error, Result};
pub use relay::{RelayRouter, RoutingTable};
pub use server::{RelayServer, ServerConfig};
pub use session::{ChannelKind, PeerId, PeerSession, SessionConfig, SessionOutcome, WorkerConfig};
pub use stats::{ChannelStatsSnapshot, SessionStats};
