//! Two-peer relay router
//!
//! Cross-wires two peers so every frame read from one peer's channel is
//! written, unchanged, to the same channel of the other peer:
//!
//! ```text
//! peer A video reader ──► Forwarder ──► peer B video writer
//! peer A audio reader ──► Forwarder ──► peer B audio writer
//! peer B video reader ──► Forwarder ──► peer A video writer
//! peer B audio reader ──► Forwarder ──► peer A audio writer
//! ```
//!
//! The reader of one peer and the writer of the other live in the same
//! receive task, so transports are never shared and never locked.

use std::collections::HashMap;
use std::future::Future;

use crate::error::Result;
use crate::session::{
    BoxedWriter, Channel, ChannelKind, PeerId, PeerSession, SessionConfig,
    SessionOutcome,
};
use crate::stats::SessionStats;

use super::error::RoutingError;
use super::forward::Forwarder;
use super::table::RoutingTable;

/// Both channels of one connected peer
#[derive(Debug)]
pub struct PeerLink {
    pub id: PeerId,
    pub video: Channel,
    pub audio: Channel,
}

/// How each session of a relayed pair ended
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub outcomes: [(PeerId, SessionOutcome); 2],
}

impl RelayOutcome {
    /// Whether either session ended with an error
    pub fn is_failure(&self) -> bool {
        self.outcomes.iter().any(|(_, outcome)| outcome.is_failure())
    }
}

struct WriteHalves {
    video: BoxedWriter,
    audio: BoxedWriter,
}

/// Relays media between exactly two peer sessions
pub struct RelayRouter {
    table: RoutingTable,
    sessions: [PeerSession; 2],
}

impl RelayRouter {
    /// Pair two peers and start relaying between them
    ///
    /// The routing table is complete before any receive loop starts.
    pub fn new(a: PeerLink, b: PeerLink, config: SessionConfig) -> Result<Self> {
        let table = RoutingTable::pair(a.id, b.id)?;
        let mut sessions = [
            PeerSession::new(a.id, config.clone()),
            PeerSession::new(b.id, config),
        ];

        let mut readers = Vec::with_capacity(RoutingTable::CAPACITY);
        let mut writers = HashMap::with_capacity(RoutingTable::CAPACITY);
        for link in [a, b] {
            tracing::debug!(
                peer = %link.id,
                video_addr = ?link.video.peer_addr(),
                audio_addr = ?link.audio.peer_addr(),
                "Wiring peer"
            );
            let (video_reader, video_writer) = link.video.into_split();
            let (audio_reader, audio_writer) = link.audio.into_split();
            readers.push((link.id, video_reader, audio_reader));
            writers.insert(
                link.id,
                WriteHalves {
                    video: video_writer,
                    audio: audio_writer,
                },
            );
        }

        for (from, video_reader, audio_reader) in readers {
            let to = table.destination(from)?;
            let halves = writers.remove(&to).ok_or(RoutingError::UnknownPeer(to))?;
            let (source, destination) = split_pair(&mut sessions, from, to)?;

            let video = forwarder(destination, ChannelKind::Video, halves.video);
            let audio = forwarder(destination, ChannelKind::Audio, halves.audio);
            source.start_receivers(video_reader, video, audio_reader, audio)?;
        }

        tracing::info!(first = %sessions[0].id(), second = %sessions[1].id(), "Relay pair started");

        Ok(Self { table, sessions })
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Relay until either session ends, then stop both
    pub async fn run(self) -> RelayOutcome {
        self.run_until(std::future::pending()).await
    }

    /// Relay until either session ends or `shutdown` resolves, then stop both
    pub async fn run_until<F>(mut self, shutdown: F) -> RelayOutcome
    where
        F: Future<Output = ()>,
    {
        let [first, second] = &mut self.sessions;

        tokio::select! {
            outcome = first.ended() => {
                tracing::info!(
                    peer = %first.id(),
                    outcome = ?outcome,
                    "Session ended, stopping pair"
                );
            }
            outcome = second.ended() => {
                tracing::info!(
                    peer = %second.id(),
                    outcome = ?outcome,
                    "Session ended, stopping pair"
                );
            }
            _ = shutdown => {
                tracing::info!("Shutdown requested, stopping pair");
            }
        }

        let (first_outcome, second_outcome) = tokio::join!(first.stop(), second.stop());
        RelayOutcome {
            outcomes: [(first.id(), first_outcome), (second.id(), second_outcome)],
        }
    }

    /// Per-peer statistics
    pub fn stats(&self) -> [(PeerId, SessionStats); 2] {
        let [first, second] = &self.sessions;
        [(first.id(), first.stats()), (second.id(), second.stats())]
    }
}

/// Source session mutably, destination session shared
fn split_pair(
    sessions: &mut [PeerSession; 2],
    from: PeerId,
    to: PeerId,
) -> std::result::Result<(&mut PeerSession, &PeerSession), RoutingError> {
    let [first, second] = sessions;
    if first.id() == from && second.id() == to {
        Ok((first, &*second))
    } else if second.id() == from && first.id() == to {
        Ok((second, &*first))
    } else {
        Err(RoutingError::UnknownPeer(from))
    }
}

fn forwarder(destination: &PeerSession, kind: ChannelKind, writer: BoxedWriter) -> Forwarder {
    let config = match kind {
        ChannelKind::Video => &destination.config().video,
        ChannelKind::Audio => &destination.config().audio,
    };
    Forwarder::new(
        destination.id(),
        kind,
        writer,
        config,
        destination.worker(kind).stats(),
    )
}
