//! Frame forwarding to the paired peer

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use crate::error::{Error, Result, TimeoutKind};
use crate::media::MediaSink;
use crate::protocol::FrameWriter;
use crate::session::{BoxedWriter, ChannelKind, ChannelWriter, PeerId, WorkerConfig};
use crate::stats::ChannelStats;

/// Sink writing every received frame, unchanged, to the destination peer
///
/// Runs inline in the source peer's receive loop, so at most one frame per
/// channel is in flight and nothing is queued. A destination that stops
/// reading holds up only this channel; the write is retried up to
/// `max_write_timeouts` times before the forward fails.
pub struct Forwarder {
    to: PeerId,
    kind: ChannelKind,
    writer: ChannelWriter,
    write_timeout: Duration,
    max_write_timeouts: u32,
    stats: Arc<ChannelStats>,
}

impl Forwarder {
    /// Forward into `writer`, the destination's write half for `kind`
    ///
    /// Sent frames are counted in `stats`, the destination channel's counters.
    pub fn new(
        to: PeerId,
        kind: ChannelKind,
        writer: BoxedWriter,
        config: &WorkerConfig,
        stats: Arc<ChannelStats>,
    ) -> Self {
        Self {
            to,
            kind,
            writer: FrameWriter::new(writer, config.max_frame_size),
            write_timeout: config.write_timeout,
            max_write_timeouts: config.max_write_timeouts,
            stats,
        }
    }

    pub fn destination(&self) -> PeerId {
        self.to
    }

    fn failed(&self, source: Error) -> Error {
        Error::Forward {
            to: self.to,
            source: Box::new(source),
        }
    }
}

impl MediaSink for Forwarder {
    async fn consume(&mut self, payload: Bytes) -> Result<()> {
        self.writer.queue_frame(&payload).map_err(|e| self.failed(e))?;

        let mut timeouts = 0u32;
        loop {
            match timeout(self.write_timeout, self.writer.flush()).await {
                Ok(Ok(())) => break,
                Ok(Err(e)) => return Err(self.failed(e)),
                Err(_) => {
                    self.stats.record_write_timeout();
                    timeouts += 1;
                    if timeouts >= self.max_write_timeouts {
                        return Err(self.failed(Error::Timeout(TimeoutKind::Write)));
                    }
                    tracing::warn!(
                        to = %self.to,
                        channel = %self.kind,
                        attempt = timeouts,
                        pending = self.writer.pending(),
                        "Destination not reading, retrying forward"
                    );
                }
            }
        }

        self.stats.record_sent(payload.len());
        tracing::trace!(
            to = %self.to,
            channel = %self.kind,
            size = payload.len(),
            "Frame forwarded"
        );
        Ok(())
    }
}
