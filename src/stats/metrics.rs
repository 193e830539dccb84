//! Statistics for media channels and peer sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters for one channel
///
/// Shared between a worker's send and receive loops, so every field is an
/// atomic and updates never block either direction.
#[derive(Debug)]
pub struct ChannelStats {
    started_at: Instant,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    protocol_errors: AtomicU64,
    read_timeouts: AtomicU64,
    write_timeouts: AtomicU64,
}

impl ChannelStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            read_timeouts: AtomicU64::new(0),
            write_timeouts: AtomicU64::new(0),
        }
    }

    /// Record an outgoing frame
    pub fn record_sent(&self, payload_len: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    /// Record an incoming frame
    pub fn record_received(&self, payload_len: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    /// Record a malformed or oversized frame
    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read that hit its deadline
    pub fn record_read_timeout(&self) {
        self.read_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write that hit its deadline
    pub fn record_write_timeout(&self) {
        self.write_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> ChannelStatsSnapshot {
        ChannelStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            write_timeouts: self.write_timeouts.load(Ordering::Relaxed),
            duration: self.started_at.elapsed(),
        }
    }
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of a channel's counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStatsSnapshot {
    /// Frames written to the transport
    pub frames_sent: u64,
    /// Payload bytes written
    pub bytes_sent: u64,
    /// Frames read from the transport
    pub frames_received: u64,
    /// Payload bytes read
    pub bytes_received: u64,
    /// Malformed or oversized frames seen
    pub protocol_errors: u64,
    /// Reads that hit their deadline
    pub read_timeouts: u64,
    /// Writes that hit their deadline
    pub write_timeouts: u64,
    /// Time since the channel was created
    pub duration: Duration,
}

impl ChannelStatsSnapshot {
    /// Inbound bitrate in bits per second
    pub fn receive_bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }

    /// Outbound bitrate in bits per second
    pub fn send_bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }

    /// Inbound frame rate
    pub fn receive_framerate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.frames_received as f64 / secs
        } else {
            0.0
        }
    }
}

/// Statistics for one peer session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub video: ChannelStatsSnapshot,
    pub audio: ChannelStatsSnapshot,
}

impl SessionStats {
    /// Total payload bytes received on both channels
    pub fn total_bytes_received(&self) -> u64 {
        self.video.bytes_received + self.audio.bytes_received
    }

    /// Total payload bytes sent on both channels
    pub fn total_bytes_sent(&self) -> u64 {
        self.video.bytes_sent + self.audio.bytes_sent
    }
}
