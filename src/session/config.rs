//! Worker and session configuration

use std::time::Duration;

use crate::protocol::constants::{
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_VIDEO_FRAME_INTERVAL, MAX_REPRESENTABLE_FRAME_SIZE,
};

/// Channel worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Deadline for a single frame read
    pub read_timeout: Duration,

    /// Deadline for a single frame write
    pub write_timeout: Duration,

    /// Consecutive read timeouts tolerated before the channel is failed
    ///
    /// Only counted once the channel has received its first frame; until then
    /// the remote end may still be waiting for its partner.
    pub max_read_timeouts: u32,

    /// Consecutive write timeouts tolerated for one frame before the channel
    /// is failed
    pub max_write_timeouts: u32,

    /// Largest payload accepted or sent
    pub max_frame_size: usize,

    /// Minimum time between two outgoing frames (zero = unpaced)
    pub min_frame_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            max_read_timeouts: 3,
            max_write_timeouts: 3,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            min_frame_interval: Duration::ZERO,
        }
    }
}

impl WorkerConfig {
    /// Defaults for a video channel (paced sending)
    pub fn video() -> Self {
        Self {
            min_frame_interval: DEFAULT_VIDEO_FRAME_INTERVAL,
            ..Default::default()
        }
    }

    /// Defaults for an audio channel (paced by the device)
    pub fn audio() -> Self {
        Self::default()
    }

    /// Set read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the number of consecutive read timeouts tolerated
    pub fn max_read_timeouts(mut self, count: u32) -> Self {
        self.max_read_timeouts = count;
        self
    }

    /// Set the number of consecutive write timeouts tolerated
    pub fn max_write_timeouts(mut self, count: u32) -> Self {
        self.max_write_timeouts = count;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.min(MAX_REPRESENTABLE_FRAME_SIZE);
        self
    }

    /// Set minimum inter-frame interval
    pub fn min_frame_interval(mut self, interval: Duration) -> Self {
        self.min_frame_interval = interval;
        self
    }
}

/// Peer session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Video channel worker settings
    pub video: WorkerConfig,

    /// Audio channel worker settings
    pub audio: WorkerConfig,

    /// How long `stop()` waits before force-closing workers
    pub stop_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            video: WorkerConfig::video(),
            audio: WorkerConfig::audio(),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

impl SessionConfig {
    /// Set video worker config
    pub fn video(mut self, config: WorkerConfig) -> Self {
        self.video = config;
        self
    }

    /// Set audio worker config
    pub fn audio(mut self, config: WorkerConfig) -> Self {
        self.audio = config;
        self
    }

    /// Set stop timeout
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Apply the same frame size limit to both channels
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.video = self.video.max_frame_size(size);
        self.audio = self.audio.max_frame_size(size);
        self
    }

    /// Apply the same I/O timeouts to both channels
    pub fn io_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.video = self.video.read_timeout(read).write_timeout(write);
        self.audio = self.audio.read_timeout(read).write_timeout(write);
        self
    }
}
