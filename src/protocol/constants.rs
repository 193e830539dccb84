//! Wire and media constants

use std::time::Duration;

/// Frame header width in bytes (big-endian u32 length)
pub const HEADER_SIZE: usize = 4;

/// Default cap on a single frame payload (16 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest length a 4-byte header can carry
pub const MAX_REPRESENTABLE_FRAME_SIZE: usize = u32::MAX as usize;

/// Initial capacity of a frame reader's buffer
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default rendezvous port for the video stream
pub const DEFAULT_VIDEO_PORT: u16 = 1222;

/// Default rendezvous port for the audio stream
pub const DEFAULT_AUDIO_PORT: u16 = 1234;

/// Samples per audio block
pub const AUDIO_CHUNK_SAMPLES: usize = 1024;

/// Bytes per sample (16-bit PCM)
pub const AUDIO_SAMPLE_WIDTH: usize = 2;

/// Audio sample rate in Hz (mono)
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Bytes in one audio block (1024 samples x 2 bytes)
pub const AUDIO_CHUNK_BYTES: usize = AUDIO_CHUNK_SAMPLES * AUDIO_SAMPLE_WIDTH;

/// Default minimum interval between outgoing video frames
pub const DEFAULT_VIDEO_FRAME_INTERVAL: Duration = Duration::from_millis(500);
