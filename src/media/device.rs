//! Device traits for capture, compression, rendering and audio I/O
//!
//! Implementations own their device handle and release it on drop. The
//! channel loops own these values, so a device is released exactly once, when
//! the loop that owns it ends.

use std::future::Future;

use bytes::Bytes;

use crate::error::Result;

/// An uncompressed image (packed RGB24, row-major)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

impl RawImage {
    /// Bytes per pixel
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Create an image, returning `None` if the pixel buffer does not match
    /// the dimensions
    pub fn new(width: u32, height: u32, pixels: Bytes) -> Option<Self> {
        if Self::expected_len(width, height) != Some(pixels.len()) {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Pixel buffer length for the given dimensions, `None` on overflow
    pub fn expected_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(Self::BYTES_PER_PIXEL)
    }
}

/// Camera
pub trait VideoCapture: Send + 'static {
    /// Grab the next image from the device
    fn capture_frame(&mut self) -> impl Future<Output = Result<RawImage>> + Send;
}

/// Image compressor
pub trait ImageEncoder: Send + 'static {
    fn encode(&mut self, image: &RawImage) -> Result<Bytes>;
}

/// Image decompressor
pub trait ImageDecoder: Send + 'static {
    fn decode(&mut self, data: &[u8]) -> Result<RawImage>;
}

/// On-screen display
pub trait FrameRenderer: Send + 'static {
    fn render(&mut self, image: RawImage) -> Result<()>;
}

/// Microphone
pub trait AudioInput: Send + 'static {
    /// Read exactly `n` bytes of PCM samples
    fn read_audio(&mut self, n: usize) -> impl Future<Output = Result<Bytes>> + Send;
}

/// Speaker
pub trait AudioOutput: Send + 'static {
    /// Play a block of PCM samples
    fn write_audio(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;
}
