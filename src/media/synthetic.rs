//! Synthetic devices
//!
//! Stand-ins for a camera, image codec, display, microphone and speaker. They
//! let a peer run end to end without real hardware and give the tests
//! deterministic media.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::{DeviceError, Result};
use crate::protocol::constants::{AUDIO_SAMPLE_RATE, AUDIO_SAMPLE_WIDTH};

use super::device::{
    AudioInput, AudioOutput, FrameRenderer, ImageDecoder, ImageEncoder, RawImage, VideoCapture,
};

/// Number of synthetic devices of each kind (valid indices are `0..COUNT`)
pub const SYNTHETIC_DEVICE_COUNT: u32 = 2;

fn check_index(index: u32) -> Result<()> {
    if index >= SYNTHETIC_DEVICE_COUNT {
        return Err(DeviceError::Unavailable { index }.into());
    }
    Ok(())
}

/// Camera producing a moving gradient
#[derive(Debug)]
pub struct TestPatternCamera {
    index: u32,
    width: u32,
    height: u32,
    frame_no: u64,
}

impl TestPatternCamera {
    /// Open the camera at `index`
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self> {
        check_index(index)?;
        if RawImage::expected_len(width, height).is_none() {
            let reason = format!("frame size {width}x{height} too large");
            return Err(DeviceError::Capture(reason).into());
        }
        tracing::debug!(index, width, height, "Opened test pattern camera");
        Ok(Self {
            index,
            width,
            height,
            frame_no: 0,
        })
    }
}

impl VideoCapture for TestPatternCamera {
    async fn capture_frame(&mut self) -> Result<RawImage> {
        let len = RawImage::expected_len(self.width, self.height).unwrap_or_default();
        let mut pixels = BytesMut::with_capacity(len);
        let shift = self.frame_no as u32;
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.put_u8(x.wrapping_add(shift) as u8);
                pixels.put_u8(y.wrapping_add(shift) as u8);
                pixels.put_u8((self.index * 128) as u8);
            }
        }
        self.frame_no += 1;

        Ok(RawImage {
            width: self.width,
            height: self.height,
            pixels: pixels.freeze(),
        })
    }
}

impl Drop for TestPatternCamera {
    fn drop(&mut self) {
        tracing::debug!(index = self.index, frames = self.frame_no, "Released test pattern camera");
    }
}

/// Uncompressed image codec
///
/// Format: width (u32 BE) | height (u32 BE) | RGB24 pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawImageCodec;

impl RawImageCodec {
    const HEADER_LEN: usize = 8;
}

impl ImageEncoder for RawImageCodec {
    fn encode(&mut self, image: &RawImage) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(Self::HEADER_LEN + image.pixels.len());
        out.put_u32(image.width);
        out.put_u32(image.height);
        out.put_slice(&image.pixels);
        Ok(out.freeze())
    }
}

impl ImageDecoder for RawImageCodec {
    fn decode(&mut self, data: &[u8]) -> Result<RawImage> {
        if data.len() < Self::HEADER_LEN {
            let reason = format!("image header too short: {} bytes", data.len());
            return Err(DeviceError::Codec(reason).into());
        }
        let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let Some(expected) = RawImage::expected_len(width, height) else {
            return Err(DeviceError::Codec(format!("image size {width}x{height} overflows")).into());
        };

        let pixels = Bytes::copy_from_slice(&data[Self::HEADER_LEN..]);
        RawImage::new(width, height, pixels).ok_or_else(|| {
            DeviceError::Codec(format!(
                "pixel data is {} bytes, expected {} for {}x{}",
                data.len() - Self::HEADER_LEN,
                expected,
                width,
                height
            ))
            .into()
        })
    }
}

/// Display that logs what it would show
#[derive(Debug)]
pub struct LogRenderer {
    name: String,
    rendered: Arc<AtomicU64>,
}

impl LogRenderer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rendered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared count of rendered frames
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.rendered)
    }
}

impl FrameRenderer for LogRenderer {
    fn render(&mut self, image: RawImage) -> Result<()> {
        let n = self.rendered.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(
            window = %self.name,
            width = image.width,
            height = image.height,
            frame = n,
            "Rendered frame"
        );
        Ok(())
    }
}

/// Microphone producing silence at the real-time sample rate
#[derive(Debug)]
pub struct SilentMicrophone {
    index: u32,
    pacer: Option<(Interval, usize)>,
}

impl SilentMicrophone {
    /// Open the microphone at `index`
    pub fn open(index: u32) -> Result<Self> {
        check_index(index)?;
        tracing::debug!(index, "Opened silent microphone");
        Ok(Self { index, pacer: None })
    }

    fn block_duration(n: usize) -> Duration {
        let samples = (n / AUDIO_SAMPLE_WIDTH) as u64;
        Duration::from_micros(samples * 1_000_000 / AUDIO_SAMPLE_RATE as u64)
    }
}

impl AudioInput for SilentMicrophone {
    async fn read_audio(&mut self, n: usize) -> Result<Bytes> {
        // Blocks arrive as fast as a real device would fill them
        let reset = !matches!(&self.pacer, Some((_, size)) if *size == n);
        if reset {
            let period = Self::block_duration(n).max(Duration::from_millis(1));
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.pacer = Some((interval, n));
        }
        if let Some((interval, _)) = self.pacer.as_mut() {
            interval.tick().await;
        }
        Ok(Bytes::from(vec![0u8; n]))
    }
}

impl Drop for SilentMicrophone {
    fn drop(&mut self) {
        tracing::debug!(index = self.index, "Released silent microphone");
    }
}

/// Speaker that discards samples
#[derive(Debug, Default)]
pub struct NullSpeaker {
    played: Arc<AtomicU64>,
}

impl NullSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared count of bytes played
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.played)
    }
}

impl AudioOutput for NullSpeaker {
    async fn write_audio(&mut self, data: &[u8]) -> Result<()> {
        self.played.fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}
