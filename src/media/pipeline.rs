//! Channel sources and sinks
//!
//! A channel's send loop pulls payloads from a [`MediaSource`]; its receive
//! loop pushes payloads into a [`MediaSink`]. The adapters here compose the
//! device traits into the video and audio endpoints of a peer:
//!
//! ```text
//! VideoSource: capture -> encode  ──► send loop
//! VideoSink:   receive loop ──► decode -> render
//! AudioSource: read_audio(chunk)  ──► send loop
//! AudioSink:   receive loop ──► write_audio
//! ```

use std::future::Future;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{DeviceError, Error, Result};

use super::device::{
    AudioInput, AudioOutput, FrameRenderer, ImageDecoder, ImageEncoder, VideoCapture,
};

/// Producer of outbound payloads
pub trait MediaSource: Send + 'static {
    /// Next payload to send, or `None` once the source is exhausted
    fn next_payload(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;
}

/// Consumer of inbound payloads
pub trait MediaSink: Send + 'static {
    fn consume(&mut self, payload: Bytes) -> impl Future<Output = Result<()>> + Send;
}

impl MediaSource for mpsc::Receiver<Bytes> {
    async fn next_payload(&mut self) -> Result<Option<Bytes>> {
        Ok(self.recv().await)
    }
}

impl MediaSink for mpsc::Sender<Bytes> {
    async fn consume(&mut self, payload: Bytes) -> Result<()> {
        self.send(payload)
            .await
            .map_err(|_| DeviceError::Playback("consumer dropped".into()).into())
    }
}

/// Camera + encoder
pub struct VideoSource<C, E> {
    capture: C,
    encoder: E,
}

impl<C: VideoCapture, E: ImageEncoder> VideoSource<C, E> {
    pub fn new(capture: C, encoder: E) -> Self {
        Self { capture, encoder }
    }
}

impl<C: VideoCapture, E: ImageEncoder> MediaSource for VideoSource<C, E> {
    async fn next_payload(&mut self) -> Result<Option<Bytes>> {
        let image = self.capture.capture_frame().await?;
        let encoded = self.encoder.encode(&image)?;
        Ok(Some(encoded))
    }
}

/// Decoder + renderer
///
/// Payloads that fail to decode are dropped and counted; a render failure is
/// returned to the receive loop.
pub struct VideoSink<D, R> {
    decoder: D,
    renderer: R,
    dropped: u64,
}

impl<D: ImageDecoder, R: FrameRenderer> VideoSink<D, R> {
    pub fn new(decoder: D, renderer: R) -> Self {
        Self {
            decoder,
            renderer,
            dropped: 0,
        }
    }

    /// Frames discarded because they could not be decoded
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<D: ImageDecoder, R: FrameRenderer> MediaSink for VideoSink<D, R> {
    async fn consume(&mut self, payload: Bytes) -> Result<()> {
        if payload.is_empty() {
            tracing::trace!("Skipping empty video frame");
            return Ok(());
        }

        match self.decoder.decode(&payload) {
            Ok(image) => self.renderer.render(image),
            Err(Error::Device(DeviceError::Codec(reason))) => {
                self.dropped += 1;
                tracing::warn!(
                    size = payload.len(),
                    dropped = self.dropped,
                    reason = %reason,
                    "Dropping undecodable video frame"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Microphone reading fixed-size blocks
pub struct AudioSource<I> {
    input: I,
    chunk_bytes: usize,
}

impl<I: AudioInput> AudioSource<I> {
    pub fn new(input: I, chunk_bytes: usize) -> Self {
        Self { input, chunk_bytes }
    }
}

impl<I: AudioInput> MediaSource for AudioSource<I> {
    async fn next_payload(&mut self) -> Result<Option<Bytes>> {
        let block = self.input.read_audio(self.chunk_bytes).await?;
        Ok(Some(block))
    }
}

/// Speaker
pub struct AudioSink<O> {
    output: O,
}

impl<O: AudioOutput> AudioSink<O> {
    pub fn new(output: O) -> Self {
        Self { output }
    }
}

impl<O: AudioOutput> MediaSink for AudioSink<O> {
    async fn consume(&mut self, payload: Bytes) -> Result<()> {
        self.output.write_audio(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::device::RawImage;
    use crate::media::synthetic::{
        LogRenderer, NullSpeaker, RawImageCodec, SilentMicrophone, TestPatternCamera,
    };

    #[tokio::test]
    async fn test_video_pipeline_round_trip() {
        let camera = TestPatternCamera::open(0, 8, 4).unwrap();
        let mut source = VideoSource::new(camera, RawImageCodec);

        let renderer = LogRenderer::new("test");
        let rendered = renderer.counter();
        let mut sink = VideoSink::new(RawImageCodec, renderer);

        for _ in 0..3 {
            let payload = source.next_payload().await.unwrap().unwrap();
            sink.consume(payload).await.unwrap();
        }

        assert_eq!(rendered.load(std::sync::atomic::Ordering::Relaxed), 3);
        assert_eq!(sink.dropped(), 0);
    }

    #[tokio::test]
    async fn test_video_sink_drops_garbage() {
        let renderer = LogRenderer::new("test");
        let rendered = renderer.counter();
        let mut sink = VideoSink::new(RawImageCodec, renderer);

        sink.consume(Bytes::from_static(b"not an image")).await.unwrap();
        sink.consume(Bytes::new()).await.unwrap();

        assert_eq!(sink.dropped(), 1);
        assert_eq!(rendered.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_video_sink_propagates_render_failure() {
        struct BrokenScreen;
        impl FrameRenderer for BrokenScreen {
            fn render(&mut self, _image: RawImage) -> Result<()> {
                Err(DeviceError::Playback("window closed".into()).into())
            }
        }

        let mut camera = TestPatternCamera::open(0, 2, 2).unwrap();
        let image = camera.capture_frame().await.unwrap();
        let payload = RawImageCodec.encode(&image).unwrap();

        let mut sink = VideoSink::new(RawImageCodec, BrokenScreen);
        let err = sink.consume(payload).await.unwrap_err();
        assert!(matches!(err, Error::Device(DeviceError::Playback(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_pipeline_chunk_size() {
        let mic = SilentMicrophone::open(0).unwrap();
        let mut source = AudioSource::new(mic, 2048);
        let block = source.next_payload().await.unwrap().unwrap();
        assert_eq!(block.len(), 2048);

        let speaker = NullSpeaker::new();
        let played = speaker.counter();
        let mut sink = AudioSink::new(speaker);
        sink.consume(block).await.unwrap();
        assert_eq!(played.load(std::sync::atomic::Ordering::Relaxed), 2048);
    }

    #[tokio::test]
    async fn test_channel_endpoints() {
        let (tx, mut rx) = mpsc::channel::<Bytes>(4);
        let mut sink = tx;
        sink.consume(Bytes::from_static(b"a")).await.unwrap();
        assert_eq!(rx.next_payload().await.unwrap(), Some(Bytes::from_static(b"a")));

        drop(sink);
        assert_eq!(rx.next_payload().await.unwrap(), None);
    }
}
