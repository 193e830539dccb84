//! Media endpoints for the channel workers
//!
//! This module provides:
//! - [`MediaSource`]/[`MediaSink`]: what a channel's send loop pulls from and
//!   its receive loop pushes into
//! - Device traits for the external collaborators (camera, image codec,
//!   renderer, microphone, speaker)
//! - Adapters composing those devices into sources and sinks
//! - Synthetic devices for running without real hardware

pub mod device;
pub mod pipeline;
pub mod synthetic;

pub use device::{
    AudioInput, AudioOutput, FrameRenderer, ImageDecoder, ImageEncoder, RawImage, VideoCapture,
};
pub use pipeline::{AudioSink, AudioSource, MediaSink, MediaSource, VideoSink, VideoSource};
pub use synthetic::{LogRenderer, NullSpeaker, RawImageCodec, SilentMicrophone, TestPatternCamera};
