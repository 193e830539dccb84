//! Client configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::{AUDIO_CHUNK_BYTES, DEFAULT_AUDIO_PORT, DEFAULT_VIDEO_PORT};
use crate::session::SessionConfig;

/// Peer client configuration options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Rendezvous server address
    pub server: IpAddr,

    /// Server video port
    pub video_port: u16,

    /// Server audio port
    pub audio_port: u16,

    /// Deadline for each connection attempt
    pub connect_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Camera to capture from
    pub camera_index: u32,

    /// Microphone to record from
    pub microphone_index: u32,

    /// Captured image width in pixels
    pub frame_width: u32,

    /// Captured image height in pixels
    pub frame_height: u32,

    /// Bytes per audio block sent
    pub audio_chunk_bytes: usize,

    /// Channel worker settings
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: IpAddr::V4(Ipv4Addr::LOCALHOST),
            video_port: DEFAULT_VIDEO_PORT,
            audio_port: DEFAULT_AUDIO_PORT,
            connect_timeout: Duration::from_secs(5),
            tcp_nodelay: true,
            camera_index: 0,
            microphone_index: 0,
            frame_width: 320,
            frame_height: 240,
            audio_chunk_bytes: AUDIO_CHUNK_BYTES,
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new config for `server` on the default ports
    pub fn new(server: IpAddr) -> Self {
        Self {
            server,
            ..Default::default()
        }
    }

    /// Set the server video and audio ports
    pub fn ports(mut self, video: u16, audio: u16) -> Self {
        self.video_port = video;
        self.audio_port = audio;
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Select capture devices
    pub fn devices(mut self, camera: u32, microphone: u32) -> Self {
        self.camera_index = camera;
        self.microphone_index = microphone;
        self
    }

    /// Set captured image size
    pub fn frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_width = width;
        self.frame_height = height;
        self
    }

    /// Set the minimum interval between two video frames
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.session.video = self.session.video.min_frame_interval(interval);
        self
    }

    /// Set per-session configuration
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn video_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server, self.video_port)
    }

    pub fn audio_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server, self.audio_port)
    }
}
