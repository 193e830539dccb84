//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::protocol::constants::{DEFAULT_AUDIO_PORT, DEFAULT_VIDEO_PORT};
use crate::session::SessionConfig;

/// Rendezvous server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address both listeners bind to
    pub bind_ip: IpAddr,

    /// Port accepting video connections (0 = OS-assigned)
    pub video_port: u16,

    /// Port accepting audio connections (0 = OS-assigned)
    pub audio_port: u16,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Settings for each relayed peer session
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            video_port: DEFAULT_VIDEO_PORT,
            audio_port: DEFAULT_AUDIO_PORT,
            tcp_nodelay: true, // Important for low latency
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config bound to `ip` on the default ports
    pub fn with_ip(ip: IpAddr) -> Self {
        Self {
            bind_ip: ip,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Set the video and audio ports
    pub fn ports(mut self, video: u16, audio: u16) -> Self {
        self.video_port = video;
        self.audio_port = audio;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set per-session configuration
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Socket address of the video listener
    pub fn video_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.video_port)
    }

    /// Socket address of the audio listener
    pub fn audio_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.audio_port)
    }
}
