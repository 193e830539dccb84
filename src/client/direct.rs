//! Direct two-party mode
//!
//! One participant listens and the other connects to it with
//! [`PeerClient::connect`], no relay in between. The wire format is the same
//! as with the rendezvous server.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;
use crate::media::{MediaSink, MediaSource};
use crate::session::{Channel, ChannelKind, PeerId, PeerMedia, PeerSession};

use super::config::ClientConfig;
use super::peer::PeerClient;

/// Listening side of a direct call
pub struct DirectListener {
    config: ClientConfig,
    video: TcpListener,
    audio: TcpListener,
}

impl DirectListener {
    /// Bind the video and audio ports on `config.server`
    pub async fn bind(config: ClientConfig) -> Result<Self> {
        let video = TcpListener::bind(config.video_addr()).await?;
        let audio = TcpListener::bind(config.audio_addr()).await?;

        tracing::info!(
            video = %video.local_addr()?,
            audio = %audio.local_addr()?,
            "Waiting for the other participant"
        );

        Ok(Self {
            config,
            video,
            audio,
        })
    }

    /// Bound address of the video listener
    pub fn video_addr(&self) -> Result<SocketAddr> {
        Ok(self.video.local_addr()?)
    }

    /// Bound address of the audio listener
    pub fn audio_addr(&self) -> Result<SocketAddr> {
        Ok(self.audio.local_addr()?)
    }

    /// Accept the other participant (video, then audio) and start the call
    ///
    /// The listeners are closed once both channels are connected.
    pub async fn accept<VS, VK, AS, AK>(
        self,
        media: PeerMedia<VS, VK, AS, AK>,
    ) -> Result<PeerClient>
    where
        VS: MediaSource,
        VK: MediaSink,
        AS: MediaSource,
        AK: MediaSink,
    {
        let video = self.accept_channel(&self.video, ChannelKind::Video).await?;
        let audio = self.accept_channel(&self.audio, ChannelKind::Audio).await?;
        let remote = video.peer_addr();

        let mut session = PeerSession::new(PeerId(0), self.config.session.clone());
        session.start(video, audio, media)?;

        tracing::info!(remote = ?remote, "Participant connected");
        Ok(PeerClient::from_session(self.config, session))
    }

    async fn accept_channel(&self, listener: &TcpListener, kind: ChannelKind) -> Result<Channel> {
        let (socket, addr) = listener.accept().await?;
        self.configure_socket(&socket)?;

        tracing::debug!(channel = %kind, addr = %addr, "New connection");
        Ok(Channel::from_tcp(kind, socket))
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}
