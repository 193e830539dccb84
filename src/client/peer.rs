//! Peer client
//!
//! Connects to the rendezvous server (video first, then audio) and runs a
//! full peer session over the two connections.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result, TimeoutKind};
use crate::media::{
    AudioSink, AudioSource, LogRenderer, MediaSink, MediaSource, NullSpeaker, RawImageCodec,
    SilentMicrophone, TestPatternCamera, VideoSink, VideoSource,
};
use crate::session::{Channel, ChannelKind, PeerId, PeerMedia, PeerSession, SessionOutcome};
use crate::stats::SessionStats;

use super::config::ClientConfig;

/// Media endpoints backed by the synthetic devices
pub type SyntheticMedia = PeerMedia<
    VideoSource<TestPatternCamera, RawImageCodec>,
    VideoSink<RawImageCodec, LogRenderer>,
    AudioSource<SilentMicrophone>,
    AudioSink<NullSpeaker>,
>;

/// Open the synthetic devices selected by `config`
///
/// Fails with `DeviceError::Unavailable` for an index that does not exist.
pub fn synthetic_media(config: &ClientConfig) -> Result<SyntheticMedia> {
    let camera = TestPatternCamera::open(
        config.camera_index,
        config.frame_width,
        config.frame_height,
    )?;
    let microphone = SilentMicrophone::open(config.microphone_index)?;

    Ok(PeerMedia {
        video_source: VideoSource::new(camera, RawImageCodec),
        video_sink: VideoSink::new(RawImageCodec, LogRenderer::new("remote")),
        audio_source: AudioSource::new(microphone, config.audio_chunk_bytes),
        audio_sink: AudioSink::new(NullSpeaker::new()),
    })
}

/// Connect the video channel, then the audio channel
pub async fn connect_channels(config: &ClientConfig) -> Result<(Channel, Channel)> {
    let video = connect_channel(config, ChannelKind::Video, config.video_addr()).await?;
    let audio = connect_channel(config, ChannelKind::Audio, config.audio_addr()).await?;
    Ok((video, audio))
}

async fn connect_channel(
    config: &ClientConfig,
    kind: ChannelKind,
    addr: SocketAddr,
) -> Result<Channel> {
    let stream = match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::warn!(channel = %kind, addr = %addr, error = %e, "Connection failed");
            return Err(e.into());
        }
        Err(_) => {
            tracing::warn!(
                channel = %kind,
                addr = %addr,
                timeout_ms = config.connect_timeout.as_millis() as u64,
                "Connection timed out"
            );
            return Err(Error::Timeout(TimeoutKind::Connect));
        }
    };

    if config.tcp_nodelay {
        stream.set_nodelay(true)?;
    }

    tracing::debug!(channel = %kind, addr = %addr, "Connected");
    Ok(Channel::from_tcp(kind, stream))
}

/// A connected participant
///
/// # Example
/// ```no_run
/// use avrelay::client::{synthetic_media, ClientConfig, PeerClient};
///
/// # async fn example() -> avrelay::error::Result<()> {
/// let config = ClientConfig::default();
/// let media = synthetic_media(&config)?;
/// let mut client = PeerClient::connect(config, media).await?;
///
/// let outcome = client.wait().await;
/// println!("Session ended: {:?}", outcome);
/// # Ok(())
/// # }
/// ```
pub struct PeerClient {
    config: ClientConfig,
    session: PeerSession,
}

impl PeerClient {
    /// Connect to the server and start sending and receiving
    ///
    /// Devices in `media` are released if the connection fails.
    pub async fn connect<VS, VK, AS, AK>(
        config: ClientConfig,
        media: PeerMedia<VS, VK, AS, AK>,
    ) -> Result<Self>
    where
        VS: MediaSource,
        VK: MediaSink,
        AS: MediaSource,
        AK: MediaSink,
    {
        let (video, audio) = connect_channels(&config).await?;

        let mut session = PeerSession::new(PeerId(0), config.session.clone());
        session.start(video, audio, media)?;

        tracing::info!(
            video = %config.video_addr(),
            audio = %config.audio_addr(),
            "Connected to relay server"
        );

        Ok(Self { config, session })
    }

    /// Wrap a session already running over accepted channels
    pub(super) fn from_session(config: ClientConfig, session: PeerSession) -> Self {
        Self { config, session }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    /// Resolve once the session has ended; cancel-safe
    pub async fn ended(&self) -> SessionOutcome {
        self.session.ended().await
    }

    /// Wait for the session to end, then release everything
    pub async fn wait(&mut self) -> SessionOutcome {
        self.session.wait().await
    }

    /// Stop the session and release devices and connections
    pub async fn stop(&mut self) -> SessionOutcome {
        self.session.stop().await
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }
}
