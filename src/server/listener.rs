//! Rendezvous server listener
//!
//! Accepts peers in pairs on the video and audio ports and relays between
//! each pair until it ends, then goes back to accepting.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;
use crate::relay::{PeerLink, RelayRouter};
use crate::server::config::ServerConfig;
use crate::session::{Channel, ChannelKind, PeerId};

/// Two-peer relay server
pub struct RelayServer {
    config: ServerConfig,
    video: TcpListener,
    audio: TcpListener,
    next_peer_id: AtomicU32,
}

impl RelayServer {
    /// Bind both listeners
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let video = TcpListener::bind(config.video_addr()).await?;
        let audio = TcpListener::bind(config.audio_addr()).await?;

        tracing::info!(
            video = %video.local_addr()?,
            audio = %audio.local_addr()?,
            "Relay server listening"
        );

        Ok(Self {
            config,
            video,
            audio,
            next_peer_id: AtomicU32::new(0),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bound address of the video listener
    pub fn video_addr(&self) -> Result<SocketAddr> {
        Ok(self.video.local_addr()?)
    }

    /// Bound address of the audio listener
    pub fn audio_addr(&self) -> Result<SocketAddr> {
        Ok(self.audio.local_addr()?)
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    ///
    /// A pair being relayed when `shutdown` resolves is stopped first.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let (first, second) = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    return Ok(());
                }
                pair = self.accept_pair() => pair,
            };

            let router = match RelayRouter::new(first, second, self.config.session.clone()) {
                Ok(router) => router,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start relay pair");
                    continue;
                }
            };

            let mut shutting_down = false;
            let outcome = router
                .run_until(async {
                    shutdown.as_mut().await;
                    shutting_down = true;
                })
                .await;

            for (peer, session) in &outcome.outcomes {
                tracing::info!(peer = %peer, outcome = ?session, "Relay session finished");
            }

            if shutting_down {
                tracing::info!("Shutdown signal received");
                return Ok(());
            }
            tracing::info!("Waiting for the next pair");
        }
    }

    async fn accept_pair(&self) -> (PeerLink, PeerLink) {
        let first = self.accept_peer().await;
        tracing::info!(peer = %first.id, "Peer connected, waiting for partner");

        let second = self.accept_peer().await;
        tracing::info!(first = %first.id, second = %second.id, "Peers paired");

        (first, second)
    }

    /// Accept one peer: its video connection, then its audio connection
    async fn accept_peer(&self) -> PeerLink {
        let id = PeerId(self.next_peer_id.fetch_add(1, Ordering::Relaxed));
        let video = self.accept_channel(&self.video, ChannelKind::Video, id).await;
        let audio = self.accept_channel(&self.audio, ChannelKind::Audio, id).await;
        PeerLink { id, video, audio }
    }

    async fn accept_channel(
        &self,
        listener: &TcpListener,
        kind: ChannelKind,
        peer: PeerId,
    ) -> Channel {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    if let Err(e) = self.configure_socket(&socket) {
                        tracing::error!(error = %e, "Failed to configure socket");
                        continue;
                    }

                    tracing::debug!(
                        peer = %peer,
                        channel = %kind,
                        addr = %peer_addr,
                        "New connection"
                    );
                    return Channel::from_tcp(kind, socket);
                }
                Err(e) => {
                    tracing::error!(channel = %kind, error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn loopback() -> ServerConfig {
        ServerConfig::with_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)).ports(0, 0)
    }

    #[tokio::test]
    async fn test_bind_ephemeral_ports() {
        let server = RelayServer::bind(loopback()).await.unwrap();

        let video = server.video_addr().unwrap();
        let audio = server.audio_addr().unwrap();
        assert_ne!(video.port(), 0);
        assert_ne!(video.port(), audio.port());
    }

    #[tokio::test]
    async fn test_bind_conflict_fails() {
        let server = RelayServer::bind(loopback()).await.unwrap();
        let taken = server.video_addr().unwrap().port();

        let result = RelayServer::bind(loopback().ports(taken, 0)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let server = RelayServer::bind(loopback()).await.unwrap();
        server.run_until(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn test_accepts_video_then_audio() {
        let server = RelayServer::bind(loopback()).await.unwrap();
        let video_addr = server.video_addr().unwrap();
        let audio_addr = server.audio_addr().unwrap();

        let client = async {
            let video = TcpStream::connect(video_addr).await.unwrap();
            let audio = TcpStream::connect(audio_addr).await.unwrap();
            (video, audio)
        };
        let (link, _streams) = tokio::join!(server.accept_peer(), client);

        assert_eq!(link.id, PeerId(0));
        assert_eq!(link.video.kind(), ChannelKind::Video);
        assert_eq!(link.audio.kind(), ChannelKind::Audio);
        assert!(link.video.peer_addr().is_some());
    }
}
