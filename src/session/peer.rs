//! Peer session
//!
//! One video worker and one audio worker bound to the same remote peer, plus
//! a supervisor task that turns the first fatal loop outcome into an ordered
//! shutdown of the whole session.
//!
//! ```text
//!                 ┌── video worker ── send / receive ──┐
//! PeerSession ────┤                                    ├── WorkerEvent ──► supervisor
//!                 └── audio worker ── send / receive ──┘                     │
//!                                                                            ▼
//!                                                      outcome + request_stop on all workers
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::media::{MediaSink, MediaSource};
use crate::stats::SessionStats;

use super::channel::{BoxedReader, Channel};
use super::config::SessionConfig;
use super::context::{ChannelKind, PeerId};
use super::state::{SessionOutcome, WorkerEvent, WorkerState};
use super::worker::{ChannelWorker, WorkerHandle};

/// Media endpoints of a full peer
pub struct PeerMedia<VS, VK, AS, AK> {
    pub video_source: VS,
    pub video_sink: VK,
    pub audio_source: AS,
    pub audio_sink: AK,
}

/// Both channel workers of one remote participant
pub struct PeerSession {
    id: PeerId,
    config: SessionConfig,
    video: ChannelWorker,
    audio: ChannelWorker,
    outcome: Arc<watch::Sender<Option<SessionOutcome>>>,
    events: Option<mpsc::UnboundedReceiver<WorkerEvent>>,
    supervisor: Option<JoinHandle<()>>,
}

impl PeerSession {
    pub fn new(id: PeerId, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let video = ChannelWorker::new(
            id,
            ChannelKind::Video,
            config.video.clone(),
            Some(events_tx.clone()),
        );
        let audio = ChannelWorker::new(
            id,
            ChannelKind::Audio,
            config.audio.clone(),
            Some(events_tx),
        );
        let (outcome, _) = watch::channel(None);

        Self {
            id,
            config,
            video,
            audio,
            outcome: Arc::new(outcome),
            events: Some(events_rx),
            supervisor: None,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Worker for one channel
    pub fn worker(&self, kind: ChannelKind) -> &ChannelWorker {
        match kind {
            ChannelKind::Video => &self.video,
            ChannelKind::Audio => &self.audio,
        }
    }

    /// Start all four loops of a full peer
    pub fn start<VS, VK, AS, AK>(
        &mut self,
        video: Channel,
        audio: Channel,
        media: PeerMedia<VS, VK, AS, AK>,
    ) -> Result<()>
    where
        VS: MediaSource,
        VK: MediaSink,
        AS: MediaSource,
        AK: MediaSink,
    {
        self.ensure_not_started()?;
        self.video.start(video, media.video_source, media.video_sink)?;
        self.audio.start(audio, media.audio_source, media.audio_sink)?;
        self.spawn_supervisor(4);

        tracing::info!(peer = %self.id, "Peer session started");
        Ok(())
    }

    /// Start only the receive loops, as a relay node does
    ///
    /// Each sink typically forwards to the other peer's writer, so the write
    /// halves of this peer's channels live in the other session.
    pub fn start_receivers<VK, AK>(
        &mut self,
        video_reader: BoxedReader,
        video_sink: VK,
        audio_reader: BoxedReader,
        audio_sink: AK,
    ) -> Result<()>
    where
        VK: MediaSink,
        AK: MediaSink,
    {
        self.ensure_not_started()?;
        let video_reader = self.video.frame_reader(video_reader);
        let audio_reader = self.audio.frame_reader(audio_reader);
        self.video.spawn_receiver(video_reader, video_sink)?;
        self.audio.spawn_receiver(audio_reader, audio_sink)?;
        self.spawn_supervisor(2);

        tracing::info!(peer = %self.id, "Relay session started");
        Ok(())
    }

    /// Resolve once the session has ended on its own or been stopped
    ///
    /// Cancel-safe; a session that was never started counts as completed.
    pub async fn ended(&self) -> SessionOutcome {
        if self.supervisor.is_none() {
            return self.outcome().unwrap_or(SessionOutcome::Completed);
        }
        let mut outcome = self.outcome.subscribe();
        let ended = match outcome.wait_for(Option::is_some).await {
            Ok(current) => current.clone().unwrap_or(SessionOutcome::Completed),
            Err(_) => SessionOutcome::Completed,
        };
        ended
    }

    /// Wait for the session to end, then release everything
    pub async fn wait(&mut self) -> SessionOutcome {
        self.ended().await;
        self.stop().await
    }

    /// Stop both workers and wait for them, force-closing stragglers
    ///
    /// Idempotent. Returns the session outcome; a session that had not ended
    /// by itself is `Completed`.
    pub async fn stop(&mut self) -> SessionOutcome {
        self.video.request_stop();
        self.audio.request_stop();

        let limit = self.config.stop_timeout;
        let (video_graceful, audio_graceful) =
            tokio::join!(self.video.join(limit), self.audio.join(limit));

        // Workers no longer hold event senders, so the supervisor drains and exits
        self.events = None;
        if let Some(supervisor) = self.supervisor.take() {
            let _ = supervisor.await;

            let stats = self.stats();
            tracing::info!(
                peer = %self.id,
                forced = !(video_graceful && audio_graceful),
                bytes_received = stats.total_bytes_received(),
                bytes_sent = stats.total_bytes_sent(),
                "Peer session stopped"
            );
        }

        record_outcome(&self.outcome, SessionOutcome::Completed);
        self.outcome().unwrap_or(SessionOutcome::Completed)
    }

    /// Outcome so far, `None` while the session is live
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome.borrow().clone()
    }

    /// Current state of the video and audio workers
    pub fn worker_states(&self) -> (WorkerState, WorkerState) {
        (self.video.state(), self.audio.state())
    }

    /// Control handles of both workers
    pub fn handles(&self) -> [WorkerHandle; 2] {
        [self.video.handle(), self.audio.handle()]
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            video: self.video.stats().snapshot(),
            audio: self.audio.stats().snapshot(),
        }
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.supervisor.is_some() || self.events.is_none() {
            return Err(Error::InvalidState(self.video.state()));
        }
        Ok(())
    }

    fn spawn_supervisor(&mut self, loops: usize) {
        let Some(mut events) = self.events.take() else {
            return;
        };
        let outcome = Arc::clone(&self.outcome);
        let handles = self.handles();
        let peer = self.id;

        self.supervisor = Some(tokio::spawn(async move {
            let mut finished = 0;

            while let Some(event) = events.recv().await {
                finished += 1;
                let context = event.context;

                if let Some(result) = SessionOutcome::from_event(event) {
                    if record_outcome(&outcome, result) {
                        tracing::info!(
                            peer = %peer,
                            context = %context,
                            "Session ending, stopping all workers"
                        );
                        for handle in &handles {
                            handle.request_stop();
                        }
                    }
                }

                if finished == loops {
                    record_outcome(&outcome, SessionOutcome::Completed);
                }
            }
        }));
    }
}

/// Record the first outcome only
fn record_outcome(slot: &watch::Sender<Option<SessionOutcome>>, outcome: SessionOutcome) -> bool {
    slot.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(outcome);
        true
    })
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("video", &self.video)
            .field("audio", &self.audio)
            .field("outcome", &self.outcome())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    use super::*;
    use crate::protocol::{read_frame, write_frame};
    use crate::session::config::WorkerConfig;
    use crate::session::context::Direction;

    const MAX: usize = 1024;

    fn test_config() -> SessionConfig {
        SessionConfig::default()
            .video(WorkerConfig::default())
            .max_frame_size(MAX)
            .stop_timeout(Duration::from_millis(500))
    }

    struct Remote {
        video: DuplexStream,
        audio: DuplexStream,
    }

    fn channels() -> (Channel, Channel, Remote) {
        let (video, remote_video) = tokio::io::duplex(64 * 1024);
        let (audio, remote_audio) = tokio::io::duplex(64 * 1024);
        (
            Channel::from_stream(ChannelKind::Video, video),
            Channel::from_stream(ChannelKind::Audio, audio),
            Remote {
                video: remote_video,
                audio: remote_audio,
            },
        )
    }

    type Media = PeerMedia<
        mpsc::Receiver<Bytes>,
        mpsc::Sender<Bytes>,
        mpsc::Receiver<Bytes>,
        mpsc::Sender<Bytes>,
    >;

    struct Local {
        video_out: mpsc::Sender<Bytes>,
        video_in: mpsc::Receiver<Bytes>,
        audio_out: mpsc::Sender<Bytes>,
        audio_in: mpsc::Receiver<Bytes>,
    }

    fn media() -> (Media, Local) {
        let (video_out, video_source) = mpsc::channel::<Bytes>(8);
        let (video_sink, video_in) = mpsc::channel::<Bytes>(8);
        let (audio_out, audio_source) = mpsc::channel::<Bytes>(8);
        let (audio_sink, audio_in) = mpsc::channel::<Bytes>(8);
        (
            PeerMedia {
                video_source,
                video_sink,
                audio_source,
                audio_sink,
            },
            Local {
                video_out,
                video_in,
                audio_out,
                audio_in,
            },
        )
    }

    #[tokio::test]
    async fn test_full_peer_duplex() {
        let (video, audio, mut remote) = channels();
        let (media, mut local) = media();
        let mut session = PeerSession::new(PeerId(0), test_config());
        session.start(video, audio, media).unwrap();

        local.video_out.send(Bytes::from_static(b"img")).await.unwrap();
        local.audio_out.send(Bytes::from_static(b"pcm")).await.unwrap();
        assert_eq!(&read_frame(&mut remote.video, MAX).await.unwrap()[..], b"img");
        assert_eq!(&read_frame(&mut remote.audio, MAX).await.unwrap()[..], b"pcm");

        write_frame(&mut remote.video, b"remote img", MAX).await.unwrap();
        write_frame(&mut remote.audio, b"remote pcm", MAX).await.unwrap();
        assert_eq!(&local.video_in.recv().await.unwrap()[..], b"remote img");
        assert_eq!(&local.audio_in.recv().await.unwrap()[..], b"remote pcm");

        assert!(session.outcome().is_none());
        let outcome = session.stop().await;
        assert!(matches!(outcome, SessionOutcome::Completed));
        assert_eq!(
            session.worker_states(),
            (WorkerState::Stopped, WorkerState::Stopped)
        );

        let stats = session.stats();
        assert_eq!(stats.total_bytes_sent(), 6);
        assert_eq!(stats.total_bytes_received(), 20);
    }

    #[tokio::test]
    async fn test_peer_close_ends_whole_session() {
        let (video, audio, remote) = channels();
        let (media, _local) = media();
        let mut session = PeerSession::new(PeerId(1), test_config());
        session.start(video, audio, media).unwrap();

        // Closing only the audio connection takes the video worker down too
        drop(remote.audio);

        let outcome = session.wait().await;
        assert!(matches!(
            outcome,
            SessionOutcome::PeerClosed {
                kind: ChannelKind::Audio
            }
        ));
        assert_eq!(
            session.worker_states(),
            (WorkerState::Stopped, WorkerState::Stopped)
        );
        drop(remote.video);
    }

    #[tokio::test]
    async fn test_fatal_error_recorded() {
        let (video, audio, mut remote) = channels();
        let (media, _local) = media();
        let mut session = PeerSession::new(PeerId(0), test_config());
        session.start(video, audio, media).unwrap();

        remote
            .video
            .write_all(&((MAX as u32 + 1).to_be_bytes()))
            .await
            .unwrap();

        let outcome = session.wait().await;
        assert!(outcome.is_failure());
        assert_eq!(session.stats().video.protocol_errors, 1);
    }

    #[tokio::test]
    async fn test_panicking_sink_ends_session() {
        struct CrashingSink;

        impl MediaSink for CrashingSink {
            async fn consume(&mut self, _payload: Bytes) -> Result<()> {
                panic!("decoder crashed");
            }
        }

        let (video, audio, mut remote) = channels();
        let (_video_out, video_source) = mpsc::channel::<Bytes>(8);
        let (_audio_out, audio_source) = mpsc::channel::<Bytes>(8);
        let (audio_sink, _audio_in) = mpsc::channel::<Bytes>(8);
        let media = PeerMedia {
            video_source,
            video_sink: CrashingSink,
            audio_source,
            audio_sink,
        };

        let mut session = PeerSession::new(PeerId(0), test_config());
        session.start(video, audio, media).unwrap();
        write_frame(&mut remote.video, b"frame", MAX).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(3), session.ended())
            .await
            .unwrap();
        match outcome {
            SessionOutcome::Failed {
                kind,
                direction,
                error,
            } => {
                assert_eq!(kind, ChannelKind::Video);
                assert_eq!(direction, Direction::Receive);
                assert!(matches!(*error, Error::LoopPanicked(_)));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        session.stop().await;
        assert_eq!(
            session.worker_states(),
            (WorkerState::Stopped, WorkerState::Stopped)
        );
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (video, audio, _remote) = channels();
        let (media, _local) = media();
        let mut session = PeerSession::new(PeerId(0), test_config());
        session.start(video, audio, media).unwrap();

        assert!(matches!(session.stop().await, SessionOutcome::Completed));
        assert!(matches!(session.stop().await, SessionOutcome::Completed));
        assert!(matches!(session.ended().await, SessionOutcome::Completed));
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let (video, audio, _remote) = channels();
        let (first, _local) = media();
        let mut session = PeerSession::new(PeerId(0), test_config());
        session.start(video, audio, first).unwrap();

        let (video, audio, _remote2) = channels();
        let (second, _local2) = media();
        let err = session.start(video, audio, second).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_receivers_only() {
        let (video, audio, mut remote) = channels();
        let (video_reader, _video_writer) = video.into_split();
        let (audio_reader, _audio_writer) = audio.into_split();
        let (video_sink, mut video_in) = mpsc::channel::<Bytes>(8);
        let (audio_sink, _audio_in) = mpsc::channel::<Bytes>(8);

        let mut session = PeerSession::new(PeerId(0), test_config());
        session
            .start_receivers(video_reader, video_sink, audio_reader, audio_sink)
            .unwrap();

        write_frame(&mut remote.video, b"frame", MAX).await.unwrap();
        assert_eq!(&video_in.recv().await.unwrap()[..], b"frame");

        session.stop().await;
        assert_eq!(session.stats().video.frames_received, 1);
        assert_eq!(session.stats().video.frames_sent, 0);
    }
}
