//! End-to-end relay tests over loopback TCP

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use avrelay::media::MediaSource;
use avrelay::session::{ChannelKind, PeerMedia, WorkerState};
use avrelay::{
    ClientConfig, PeerClient, RelayServer, ServerConfig, SessionConfig, SessionOutcome,
    WorkerConfig,
};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const DEADLINE: Duration = Duration::from_secs(5);

fn session_config() -> SessionConfig {
    SessionConfig::default()
        .video(WorkerConfig::default())
        .stop_timeout(Duration::from_secs(1))
}

struct TestServer {
    session: SessionConfig,
    video_port: u16,
    audio_port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<avrelay::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(session_config()).await
    }

    /// Server and its clients share `session`
    async fn start_with(session: SessionConfig) -> Self {
        let config = ServerConfig::with_ip(LOCALHOST)
            .ports(0, 0)
            .session(session.clone());
        let server = RelayServer::bind(config).await.unwrap();
        let video_port = server.video_addr().unwrap().port();
        let audio_port = server.audio_addr().unwrap().port();

        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = signal.await;
                })
                .await
        });

        Self {
            session,
            video_port,
            audio_port,
            shutdown: Some(shutdown),
            task,
        }
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig::new(LOCALHOST)
            .ports(self.video_port, self.audio_port)
            .session(self.session.clone())
    }

    async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        timeout(DEADLINE, self.task)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap();
    }
}

/// Counts how many times it is released
struct CountedSource {
    frames: mpsc::Receiver<Bytes>,
    released: Arc<AtomicUsize>,
}

impl MediaSource for CountedSource {
    async fn next_payload(&mut self) -> avrelay::Result<Option<Bytes>> {
        Ok(self.frames.recv().await)
    }
}

impl Drop for CountedSource {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct TestPeer {
    client: PeerClient,
    video_out: mpsc::Sender<Bytes>,
    video_in: mpsc::Receiver<Bytes>,
    audio_out: mpsc::Sender<Bytes>,
    audio_in: mpsc::Receiver<Bytes>,
    released: Arc<AtomicUsize>,
}

impl TestPeer {
    async fn connect(server: &TestServer, audio_sink_capacity: usize) -> Self {
        let released = Arc::new(AtomicUsize::new(0));
        let (video_out, video_frames) = mpsc::channel::<Bytes>(64);
        let (audio_out, audio_frames) = mpsc::channel::<Bytes>(64);
        let (video_sink, video_in) = mpsc::channel::<Bytes>(64);
        let (audio_sink, audio_in) = mpsc::channel::<Bytes>(audio_sink_capacity);

        let media = PeerMedia {
            video_source: CountedSource {
                frames: video_frames,
                released: Arc::clone(&released),
            },
            video_sink,
            audio_source: CountedSource {
                frames: audio_frames,
                released: Arc::clone(&released),
            },
            audio_sink,
        };

        let client = PeerClient::connect(server.client_config(), media)
            .await
            .unwrap();

        Self {
            client,
            video_out,
            video_in,
            audio_out,
            audio_in,
            released,
        }
    }
}

async fn recv(rx: &mut mpsc::Receiver<Bytes>) -> Bytes {
    timeout(DEADLINE, rx.recv())
        .await
        .expect("frame not relayed in time")
        .expect("sink closed")
}

fn frame(tag: &str, n: usize) -> Bytes {
    Bytes::from(format!("{tag}-{n:04}").into_bytes())
}

#[tokio::test]
async fn test_frames_relayed_in_order_both_ways() {
    let server = TestServer::start().await;
    let mut peer0 = TestPeer::connect(&server, 64).await;
    let mut peer1 = TestPeer::connect(&server, 64).await;

    const N: usize = 25;
    for n in 0..N {
        peer0.video_out.send(frame("v0", n)).await.unwrap();
        peer0.audio_out.send(frame("a0", n)).await.unwrap();
        peer1.video_out.send(frame("v1", n)).await.unwrap();
        peer1.audio_out.send(frame("a1", n)).await.unwrap();
    }

    for n in 0..N {
        assert_eq!(recv(&mut peer1.video_in).await, frame("v0", n));
        assert_eq!(recv(&mut peer1.audio_in).await, frame("a0", n));
        assert_eq!(recv(&mut peer0.video_in).await, frame("v1", n));
        assert_eq!(recv(&mut peer0.audio_in).await, frame("a1", n));
    }

    // Empty and large frames pass through untouched
    let large = Bytes::from(vec![0xAB; 512 * 1024]);
    peer0.video_out.send(Bytes::new()).await.unwrap();
    peer0.video_out.send(large.clone()).await.unwrap();
    assert!(recv(&mut peer1.video_in).await.is_empty());
    assert_eq!(recv(&mut peer1.video_in).await, large);

    assert_eq!(peer0.client.stats().video.frames_sent, N as u64 + 2);
    assert_eq!(peer1.client.stats().audio.frames_received, N as u64);

    peer0.client.stop().await;
    peer1.client.stop().await;
    server.shutdown().await;
}

fn audio_block(n: usize) -> Bytes {
    let mut block = vec![(n % 251) as u8; 32 * 1024];
    block[..4].copy_from_slice(&(n as u32).to_be_bytes());
    Bytes::from(block)
}

#[tokio::test]
async fn test_stalled_audio_does_not_block_video() {
    // Short write deadlines, retried well past the length of the stall
    let worker = |config: WorkerConfig| {
        config
            .write_timeout(Duration::from_millis(300))
            .max_write_timeouts(50)
    };
    let session = session_config()
        .video(worker(WorkerConfig::default()))
        .audio(worker(WorkerConfig::audio()));
    let server = TestServer::start_with(session).await;
    let mut peer0 = TestPeer::connect(&server, 64).await;
    // Peer 1 does not drain audio until the end
    let mut peer1 = TestPeer::connect(&server, 1).await;

    // Far more audio than the sockets on the way can buffer
    const BLOCKS: usize = 3000;
    let queued = Arc::new(AtomicUsize::new(0));
    let feeder = tokio::spawn({
        let audio_out = peer0.audio_out.clone();
        let queued = Arc::clone(&queued);
        async move {
            for n in 0..BLOCKS {
                if audio_out.send(audio_block(n)).await.is_err() {
                    break;
                }
                queued.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    // Video keeps flowing both ways across several audio write timeouts
    for n in 0..10 {
        peer0.video_out.send(frame("v0", n)).await.unwrap();
        assert_eq!(recv(&mut peer1.video_in).await, frame("v0", n));
        peer1.video_out.send(frame("v1", n)).await.unwrap();
        assert_eq!(recv(&mut peer0.video_in).await, frame("v1", n));
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    assert!(queued.load(Ordering::SeqCst) < BLOCKS);
    assert!(peer0.client.session().outcome().is_none());
    assert!(peer1.client.session().outcome().is_none());
    assert_eq!(peer0.client.stats().video.frames_sent, 10);
    assert_eq!(
        peer0.client.session().worker_states(),
        (WorkerState::Running, WorkerState::Running)
    );

    // Once drained, every audio block arrives intact and in order
    for n in 0..BLOCKS {
        let block = recv(&mut peer1.audio_in).await;
        assert_eq!(block.len(), 32 * 1024);
        assert_eq!(&block[..4], &(n as u32).to_be_bytes());
    }
    timeout(DEADLINE, feeder).await.unwrap().unwrap();
    assert_eq!(peer1.client.stats().audio.frames_received, BLOCKS as u64);
    assert!(peer1.client.session().outcome().is_none());

    peer0.client.stop().await;
    peer1.client.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_first_peer_waits_for_partner() {
    let timeouts = Duration::from_millis(200);
    let server = TestServer::start_with(session_config().io_timeouts(timeouts, timeouts)).await;
    let mut peer0 = TestPeer::connect(&server, 64).await;

    // Many read timeouts pass with nobody to pair with
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(peer0.client.session().outcome().is_none());
    assert_eq!(
        peer0.client.session().worker_states(),
        (WorkerState::Running, WorkerState::Running)
    );
    assert!(peer0.client.stats().video.read_timeouts >= 3);

    let mut peer1 = TestPeer::connect(&server, 64).await;
    peer0.video_out.send(frame("v0", 0)).await.unwrap();
    assert_eq!(recv(&mut peer1.video_in).await, frame("v0", 0));
    peer1.audio_out.send(frame("a1", 0)).await.unwrap();
    assert_eq!(recv(&mut peer0.audio_in).await, frame("a1", 0));

    peer0.client.stop().await;
    peer1.client.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_graceful_stop_releases_everything_once() {
    let server = TestServer::start().await;
    let mut peer0 = TestPeer::connect(&server, 64).await;
    let mut peer1 = TestPeer::connect(&server, 64).await;

    peer0.video_out.send(frame("v0", 0)).await.unwrap();
    assert_eq!(recv(&mut peer1.video_in).await, frame("v0", 0));

    let outcome = peer0.client.stop().await;
    assert!(matches!(outcome, SessionOutcome::Completed));
    assert_eq!(
        peer0.client.session().worker_states(),
        (WorkerState::Stopped, WorkerState::Stopped)
    );
    assert_eq!(peer0.released.load(Ordering::SeqCst), 2);

    // The relay tears the pair down, so the other peer sees a close
    let outcome = timeout(DEADLINE, peer1.client.wait()).await.unwrap();
    assert!(matches!(outcome, SessionOutcome::PeerClosed { .. }));
    assert_eq!(
        peer1.client.session().worker_states(),
        (WorkerState::Stopped, WorkerState::Stopped)
    );
    assert_eq!(peer1.released.load(Ordering::SeqCst), 2);

    // Stopping again changes nothing
    peer0.client.stop().await;
    assert_eq!(peer0.released.load(Ordering::SeqCst), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_server_pairs_again_after_peer_leaves() {
    let server = TestServer::start().await;
    let peer0 = TestPeer::connect(&server, 64).await;
    let mut peer1 = TestPeer::connect(&server, 64).await;

    // Abrupt departure: dropping the client closes its connections
    drop(peer0);

    let outcome = timeout(DEADLINE, peer1.client.wait()).await.unwrap();
    match outcome {
        SessionOutcome::PeerClosed { kind } => {
            assert!(kind == ChannelKind::Video || kind == ChannelKind::Audio)
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let mut peer2 = TestPeer::connect(&server, 64).await;
    let mut peer3 = TestPeer::connect(&server, 64).await;

    peer2.audio_out.send(frame("a2", 0)).await.unwrap();
    peer3.video_out.send(frame("v3", 0)).await.unwrap();
    assert_eq!(recv(&mut peer3.audio_in).await, frame("a2", 0));
    assert_eq!(recv(&mut peer2.video_in).await, frame("v3", 0));

    peer2.client.stop().await;
    peer3.client.stop().await;
    server.shutdown().await;
}
