//! Duplex channel worker
//!
//! Runs the send loop and the receive loop of one media channel as two
//! independent tasks, so a stall in one direction never blocks the other.
//!
//! ```text
//!            MediaSource ──► send loop ──► FrameWriter ──► transport
//! transport ──► FrameReader ──► receive loop ──► MediaSink
//! ```
//!
//! Every await point in a loop (producer, consumer, transport read/write) is
//! raced against the worker's stop signal, and transport I/O is bounded by
//! the configured timeouts. Each loop owns its transport half and its media
//! endpoint; both are dropped, and therefore released, when the loop ends.
//!
//! Timeouts only become fatal once the channel is established, that is once
//! the first inbound frame has arrived. Before that the remote end may still
//! be waiting for its partner at the rendezvous server.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio::time::{timeout, Instant};

use crate::error::{Error, Result, TimeoutKind};
use crate::media::{MediaSink, MediaSource};
use crate::protocol::{FrameReader, FrameWriter};
use crate::stats::ChannelStats;

use super::channel::{BoxedReader, BoxedWriter, Channel};
use super::config::WorkerConfig;
use super::context::{ChannelKind, Direction, LoopContext, PeerId};
use super::state::{LoopOutcome, WorkerEvent, WorkerState};

/// Framed read half of a channel
pub type ChannelReader = FrameReader<BoxedReader>;

/// Framed write half of a channel
pub type ChannelWriter = FrameWriter<BoxedWriter>;

/// Cloneable control handle for a worker
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    peer: PeerId,
    kind: ChannelKind,
    state: Arc<watch::Sender<WorkerState>>,
    stop: Arc<watch::Sender<bool>>,
}

impl WorkerHandle {
    /// Signal both loops to stop
    ///
    /// Loops observe the signal at their next await point, including one
    /// already blocked on a transport read.
    pub fn request_stop(&self) {
        let changed = self.state.send_if_modified(|state| {
            let next = state.on_stop_requested();
            let changed = next != *state;
            *state = next;
            changed
        });
        if changed {
            tracing::debug!(peer = %self.peer, channel = %self.kind, "Stop requested");
        }
        self.stop.send_replace(true);
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }
}

/// Marks the worker `Stopped` when its last loop is gone
///
/// Held by the task that reports a loop's outcome, so it is released after
/// the loop body has finished, panicked or been aborted.
struct ActiveLoop {
    active: Arc<AtomicUsize>,
    state: Arc<watch::Sender<WorkerState>>,
}

impl Drop for ActiveLoop {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.send_replace(WorkerState::Stopped);
        }
    }
}

/// A spawned loop body and the task waiting on it
struct LoopTask {
    body: AbortHandle,
    reporter: JoinHandle<()>,
}

/// Send and receive loops for one channel of one peer
pub struct ChannelWorker {
    handle: WorkerHandle,
    config: WorkerConfig,
    stats: Arc<ChannelStats>,
    established: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    events: Option<mpsc::UnboundedSender<WorkerEvent>>,
    tasks: Vec<LoopTask>,
}

impl ChannelWorker {
    /// Create an idle worker
    ///
    /// Loop outcomes are reported on `events` when given.
    pub fn new(
        peer: PeerId,
        kind: ChannelKind,
        config: WorkerConfig,
        events: Option<mpsc::UnboundedSender<WorkerEvent>>,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        let (stop, _) = watch::channel(false);

        Self {
            handle: WorkerHandle {
                peer,
                kind,
                state: Arc::new(state),
                stop: Arc::new(stop),
            },
            config,
            stats: Arc::new(ChannelStats::new()),
            established: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            events,
            tasks: Vec::with_capacity(2),
        }
    }

    pub fn peer(&self) -> PeerId {
        self.handle.peer
    }

    pub fn kind(&self) -> ChannelKind {
        self.handle.kind
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        self.handle.state()
    }

    /// Control handle, usable after the worker has been moved
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Shared channel counters
    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }

    /// Whether a frame has been received on this channel yet
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    /// Frame the read half with this worker's limits
    pub fn frame_reader(&self, reader: BoxedReader) -> ChannelReader {
        FrameReader::new(reader, self.config.max_frame_size)
    }

    /// Frame the write half with this worker's limits
    pub fn frame_writer(&self, writer: BoxedWriter) -> ChannelWriter {
        FrameWriter::new(writer, self.config.max_frame_size)
    }

    /// Start both loops on a channel
    pub fn start<S, K>(&mut self, channel: Channel, source: S, sink: K) -> Result<()>
    where
        S: MediaSource,
        K: MediaSink,
    {
        if !self.state().can_start() {
            return Err(Error::InvalidState(self.state()));
        }
        let (reader, writer) = channel.into_split();
        let reader = self.frame_reader(reader);
        let writer = self.frame_writer(writer);

        // Keeps the worker from reaching Stopped between the two spawns
        let _starting = self.track_loop();
        self.spawn_receiver(reader, sink)?;
        self.spawn_sender(writer, source)
    }

    /// Start the send loop
    pub fn spawn_sender<S: MediaSource>(&mut self, writer: ChannelWriter, source: S) -> Result<()> {
        let ctx = self.loop_context(Direction::Send);
        let io = self.loop_io();

        self.spawn_loop(ctx, send_loop(ctx, io, writer, source))
    }

    /// Start the receive loop
    pub fn spawn_receiver<K: MediaSink>(&mut self, reader: ChannelReader, sink: K) -> Result<()> {
        let ctx = self.loop_context(Direction::Receive);
        let io = self.loop_io();

        self.spawn_loop(ctx, receive_loop(ctx, io, reader, sink))
    }

    /// Signal both loops to stop
    pub fn request_stop(&self) {
        self.handle.request_stop();
    }

    /// Wait up to `limit` for the loops to exit, then force-close the rest
    ///
    /// Force-closing aborts the loop tasks, which drops the transport halves
    /// and devices they own. Returns `true` if every loop exited on its own.
    pub async fn join(&mut self, limit: Duration) -> bool {
        let mut state = self.handle.state.subscribe();
        let graceful = if self.tasks.is_empty() {
            true
        } else {
            timeout(limit, state.wait_for(|s| s.is_stopped())).await.is_ok()
        };

        if !graceful {
            tracing::warn!(
                peer = %self.peer(),
                channel = %self.kind(),
                timeout_ms = limit.as_millis() as u64,
                "Worker did not stop in time, force-closing"
            );
            for task in &self.tasks {
                task.body.abort();
            }
        }

        // A reporter finishes only after its body future has been dropped
        while let Some(task) = self.tasks.pop() {
            let _ = task.reporter.await;
        }

        self.events = None;
        self.handle.state.send_replace(WorkerState::Stopped);
        graceful
    }

    fn loop_context(&self, direction: Direction) -> LoopContext {
        LoopContext {
            peer: self.handle.peer,
            kind: self.handle.kind,
            direction,
        }
    }

    fn loop_io(&self) -> LoopIo {
        LoopIo {
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            established: Arc::clone(&self.established),
            stop: self.handle.stop.subscribe(),
        }
    }

    fn track_loop(&self) -> ActiveLoop {
        self.active.fetch_add(1, Ordering::AcqRel);
        ActiveLoop {
            active: Arc::clone(&self.active),
            state: Arc::clone(&self.handle.state),
        }
    }

    fn spawn_loop<F>(&mut self, ctx: LoopContext, body: F) -> Result<()>
    where
        F: Future<Output = LoopOutcome> + Send + 'static,
    {
        let mut started = false;
        self.handle.state.send_if_modified(|state| {
            match state {
                WorkerState::Idle => *state = WorkerState::Running,
                WorkerState::Running => {}
                _ => return false,
            }
            started = true;
            true
        });
        if !started {
            return Err(Error::InvalidState(self.state()));
        }

        let guard = self.track_loop();
        let handle = self.handle.clone();
        let events = self.events.clone();

        tracing::debug!(context = %ctx, "Starting channel loop");

        // The body runs in its own task so a panic surfaces as a JoinError
        let body = tokio::spawn(body);
        let abort = body.abort_handle();

        let reporter = tokio::spawn(async move {
            let _guard = guard;
            let outcome = match body.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    LoopOutcome::Failed(Error::LoopPanicked(panic_message(e)))
                }
                Err(_) => LoopOutcome::Stopped,
            };

            match &outcome {
                LoopOutcome::Stopped => tracing::debug!(context = %ctx, "Channel loop stopped"),
                LoopOutcome::Exhausted => tracing::debug!(context = %ctx, "Media source exhausted"),
                LoopOutcome::Closed => tracing::info!(context = %ctx, "Peer closed channel"),
                LoopOutcome::Failed(e) => {
                    tracing::error!(context = %ctx, error = %e, "Channel loop failed")
                }
            }

            // A dead direction takes its sibling down with it
            if outcome.ends_session() {
                handle.request_stop();
            }

            if let Some(events) = events {
                let _ = events.send(WorkerEvent {
                    context: ctx,
                    outcome,
                });
            }
        });

        self.tasks.push(LoopTask {
            body: abort,
            reporter,
        });
        Ok(())
    }
}

impl Drop for ChannelWorker {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            self.handle.request_stop();
        }
    }
}

impl std::fmt::Debug for ChannelWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelWorker")
            .field("peer", &self.handle.peer)
            .field("kind", &self.handle.kind)
            .field("state", &self.state())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// Everything a loop shares with its worker
struct LoopIo {
    config: WorkerConfig,
    stats: Arc<ChannelStats>,
    established: Arc<AtomicBool>,
    stop: watch::Receiver<bool>,
}

/// Resolves once stop is signalled or every stop handle is gone
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

fn panic_message(err: JoinError) -> String {
    let panic = err.into_panic();
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn send_loop<S: MediaSource>(
    ctx: LoopContext,
    io: LoopIo,
    mut writer: ChannelWriter,
    mut source: S,
) -> LoopOutcome {
    let LoopIo {
        config,
        stats,
        established,
        mut stop,
    } = io;
    let mut last_sent: Option<Instant> = None;

    let outcome = 'frames: loop {
        if *stop.borrow() {
            break LoopOutcome::Stopped;
        }

        if let Some(last) = last_sent {
            if !config.min_frame_interval.is_zero() {
                tokio::select! {
                    _ = stop_requested(&mut stop) => break LoopOutcome::Stopped,
                    _ = tokio::time::sleep_until(last + config.min_frame_interval) => {}
                }
            }
        }

        let payload = tokio::select! {
            _ = stop_requested(&mut stop) => break LoopOutcome::Stopped,
            next = source.next_payload() => match next {
                Ok(Some(payload)) => payload,
                Ok(None) => break LoopOutcome::Exhausted,
                Err(e) => break LoopOutcome::Failed(e),
            },
        };

        if let Err(e) = writer.queue_frame(&payload) {
            break LoopOutcome::Failed(e);
        }

        // A timed out flush leaves the rest of the frame queued in the writer
        let mut timeouts = 0u32;
        let written = loop {
            let flushed = tokio::select! {
                _ = stop_requested(&mut stop) => break 'frames LoopOutcome::Stopped,
                flushed = timeout(config.write_timeout, writer.flush()) => flushed,
            };

            match flushed {
                Ok(result) => break result,
                Err(_) => {
                    stats.record_write_timeout();
                    if !established.load(Ordering::Acquire) {
                        tracing::debug!(
                            context = %ctx,
                            pending = writer.pending(),
                            "Remote end not reading yet, still waiting"
                        );
                        continue;
                    }

                    timeouts += 1;
                    if timeouts >= config.max_write_timeouts {
                        break Err(Error::Timeout(TimeoutKind::Write));
                    }
                    tracing::warn!(
                        context = %ctx,
                        attempt = timeouts,
                        max = config.max_write_timeouts,
                        pending = writer.pending(),
                        "Frame not written within write timeout, retrying"
                    );
                }
            }
        };

        match written {
            Ok(()) => {
                stats.record_sent(payload.len());
                tracing::trace!(context = %ctx, size = payload.len(), "Frame sent");
                last_sent = Some(Instant::now());
            }
            Err(e) if e.is_connection_closed() => break LoopOutcome::Closed,
            Err(e) => break LoopOutcome::Failed(e),
        }
    };

    if matches!(outcome, LoopOutcome::Stopped | LoopOutcome::Exhausted) {
        // Let the peer see a clean end of stream
        let _ = timeout(config.write_timeout, writer.shutdown()).await;
    }

    outcome
}

async fn receive_loop<K: MediaSink>(
    ctx: LoopContext,
    io: LoopIo,
    mut reader: ChannelReader,
    mut sink: K,
) -> LoopOutcome {
    let LoopIo {
        config,
        stats,
        established,
        mut stop,
    } = io;
    let mut consecutive_timeouts = 0u32;

    loop {
        if *stop.borrow() {
            return LoopOutcome::Stopped;
        }

        let read = tokio::select! {
            _ = stop_requested(&mut stop) => return LoopOutcome::Stopped,
            read = timeout(config.read_timeout, reader.read_frame()) => read,
        };

        let payload = match read {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) if e.is_connection_closed() => return LoopOutcome::Closed,
            Ok(Err(e)) => {
                if e.is_protocol() {
                    stats.record_protocol_error();
                    tracing::error!(
                        context = %ctx,
                        error = %e,
                        buffered = reader.buffered(),
                        frames_received = stats.snapshot().frames_received,
                        "Malformed frame, channel out of sync"
                    );
                }
                return LoopOutcome::Failed(e);
            }
            Err(_) => {
                stats.record_read_timeout();
                if !established.load(Ordering::Acquire) {
                    tracing::debug!(context = %ctx, "No frame yet, waiting for the remote end");
                    continue;
                }

                consecutive_timeouts += 1;
                if consecutive_timeouts >= config.max_read_timeouts {
                    return LoopOutcome::Failed(Error::Timeout(TimeoutKind::Read));
                }
                tracing::warn!(
                    context = %ctx,
                    attempt = consecutive_timeouts,
                    max = config.max_read_timeouts,
                    "No frame within read timeout, retrying"
                );
                continue;
            }
        };

        if !established.swap(true, Ordering::AcqRel) {
            tracing::debug!(context = %ctx, "Channel established");
        }
        consecutive_timeouts = 0;
        stats.record_received(payload.len());
        tracing::trace!(context = %ctx, size = payload.len(), "Frame received");

        tokio::select! {
            _ = stop_requested(&mut stop) => return LoopOutcome::Stopped,
            consumed = sink.consume(payload) => {
                if let Err(e) = consumed {
                    return LoopOutcome::Failed(e);
                }
            }
        }
    }
}
