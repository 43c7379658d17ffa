//! The long-lived sync job: one-shot runs, periodic polling, and state
//! emission.
//!
//! All passes execute on a single worker task, so runs are serialized:
//! a `run()` issued while another pass is executing is queued behind it.
//! Polling is anchored to the wall clock; a tick that lands while a run is
//! still queued or executing is skipped rather than queued.

use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::stream::{Emitter, SyncStateStream};
use super::synchronizer::Synchronizer;
use crate::error::SyncError;
use crate::params::SyncParams;
use crate::ports::{DataSource, LocalChangeStore};
use crate::state::{ResourceSyncException, SyncState};

/// Shortest accepted poll period
pub const MIN_POLL_PERIOD: Duration = Duration::from_millis(1);

enum Command {
    Run,
}

/// State shared between the job handle, its worker and its poll timers.
struct Shared {
    emitter: Emitter,
    /// Runs queued or executing
    pending: AtomicUsize,
    cancel: CancellationToken,
}

impl Shared {
    fn enqueue(&self, commands: &mpsc::UnboundedSender<Command>) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if commands.send(Command::Run).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }
}

/// Orchestrates sync passes and publishes their progress.
///
/// Construct it once, share it (e.g. behind an `Arc`), and call
/// [`close`](Self::close) when done. Dropping the job closes it too.
pub struct SyncJob {
    runtime: Handle,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl SyncJob {
    /// Creates the job and starts its worker on `runtime`.
    pub fn new(
        runtime: Handle,
        store: Arc<dyn LocalChangeStore>,
        data_source: Arc<dyn DataSource>,
        params: SyncParams,
    ) -> Self {
        Self::with_synchronizer(runtime, Synchronizer::new(store, data_source, params))
    }

    pub fn with_synchronizer(runtime: Handle, synchronizer: Synchronizer) -> Self {
        let shared = Arc::new(Shared {
            emitter: Emitter::default(),
            pending: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        });
        let (commands, rx) = mpsc::unbounded_channel();

        runtime.spawn(worker(shared.clone(), Arc::new(synchronizer), rx));

        Self {
            runtime,
            shared,
            commands,
        }
    }

    /// Live stream of state transitions, starting with `Nothing`.
    pub fn subscribe(&self) -> SyncStateStream {
        self.shared.emitter.subscribe()
    }

    /// Requests one pass. Returns immediately; progress is reported through
    /// subscribed streams.
    pub fn run(&self) {
        if self.is_closed() {
            tracing::warn!("Sync job is closed, ignoring run request");
            return;
        }
        if self.shared.enqueue(&self.commands) {
            tracing::debug!("Sync run requested");
        }
    }

    /// Subscribes with a timer that requests a run after `initial_delay`
    /// and then every `period`.
    ///
    /// The stream is lazy: the timer starts, and `initial_delay` begins
    /// counting, on its first read. The sequence never ends on its own: it
    /// stops when the returned stream is dropped or the job is closed.
    pub fn poll(&self, period: Duration, initial_delay: Duration) -> SyncStateStream {
        let mut stream = self.subscribe();
        if self.is_closed() {
            return stream;
        }

        let period = if period < MIN_POLL_PERIOD {
            tracing::warn!("Poll period {:?} too short, using {:?}", period, MIN_POLL_PERIOD);
            MIN_POLL_PERIOD
        } else {
            period
        };

        let token = self.shared.cancel.child_token();
        let runtime = self.runtime.clone();
        let shared = self.shared.clone();
        let commands = self.commands.clone();
        stream.attach_timer(Box::new(move || {
            let start = Instant::now() + initial_delay;
            runtime.spawn(poll_timer(shared, commands, start, period, token.clone()));
            tracing::info!(
                "Polling every {:?} after an initial delay of {:?}",
                period,
                initial_delay
            );
            token.drop_guard()
        }));
        stream
    }

    /// Stops all poll timers and the worker, and ends every subscription.
    /// A pass that is mid-flight is abandoned. Safe to call repeatedly.
    pub fn close(&self) {
        if self.shared.emitter.close() {
            self.shared.cancel.cancel();
            tracing::info!("Sync job closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.emitter.is_closed()
    }

    /// The most recently emitted state
    pub fn state(&self) -> SyncState {
        self.shared.emitter.current()
    }
}

impl Drop for SyncJob {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncJob")
            .field("state", &self.state().name())
            .field("pending", &self.shared.pending.load(Ordering::SeqCst))
            .field("subscribers", &self.shared.emitter.subscriber_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn worker(
    shared: Arc<Shared>,
    synchronizer: Arc<Synchronizer>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    loop {
        let command = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Run => {
                if !execute(&shared, &synchronizer).await {
                    break;
                }
            }
        }
    }
    tracing::debug!("Sync worker stopped");
}

/// Runs one pass, emitting its full state sequence. Returns false when the
/// job was closed mid-pass.
async fn execute(shared: &Shared, synchronizer: &Arc<Synchronizer>) -> bool {
    shared.emitter.emit(SyncState::Started);
    shared.emitter.emit(SyncState::InProgress);

    // Spawned so a panicking pass surfaces as a JoinError instead of
    // taking the worker down.
    let sync = synchronizer.clone();
    let mut pass = tokio::spawn(async move { sync.run_pass().await });

    let terminal = tokio::select! {
        _ = shared.cancel.cancelled() => {
            pass.abort();
            tracing::debug!("Abandoned in-flight sync pass");
            return false;
        }
        res = &mut pass => match res {
            Ok(outcome) => SyncState::from(outcome),
            Err(e) => {
                let message = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                tracing::error!("Sync pass failed unexpectedly: {}", message);
                SyncState::Error {
                    last_sync_timestamp: Utc::now(),
                    exceptions: vec![ResourceSyncException::new(
                        None,
                        SyncError::Internal(message),
                    )],
                }
            }
        },
    };

    shared.pending.fetch_sub(1, Ordering::SeqCst);
    shared.emitter.emit(terminal);
    true
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "sync pass panicked".to_string()
    }
}

async fn poll_timer(
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    start: Instant,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if shared.pending.load(Ordering::SeqCst) > 0 {
                    tracing::debug!("Previous sync run still pending, skipping poll tick");
                    continue;
                }
                if !shared.enqueue(&commands) {
                    tracing::warn!("Sync worker is gone, stopping poll timer");
                    break;
                }
            }
        }
    }
    tracing::debug!("Poll timer stopped");
}
