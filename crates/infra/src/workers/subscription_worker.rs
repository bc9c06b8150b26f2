use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};

use bookstore_events::{EventBus, EventEnvelope, Projection, Settlement, Subscription, TopicPattern};

/// Default number of delivery attempts per message.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to subscribe to {pattern}: {reason}")]
    Subscribe { pattern: String, reason: String },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Counters shared between a worker thread and its handle.
#[derive(Debug, Default)]
struct Counters {
    handled: AtomicU64,
    failed_attempts: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of a worker's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStats {
    /// Messages a handler accepted (possibly after retries).
    pub handled: u64,
    /// Individual failed or panicked handler invocations.
    pub failed_attempts: u64,
    /// Messages given up on after exhausting every attempt.
    pub dropped: u64,
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            handled: self.counters.handled.load(Ordering::Relaxed),
            failed_attempts: self.counters.failed_attempts.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Subscription worker loop.
///
/// - Owns one durable bus subscription named after the worker
/// - Runs the handler for each message; a failing or panicking handler is
///   retried up to `max_attempts` times, then the message is dropped with an
///   error log and the loop moves on
/// - Settles every message after handling: `Ack` on success, `Reject` once
///   attempts are exhausted
/// - Supports graceful shutdown
///
/// Handlers must tolerate duplicates and reordering (at-least-once delivery).
#[derive(Debug)]
pub struct SubscriptionWorker;

impl SubscriptionWorker {
    /// Subscribe to `pattern` under `name` and spawn a thread feeding `handler`.
    pub fn spawn<M, B, H, E>(
        name: impl Into<String>,
        bus: &B,
        pattern: &TopicPattern,
        max_attempts: u32,
        handler: H,
    ) -> Result<WorkerHandle, WorkerError>
    where
        M: Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(&M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug,
    {
        let name = name.into();
        let sub: Subscription<M> = bus.subscribe_durable(&name, pattern).map_err(|err| WorkerError::Subscribe {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let counters = Arc::new(Counters::default());

        let join = {
            let name = name.clone();
            let counters = counters.clone();
            let mut handler = handler;
            thread::Builder::new().name(name.clone()).spawn(move || {
                worker_loop(&name, sub, shutdown_rx, max_attempts.max(1), &counters, &mut handler)
            })?
        };

        debug!(worker = %name, pattern = %pattern, "subscription worker started");
        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
            counters,
        })
    }

    /// Feed a projection from every message matching `pattern`.
    pub fn spawn_projection<P, B>(
        name: impl Into<String>,
        bus: &B,
        pattern: &TopicPattern,
        max_attempts: u32,
        projection: Arc<P>,
    ) -> Result<WorkerHandle, WorkerError>
    where
        P: Projection + 'static,
        B: EventBus<EventEnvelope<P::Ev>> + ?Sized,
    {
        Self::spawn(name, bus, pattern, max_attempts, move |envelope: &EventEnvelope<P::Ev>| {
            projection.apply(envelope);
            Ok::<(), core::convert::Infallible>(())
        })
    }
}

fn worker_loop<M, H, E>(
    name: &str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    max_attempts: u32,
    counters: &Counters,
    handler: &mut H,
) where
    H: FnMut(&M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(TICK) {
            Ok(msg) => {
                let outcome = if deliver(name, &msg, max_attempts, counters, handler) {
                    Settlement::Ack
                } else {
                    Settlement::Reject
                };
                sub.settle(outcome);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker = name, "subscription worker stopped");
}

/// Returns whether some attempt succeeded.
fn deliver<M, H, E>(name: &str, msg: &M, max_attempts: u32, counters: &Counters, handler: &mut H) -> bool
where
    H: FnMut(&M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    for attempt in 1..=max_attempts {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(msg))) {
            Ok(Ok(())) => {
                counters.handled.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            Ok(Err(err)) => {
                warn!(worker = name, attempt, max_attempts, error = ?err, "subscription handler failed");
            }
            Err(_) => {
                warn!(worker = name, attempt, max_attempts, "subscription handler panicked");
            }
        }
        counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    counters.dropped.fetch_add(1, Ordering::Relaxed);
    error!(worker = name, max_attempts, "message dropped after exhausting delivery attempts");
    false
}
