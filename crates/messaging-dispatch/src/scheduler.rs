//! Periodic tick scheduler with cooperative cancellation.
//!
//! Owns one background worker that fires the injected tick function
//! immediately on start and then once per interval. Ticks are strictly
//! serialized; a tick that outlives the interval simply delays the next one.
//! A panicking tick is caught and logged, and the worker keeps going.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::SchedulerError;

/// Boxed future produced by one tick invocation.
pub type TickFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// Injected tick function.
///
/// Receives the worker's cancellation token so in-flight database and HTTP
/// work can abort promptly on [`Scheduler::stop`].
pub type TickFn = std::sync::Arc<dyn Fn(CancellationToken) -> TickFuture + Send + Sync>;

/// Handles owned by one scheduler run.
struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic background scheduler.
///
/// Lifecycle is `idle <-> running`. `start`/`stop` are serialized by a
/// mutex; `is_running` is a lock-free read. `start` immediately followed by
/// `stop` always lands back in `idle` with no leaked background task.
pub struct Scheduler {
    interval: Duration,
    tick: TickFn,
    running: AtomicBool,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("interval", &self.interval)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler firing `tick` every `interval`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::ZeroInterval` for a zero interval.
    pub fn new(interval: Duration, tick: TickFn) -> Result<Self, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        Ok(Self { interval, tick, running: AtomicBool::new(false), worker: Mutex::new(None) })
    }

    /// Starts the tick worker.
    ///
    /// Returns `false` without side effects when already running. The first
    /// tick fires immediately so operators observe work without waiting a
    /// full interval.
    pub async fn start(&self) -> bool {
        let mut slot = self.worker.lock().await;
        if slot.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle =
            tokio::spawn(run_worker(self.interval, self.tick.clone(), cancel.clone()));
        *slot = Some(Worker { cancel, handle });
        self.running.store(true, Ordering::Release);

        true
    }

    /// Stops the tick worker, waiting for any in-flight tick to finish.
    ///
    /// Returns `false` when not running. After `stop` returns no further
    /// tick executes until the next `start`.
    pub async fn stop(&self) -> bool {
        let mut slot = self.worker.lock().await;
        let Some(worker) = slot.take() else {
            return false;
        };

        worker.cancel.cancel();
        if let Err(join_error) = worker.handle.await {
            error!(error = %join_error, "tick worker terminated abnormally");
        }
        self.running.store(false, Ordering::Release);

        true
    }

    /// Lock-free read of the lifecycle flag.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Configured tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Worker loop: immediate tick, then one tick per interval until cancelled.
async fn run_worker(interval: Duration, tick: TickFn, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // A slow tick delays the next one instead of queueing a burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = interval.as_secs(), "scheduler started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("scheduler stopping");
                break;
            }
            _ = ticker.tick() => run_tick(&tick, &cancel).await,
        }
    }
}

/// Runs one tick behind a panic barrier.
///
/// The tick future executes in its own task so a panic surfaces as a
/// `JoinError` here instead of unwinding through the worker loop.
async fn run_tick(tick: &TickFn, cancel: &CancellationToken) {
    let started = Instant::now();

    match tokio::spawn((tick)(cancel.clone())).await {
        Ok(()) => {
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            info!(duration_ms, "tick completed");
        },
        Err(join_error) if join_error.is_panic() => {
            let payload = join_error.into_panic();
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(panic = %detail, "tick panicked; worker continues");
        },
        Err(_) => {
            // Task was cancelled; only happens when the runtime shuts down.
        },
    }
}
