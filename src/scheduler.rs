//! Scheduler module driving periodic flushes.
//!
//! At most one timer is active per scheduler. Starting again cancels the
//! running timer before the new one is spawned.
//!
//! Cancellation is cooperative: a tick that is already running completes,
//! and the timer task exits before its next tick.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to the running timer task.
#[derive(Debug)]
struct ActiveTimer {
    stop_tok: CancellationToken,
    handle: JoinHandle<()>,
    period: Duration,
    generation: u64,
}

impl ActiveTimer {
    fn cancel(self) -> JoinHandle<()> {
        self.stop_tok.cancel();
        debug!(
            generation = self.generation,
            period_ms = self.period.as_millis() as u64,
            "Flush timer cancelled"
        );
        self.handle
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    active: Option<ActiveTimer>,
    generation: u64,
}

/// Recurring flush timer with explicit cancellation.
#[derive(Debug, Default)]
pub struct FlushScheduler {
    state: Mutex<SchedulerState>,
}

impl FlushScheduler {
    /// Create a scheduler with no active timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `period`, cancelling any timer already running.
    ///
    /// The first tick fires one full period after the call. Each tick awaits
    /// `on_tick` before the next one is considered, so ticks never overlap.
    /// Must be called from within a Tokio runtime.
    pub fn start<F, Fut>(&self, period: Duration, on_tick: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(previous) = state.active.take() {
            drop(previous.cancel());
        }

        state.generation += 1;
        let generation = state.generation;
        let stop_tok = CancellationToken::new();
        let task_tok = stop_tok.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_tok.cancelled() => break,
                    _ = ticker.tick() => on_tick().await,
                }
            }
        });

        debug!(
            generation,
            period_ms = period.as_millis() as u64,
            "Flush timer started"
        );
        state.active = Some(ActiveTimer {
            stop_tok,
            handle,
            period,
            generation,
        });
    }

    /// Cancel the active timer, if any.
    ///
    /// A tick in progress is left to finish in the background.
    pub fn stop(&self) {
        let active = self.state.lock().active.take();
        if let Some(active) = active {
            drop(active.cancel());
        }
    }

    /// Cancel the active timer and wait for a tick in progress to finish.
    pub async fn stop_and_wait(&self) {
        let active = self.state.lock().active.take();
        if let Some(active) = active {
            if let Err(e) = active.cancel().await {
                warn!(error = %e, "Flush timer task ended abnormally");
            }
        }
    }

    /// Whether a timer is currently installed.
    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Period of the active timer.
    pub fn period(&self) -> Option<Duration> {
        self.state.lock().active.as_ref().map(|active| active.period)
    }

    /// Number of timers started over the scheduler's lifetime.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        if let Some(active) = self.state.get_mut().active.take() {
            drop(active.cancel());
        }
    }
}
