//! Poll loop: scans the store for due jobs and dispatches their handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::handler::{HandlerOutcome, HandlerRegistry};
use crate::store::JobStore;

/// Runner knobs. `max_concurrent` bounds in-flight handler invocations, not
/// OS threads; `handler_timeout` turns a hung invocation into a failure.
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub poll_interval: Duration,
    pub max_concurrent: usize,
    pub handler_timeout: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_concurrent: 20,
            handler_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&pulse_core::config::RunnerConfig> for RunnerOptions {
    fn from(cfg: &pulse_core::config::RunnerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(cfg.poll_secs),
            max_concurrent: cfg.max_concurrent,
            handler_timeout: Duration::from_secs(cfg.handler_timeout_secs),
        }
    }
}

/// Removes the key from the in-flight set when dropped. The spawned task
/// holds one for its whole lifetime, so even a panicking handler cannot
/// leave its subscriber locked out of future cycles.
struct InFlightGuard {
    set: Arc<DashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

/// Polls the job store on a fixed period and executes due jobs.
///
/// One job's failure never reaches the loop: every outcome is absorbed in
/// the spawned task and recorded via `mark_run` / `cancel`.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    handlers: Arc<HandlerRegistry>,
    options: RunnerOptions,
    /// Per-key execution lock. A key present here has a handler in flight;
    /// later poll cycles skip it rather than double-dispatch.
    in_flight: Arc<DashSet<String>>,
    semaphore: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        handlers: Arc<HandlerRegistry>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            store,
            handlers,
            options,
            in_flight: Arc::new(DashSet::new()),
            semaphore: Arc::new(Semaphore::new(options.max_concurrent)),
        }
    }

    /// Main loop. Polls until `shutdown` broadcasts `true`.
    ///
    /// The first poll happens immediately, so jobs that became due while the
    /// process was down run without waiting out a full period.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_secs = self.options.poll_interval.as_secs(),
            max_concurrent = self.options.max_concurrent,
            "job runner started"
        );

        let mut interval = tokio::time::interval(self.options.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => self.poll_cycle(Utc::now()),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("job runner shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One poll cycle: snapshot due jobs, dispatch each asynchronously.
    /// Public so operators and tests can trigger a scan at a chosen instant.
    pub fn poll_cycle(&self, now: DateTime<Utc>) {
        let due = match self.store.find_due(now) {
            Ok(due) => due,
            Err(e) => {
                error!("due-job scan failed: {e}");
                return;
            }
        };

        for record in due {
            // Execution lock: skip silently on contention, this is the
            // normal case for a job still running from a previous cycle.
            if !self.in_flight.insert(record.key.clone()) {
                debug!(key = %record.key, "job already in flight; skipping this cycle");
                continue;
            }
            let guard = InFlightGuard {
                set: Arc::clone(&self.in_flight),
                key: record.key.clone(),
            };

            let Some(handler) = self.handlers.get(&record.handler_name) else {
                warn!(
                    key = %record.key,
                    handler = %record.handler_name,
                    "due job names an unregistered handler; skipping"
                );
                continue;
            };

            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&self.semaphore);
            let timeout = self.options.handler_timeout;

            tokio::spawn(async move {
                let _guard = guard;
                let key = record.key.clone();

                // Global concurrency ceiling. The semaphore is never closed,
                // so a failed acquire only happens during teardown.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                let outcome = match tokio::time::timeout(timeout, handler.run(&record)).await {
                    Ok(outcome) => outcome,
                    Err(_) => HandlerOutcome::Failed(format!(
                        "handler timed out after {}s",
                        timeout.as_secs()
                    )),
                };

                // Cadence anchors to the scheduled slot, not to "now", so
                // chronic failure or catch-up never accumulates drift.
                let result = match outcome {
                    HandlerOutcome::Delivered => {
                        info!(key = %key, "delivery complete");
                        store.mark_run(&key, record.next_run_at, true, record.next_slot())
                    }
                    HandlerOutcome::Failed(reason) => {
                        warn!(key = %key, %reason, "delivery failed; will retry on next slot");
                        store.mark_run(&key, record.next_run_at, false, record.next_slot())
                    }
                    HandlerOutcome::SubscriberGone => {
                        info!(key = %key, "subscriber gone; cancelling job");
                        store.cancel(&key)
                    }
                };
                if let Err(e) = result {
                    error!(key = %key, "failed to record job outcome: {e}");
                }
            });
        }
    }
}
