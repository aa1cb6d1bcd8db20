//! Public scheduling API used by the gateway's admin routes.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::{Result, SchedulerError};
use crate::handler::{HandlerOutcome, HandlerRegistry};
use crate::store::JobStore;
use crate::types::JobRecord;

/// Schedule / cancel / run-now facade over the job store.
///
/// Enforces one active job per subscriber: scheduling replaces whatever
/// record existed for the key. Store mutations for a key are serialised by
/// the store itself, so `schedule → cancel → schedule` applies in order.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    handlers: Arc<HandlerRegistry>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, handlers: Arc<HandlerRegistry>) -> Self {
        Self { store, handlers }
    }

    /// Create (or replace) the recurring job for `key`.
    ///
    /// Validates the interval first; an out-of-range value fails with
    /// [`SchedulerError::InvalidInterval`] and touches nothing. Idempotent:
    /// repeating the call leaves exactly one active job.
    pub fn schedule(&self, key: &str, handler_name: &str, interval_minutes: u32) -> Result<JobRecord> {
        if !self.handlers.has(handler_name) {
            return Err(SchedulerError::UnknownHandler {
                name: handler_name.to_string(),
            });
        }
        let record = JobRecord::new(key, handler_name, interval_minutes, Utc::now())?;
        self.store.upsert(&record)?;
        info!(key, interval_minutes, "job scheduled");
        Ok(record)
    }

    /// Deactivate the job for `key`. No-op when none exists. Does not
    /// interrupt an in-flight delivery; it only stops future polls.
    pub fn cancel(&self, key: &str) -> Result<()> {
        self.store.cancel(key)?;
        info!(key, "job cancelled");
        Ok(())
    }

    /// Invoke the job's handler immediately, bypassing the schedule.
    /// `next_run_at` is left untouched — this is a manual trigger, not a run.
    pub async fn run_now(&self, key: &str) -> Result<HandlerOutcome> {
        let record = self
            .store
            .get(key)?
            .filter(|r| r.active)
            .ok_or_else(|| SchedulerError::JobNotFound {
                key: key.to_string(),
            })?;

        let handler =
            self.handlers
                .get(&record.handler_name)
                .ok_or_else(|| SchedulerError::UnknownHandler {
                    name: record.handler_name.clone(),
                })?;

        info!(key, "manual run triggered");
        Ok(handler.run(&record).await)
    }

    /// The job record for `key`, active or cancelled.
    pub fn get(&self, key: &str) -> Result<Option<JobRecord>> {
        self.store.get(key)
    }

    /// Number of active job records — observability hook.
    pub fn active_count(&self) -> Result<usize> {
        self.store.active_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::JobHandler;
    use crate::store::MemoryJobStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn run(&self, _record: &JobRecord) -> HandlerOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            HandlerOutcome::Delivered
        }
    }

    fn scheduler() -> (Scheduler, Arc<MemoryJobStore>, Arc<CountingHandler>) {
        let store = Arc::new(MemoryJobStore::new());
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
        });
        let mut handlers = HandlerRegistry::new();
        handlers.register("digest", handler.clone());
        (
            Scheduler::new(store.clone(), Arc::new(handlers)),
            store,
            handler,
        )
    }

    #[test]
    fn schedule_creates_exactly_one_active_record() {
        let (scheduler, store, _) = scheduler();
        let rec = scheduler.schedule("u1", "digest", 30).unwrap();
        assert_eq!(rec.interval_minutes, 30);
        assert_eq!(store.active_count().unwrap(), 1);
    }

    #[test]
    fn out_of_range_interval_is_rejected_and_nothing_persists() {
        let (scheduler, store, _) = scheduler();
        for minutes in [0u32, 1441, 10_000] {
            let err = scheduler.schedule("u1", "digest", minutes).unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidInterval { .. }));
        }
        assert_eq!(store.active_count().unwrap(), 0);
        assert!(store.get("u1").unwrap().is_none());
    }

    #[test]
    fn reschedule_replaces_the_previous_job() {
        let (scheduler, store, _) = scheduler();
        scheduler.schedule("u1", "digest", 5).unwrap();
        scheduler.schedule("u1", "digest", 10).unwrap();

        assert_eq!(store.active_count().unwrap(), 1);
        let rec = store.get("u1").unwrap().unwrap();
        assert_eq!(rec.interval_minutes, 10);
        assert!(rec.active);
    }

    #[test]
    fn schedule_twice_with_same_args_is_idempotent() {
        let (scheduler, store, _) = scheduler();
        scheduler.schedule("u1", "digest", 7).unwrap();
        scheduler.schedule("u1", "digest", 7).unwrap();
        assert_eq!(store.active_count().unwrap(), 1);
    }

    #[test]
    fn cancel_without_a_job_is_a_no_op() {
        let (scheduler, store, _) = scheduler();
        scheduler.cancel("ghost").unwrap();
        assert_eq!(store.active_count().unwrap(), 0);
    }

    #[test]
    fn cancel_then_reschedule_yields_one_active_record() {
        let (scheduler, store, _) = scheduler();
        scheduler.schedule("u1", "digest", 5).unwrap();
        scheduler.cancel("u1").unwrap();
        assert_eq!(store.active_count().unwrap(), 0);

        scheduler.schedule("u1", "digest", 15).unwrap();
        assert_eq!(store.active_count().unwrap(), 1);
        assert_eq!(store.get("u1").unwrap().unwrap().interval_minutes, 15);
    }

    #[test]
    fn unknown_handler_name_is_rejected() {
        let (scheduler, _, _) = scheduler();
        let err = scheduler.schedule("u1", "nope", 5).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownHandler { .. }));
    }

    #[tokio::test]
    async fn run_now_invokes_handler_without_moving_the_schedule() {
        let (scheduler, store, handler) = scheduler();
        let rec = scheduler.schedule("u1", "digest", 60).unwrap();

        let outcome = scheduler.run_now("u1").await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Delivered);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        let after = store.get("u1").unwrap().unwrap();
        assert_eq!(after.next_run_at, rec.next_run_at);
    }

    #[tokio::test]
    async fn run_now_on_missing_or_cancelled_job_is_not_found() {
        let (scheduler, _, _) = scheduler();
        assert!(matches!(
            scheduler.run_now("ghost").await.unwrap_err(),
            SchedulerError::JobNotFound { .. }
        ));

        scheduler.schedule("u1", "digest", 5).unwrap();
        scheduler.cancel("u1").unwrap();
        assert!(matches!(
            scheduler.run_now("u1").await.unwrap_err(),
            SchedulerError::JobNotFound { .. }
        ));
    }
}
