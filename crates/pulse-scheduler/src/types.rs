use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

pub const MIN_INTERVAL_MINUTES: u32 = 1;
pub const MAX_INTERVAL_MINUTES: u32 = 1440;

/// A persisted recurring job — one per subscriber with an active schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Subscriber key — primary key in the store, so at most one record
    /// (active or not) exists per subscriber.
    pub key: String,
    /// Which registered handler the runner invokes when the job is due.
    pub handler_name: String,
    /// Delivery cadence, 1–1440 minutes.
    pub interval_minutes: u32,
    /// Next due execution.
    pub next_run_at: DateTime<Utc>,
    /// Last successful execution, if any.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Consecutive failures since the last success.
    pub fail_count: u32,
    /// Cancelled jobs keep their row with active = false.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Build a fresh record with `next_run_at = now + interval`.
    ///
    /// Fails with [`SchedulerError::InvalidInterval`] outside 1–1440.
    pub fn new(
        key: &str,
        handler_name: &str,
        interval_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        validate_interval(interval_minutes as i64)?;
        Ok(Self {
            key: key.to_string(),
            handler_name: handler_name.to_string(),
            interval_minutes,
            next_run_at: now + Duration::minutes(interval_minutes as i64),
            last_run_at: None,
            fail_count: 0,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::minutes(self.interval_minutes as i64)
    }

    /// The cadence-preserving next slot: anchored to the scheduled time so
    /// chronic failures (or catch-up after downtime) never accumulate drift.
    pub fn next_slot(&self) -> DateTime<Utc> {
        self.next_run_at + self.interval()
    }
}

pub fn validate_interval(minutes: i64) -> Result<()> {
    if (MIN_INTERVAL_MINUTES as i64..=MAX_INTERVAL_MINUTES as i64).contains(&minutes) {
        Ok(())
    } else {
        Err(SchedulerError::InvalidInterval { minutes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_active_with_future_next_run() {
        let now = Utc::now();
        let rec = JobRecord::new("u1", "digest", 5, now).unwrap();
        assert!(rec.active);
        assert_eq!(rec.fail_count, 0);
        assert_eq!(rec.next_run_at, now + Duration::minutes(5));
        assert!(rec.last_run_at.is_none());
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        let now = Utc::now();
        assert!(JobRecord::new("u1", "digest", 1, now).is_ok());
        assert!(JobRecord::new("u1", "digest", 1440, now).is_ok());
        assert!(matches!(
            JobRecord::new("u1", "digest", 0, now),
            Err(SchedulerError::InvalidInterval { minutes: 0 })
        ));
        assert!(matches!(
            JobRecord::new("u1", "digest", 1441, now),
            Err(SchedulerError::InvalidInterval { minutes: 1441 })
        ));
    }

    #[test]
    fn next_slot_advances_by_exactly_one_interval() {
        let now = Utc::now();
        let rec = JobRecord::new("u1", "digest", 10, now).unwrap();
        assert_eq!(rec.next_slot(), rec.next_run_at + Duration::minutes(10));
    }
}
