//! Job store: the durable SQLite implementation plus an in-memory one for
//! tests and ephemeral deployments.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::Result;
use crate::types::JobRecord;

/// Persistence contract for recurring job records.
///
/// Operations are atomic per key; no cross-key transactions are offered.
/// `find_due` returns a fresh snapshot on every call, never a live cursor.
pub trait JobStore: Send + Sync {
    /// Insert or replace the record for `record.key`. Replacing is what
    /// keeps the store at one record per subscriber.
    fn upsert(&self, record: &JobRecord) -> Result<()>;

    /// Deactivate the record for `key`. Idempotent: a missing or already
    /// inactive record is a no-op.
    fn cancel(&self, key: &str) -> Result<()>;

    /// Snapshot of active records with `next_run_at <= now`, soonest first.
    fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>>;

    /// Record the outcome of one execution. On success the fail counter
    /// resets and `last_run_at` is stamped; on failure it increments.
    /// Either way `next_run_at` moves to the given slot.
    ///
    /// Applies only while the record's `next_run_at` still equals
    /// `scheduled_for`. A reschedule that landed while the run was in flight
    /// changed that field, and the stale completion must not overwrite it.
    fn mark_run(
        &self,
        key: &str,
        scheduled_for: DateTime<Utc>,
        success: bool,
        next_run_at: DateTime<Utc>,
    ) -> Result<()>;

    /// The record for `key`, active or not.
    fn get(&self, key: &str) -> Result<Option<JobRecord>>;

    /// Number of active records.
    fn active_count(&self) -> Result<usize>;
}

// ── SQLite ────────────────────────────────────────────────────────────────────

const JOB_SELECT: &str = "SELECT key, handler, interval_minutes, next_run_at,
        last_run_at, fail_count, active, created_at, updated_at FROM jobs";

/// Map a SELECT row (column order from JOB_SELECT) to a JobRecord.
/// Centralised here so every query in this crate stays consistent.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let parse = |s: String| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    };
    Ok(JobRecord {
        key: row.get(0)?,
        handler_name: row.get(1)?,
        interval_minutes: row.get(2)?,
        next_run_at: parse(row.get(3)?)?,
        last_run_at: row.get::<_, Option<String>>(4)?.map(parse).transpose()?,
        fail_count: row.get(5)?,
        active: row.get::<_, i32>(6)? != 0,
        created_at: parse(row.get(7)?)?,
        updated_at: parse(row.get(8)?)?,
    })
}

/// Durable store over a shared SQLite connection.
///
/// The connection mutex serialises all mutations, which is strictly stronger
/// than the per-key ordering the scheduler needs: a `schedule → cancel →
/// schedule` sequence for one key is applied in the order issued.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl JobStore for SqliteJobStore {
    fn upsert(&self, record: &JobRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        // REPLACE deletes any prior row for the key inside the same
        // statement, so the one-record-per-key invariant holds even when a
        // cancelled row is being resurrected.
        conn.execute(
            "INSERT OR REPLACE INTO jobs
             (key, handler, interval_minutes, next_run_at, last_run_at,
              fail_count, active, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            rusqlite::params![
                record.key,
                record.handler_name,
                record.interval_minutes,
                record.next_run_at.to_rfc3339(),
                record.last_run_at.map(|dt| dt.to_rfc3339()),
                record.fail_count,
                record.active as i32,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn cancel(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        // Zero rows touched is fine — cancel is idempotent by contract.
        conn.execute(
            "UPDATE jobs SET active = 0, updated_at = ?2 WHERE key = ?1 AND active = 1",
            rusqlite::params![key, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "{JOB_SELECT} WHERE active = 1 AND next_run_at <= ?1 ORDER BY next_run_at"
        ))?;
        let jobs = stmt
            .query_map([now.to_rfc3339()], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn mark_run(
        &self,
        key: &str,
        scheduled_for: DateTime<Utc>,
        success: bool,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        // The WHERE clause matches the due time the runner dispatched at;
        // zero rows touched means the job was rescheduled mid-flight.
        if success {
            conn.execute(
                "UPDATE jobs SET next_run_at = ?2, last_run_at = ?3,
                        fail_count = 0, updated_at = ?3
                 WHERE key = ?1 AND next_run_at = ?4",
                rusqlite::params![key, next_run_at.to_rfc3339(), now, scheduled_for.to_rfc3339()],
            )?;
        } else {
            conn.execute(
                "UPDATE jobs SET next_run_at = ?2, fail_count = fail_count + 1,
                        updated_at = ?3
                 WHERE key = ?1 AND next_run_at = ?4",
                rusqlite::params![key, next_run_at.to_rfc3339(), now, scheduled_for.to_rfc3339()],
            )?;
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!("{JOB_SELECT} WHERE key = ?1"))?;
        let mut rows = stmt.query_map([key], row_to_job)?;
        Ok(rows.next().transpose()?)
    }

    fn active_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM jobs WHERE active = 1", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// HashMap-backed store with the same contract. Loses all schedules on
/// restart — use the SQLite store anywhere that matters.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn upsert(&self, record: &JobRecord) -> Result<()> {
        self.jobs
            .lock()
            .unwrap()
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn cancel(&self, key: &str) -> Result<()> {
        if let Some(rec) = self.jobs.lock().unwrap().get_mut(key) {
            rec.active = false;
            rec.updated_at = Utc::now();
        }
        Ok(())
    }

    fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>> {
        let jobs = self.jobs.lock().unwrap();
        let mut due: Vec<JobRecord> = jobs
            .values()
            .filter(|r| r.active && r.next_run_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|r| r.next_run_at);
        Ok(due)
    }

    fn mark_run(
        &self,
        key: &str,
        scheduled_for: DateTime<Utc>,
        success: bool,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(rec) = self.jobs.lock().unwrap().get_mut(key) {
            if rec.next_run_at != scheduled_for {
                return Ok(());
            }
            let now = Utc::now();
            rec.next_run_at = next_run_at;
            if success {
                rec.last_run_at = Some(now);
                rec.fail_count = 0;
            } else {
                rec.fail_count += 1;
            }
            rec.updated_at = now;
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<JobRecord>> {
        Ok(self.jobs.lock().unwrap().get(key).cloned())
    }

    fn active_count(&self) -> Result<usize> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.active)
            .count())
    }
}
