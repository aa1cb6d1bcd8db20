use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` table (idempotent) and an index on `next_run_at` so
/// the polling query stays efficient with thousands of subscribers. The
/// primary key on `key` is what enforces one job record per subscriber.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            key              TEXT    NOT NULL PRIMARY KEY,
            handler          TEXT    NOT NULL,
            interval_minutes INTEGER NOT NULL,
            next_run_at      TEXT    NOT NULL,   -- ISO-8601
            last_run_at      TEXT,               -- ISO-8601 or NULL
            fail_count       INTEGER NOT NULL DEFAULT 0,
            active           INTEGER NOT NULL DEFAULT 1,
            created_at       TEXT    NOT NULL,
            updated_at       TEXT    NOT NULL
        ) STRICT;

        -- Efficient polling: SELECT … WHERE active = 1 AND next_run_at <= ?
        CREATE INDEX IF NOT EXISTS idx_jobs_next_run_at ON jobs (next_run_at);
        ",
    )?;
    Ok(())
}
