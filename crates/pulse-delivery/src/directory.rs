//! Subscriber directory: who receives digests, and where.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use pulse_core::types::Subscriber;
use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Read interface consulted by the delivery handler to decide whether a
/// subscriber still exists and is enabled.
pub trait SubscriberDirectory: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Subscriber>>;

    fn is_active(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.map(|s| s.active).unwrap_or(false))
    }
}

const SUBSCRIBER_SELECT: &str = "SELECT key, webhook_url, secret, interval_minutes,
        active, created_at, updated_at FROM subscribers";

/// Map a SELECT row (column order from SUBSCRIBER_SELECT) to a Subscriber.
fn row_to_subscriber(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscriber> {
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
    Ok(Subscriber {
        key: row.get(0)?,
        webhook_url: row.get(1)?,
        secret: row.get(2)?,
        interval_minutes: row.get(3)?,
        active: row.get::<_, i32>(4)? != 0,
        created_at: parse(row.get(5)?)?,
        updated_at: parse(row.get(6)?)?,
    })
}

/// Initialise the subscribers schema in `conn`. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS subscribers (
            key              TEXT    NOT NULL PRIMARY KEY,
            webhook_url      TEXT    NOT NULL,
            secret           TEXT,
            interval_minutes INTEGER NOT NULL,
            active           INTEGER NOT NULL DEFAULT 1,
            created_at       TEXT    NOT NULL,
            updated_at       TEXT    NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

/// SQLite-backed directory, shared behind a connection mutex like every
/// other subsystem store.
pub struct SqliteDirectory {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDirectory {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or update a subscriber, preserving `created_at` on update.
    pub fn upsert(&self, sub: &Subscriber) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO subscribers
             (key, webhook_url, secret, interval_minutes, active, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)
             ON CONFLICT(key) DO UPDATE SET
                webhook_url = ?2, secret = ?3, interval_minutes = ?4,
                active = ?5, updated_at = ?7",
            rusqlite::params![
                sub.key,
                sub.webhook_url,
                sub.secret,
                sub.interval_minutes,
                sub.active as i32,
                sub.created_at.to_rfc3339(),
                sub.updated_at.to_rfc3339(),
            ],
        )?;
        info!(key = %sub.key, "subscriber upserted");
        Ok(())
    }

    /// Disable a subscriber. Idempotent; the row is kept for inspection.
    pub fn deactivate(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE subscribers SET active = 0, updated_at = ?2 WHERE key = ?1",
            rusqlite::params![key, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// All enabled subscribers, for the admin listing.
    pub fn list_active(&self) -> Result<Vec<Subscriber>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached(&format!("{SUBSCRIBER_SELECT} WHERE active = 1 ORDER BY key"))?;
        let subs = stmt
            .query_map([], row_to_subscriber)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subs)
    }
}

impl SubscriberDirectory for SqliteDirectory {
    fn get(&self, key: &str) -> Result<Option<Subscriber>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!("{SUBSCRIBER_SELECT} WHERE key = ?1"))?;
        let mut rows = stmt.query_map([key], row_to_subscriber)?;
        Ok(rows.next().transpose()?)
    }
}
