use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Caller-supplied interval outside 1–1440 minutes. Rejected
    /// synchronously; nothing is persisted.
    #[error("Invalid interval: {minutes} minutes (valid range is 1-1440)")]
    InvalidInterval { minutes: i64 },

    /// No active job for the given subscriber key.
    #[error("Job not found: {key}")]
    JobNotFound { key: String },

    /// A job record names a handler that was never registered.
    #[error("Unknown handler: {name}")]
    UnknownHandler { name: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
