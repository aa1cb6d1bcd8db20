use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The upstream feed or the subscriber endpoint could not be reached.
    /// Transient by definition — the runner retries on the next slot.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The subscriber endpoint answered with a non-success status.
    #[error("Delivery rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// Underlying SQLite / rusqlite error from the directory.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
