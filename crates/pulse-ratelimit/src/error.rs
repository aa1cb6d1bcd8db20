use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Lookup of a limiter name that was never registered — a wiring bug,
    /// not a runtime condition.
    #[error("Unknown rate limiter: {name}")]
    UnknownLimiter { name: String },
}

pub type Result<T> = std::result::Result<T, RateLimitError>;
