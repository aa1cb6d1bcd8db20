//! `pulse-core` — configuration, error taxonomy, and the types shared
//! between the scheduler, the delivery pipeline, and the gateway.

pub mod config;
pub mod error;
pub mod types;

pub use config::PulseConfig;
pub use error::{PulseError, Result};
pub use types::{Payload, Subscriber};
