//! `pulse-ratelimit` — named fixed-window rate limiters.
//!
//! # Overview
//!
//! Each [`RateLimiter`] owns one policy (max requests per window) and one
//! [`window::FixedWindowStore`] of per-key counters. The window is fixed,
//! not a sliding log: O(1) memory per key, counter resets at window
//! boundaries. Limiters live in a [`LimiterRegistry`] built once at startup
//! from the config policy table and looked up by name at call sites.
//!
//! `check_and_increment` never fails; looking up an unregistered limiter
//! name is the only error in this crate and signals an integration bug.

pub mod error;
pub mod limiter;
pub mod registry;
pub mod window;

pub use error::{RateLimitError, Result};
pub use limiter::{Decision, LimitPolicy, RateLimiter};
pub use registry::{LimiterRegistry, LIMITER_API, LIMITER_DELIVERY, LIMITER_SCHEDULE};
