//! `pulse-scheduler` — per-subscriber recurring jobs with SQLite persistence.
//!
//! # Overview
//!
//! Job records live in a SQLite `jobs` table keyed by subscriber, so
//! schedules survive process restarts. The [`runner::JobRunner`] polls the
//! store on a fixed period and dispatches due jobs to registered
//! [`handler::JobHandler`]s under a global concurrency ceiling; the
//! [`facade::Scheduler`] is the mutation API (schedule / cancel / run-now).
//!
//! # Guarantees
//!
//! | Concern            | Behaviour                                            |
//! |--------------------|------------------------------------------------------|
//! | Per-key uniqueness | at most one active job per subscriber key            |
//! | Restart            | jobs due while the process was down run on first poll |
//! | Cadence            | next run anchors to the scheduled time, never "now"  |
//! | Failure            | fail_count increments, cadence continues, loop lives |
//! | Duplicate dispatch | per-key in-flight guard across poll cycles           |

pub mod db;
pub mod error;
pub mod facade;
pub mod handler;
pub mod runner;
pub mod store;
pub mod types;

pub use error::{Result, SchedulerError};
pub use facade::Scheduler;
pub use handler::{HandlerOutcome, HandlerRegistry, JobHandler};
pub use runner::{JobRunner, RunnerOptions};
pub use store::{JobStore, MemoryJobStore, SqliteJobStore};
pub use types::{JobRecord, MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};
