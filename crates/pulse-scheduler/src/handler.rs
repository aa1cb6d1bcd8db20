//! Handler contract and the name → handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::types::JobRecord;

/// What a handler invocation reported. Handlers never return `Err`; every
/// failure mode is an explicit outcome so the runner's retry policy does not
/// depend on error propagation through task boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Payload fetched and delivered.
    Delivered,
    /// Transient failure (upstream unavailable, delivery rejected, timeout).
    /// The job stays active and is retried on its next slot.
    Failed(String),
    /// The subscriber no longer exists or is disabled. The runner cancels
    /// the job — this is how disabled subscribers stop receiving deliveries.
    SubscriberGone,
}

/// A delivery callback invoked when a job is due.
///
/// Implementations must be `Send + Sync`: the runner stores them in a shared
/// registry and drives them from concurrently spawned tasks.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, record: &JobRecord) -> HandlerOutcome;
}

/// Named handler table, built at startup before the runner starts.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}
