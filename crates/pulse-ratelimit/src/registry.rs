//! Process-wide named collection of rate limiters.
//!
//! Built once at startup from the config policy table, then shared by
//! reference (the gateway holds it in `AppState`). Lookups are read-only
//! after construction, so steady-state access needs no locking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use pulse_core::config::LimitsConfig;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{RateLimitError, Result};
use crate::limiter::{LimitPolicy, RateLimiter};

/// Limiter names used by the gateway. Kept as constants so route code and
/// registry construction cannot drift apart.
pub const LIMITER_API: &str = "api";
pub const LIMITER_SCHEDULE: &str = "schedule";
pub const LIMITER_DELIVERY: &str = "delivery";

pub struct LimiterRegistry {
    limiters: HashMap<String, Arc<RateLimiter>>,
    /// Background sweep task, if one was spawned. Aborted by `destroy_all`.
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self {
            limiters: HashMap::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// Build the standard registry from the config policy table.
    pub fn from_config(cfg: &LimitsConfig) -> Self {
        let mut registry = Self::new();
        registry.register(LIMITER_API, cfg.api.into());
        registry.register(LIMITER_SCHEDULE, cfg.schedule.into());
        registry.register(LIMITER_DELIVERY, cfg.delivery.into());
        registry
    }

    /// Register a limiter under `name`. Construction-phase only; a repeated
    /// name replaces the earlier limiter.
    pub fn register(&mut self, name: &str, policy: LimitPolicy) {
        info!(
            limiter = name,
            max_requests = policy.max_requests,
            window_ms = policy.window.num_milliseconds(),
            "rate limiter registered"
        );
        self.limiters
            .insert(name.to_string(), Arc::new(RateLimiter::new(name, policy)));
    }

    /// Look up a limiter by name. An unknown name is a wiring bug in the
    /// caller, surfaced as [`RateLimitError::UnknownLimiter`].
    pub fn get(&self, name: &str) -> Result<Arc<RateLimiter>> {
        self.limiters
            .get(name)
            .cloned()
            .ok_or_else(|| RateLimitError::UnknownLimiter {
                name: name.to_string(),
            })
    }

    pub fn has(&self, name: &str) -> bool {
        self.limiters.contains_key(name)
    }

    /// Iterate (name, tracked key count) pairs — observability hook.
    pub fn snapshot(&self) -> Vec<(String, usize)> {
        self.limiters
            .iter()
            .map(|(name, l)| (name.clone(), l.tracked_keys()))
            .collect()
    }

    /// Clear every limiter's window state. Policies stay registered.
    pub fn reset_all(&self) {
        for limiter in self.limiters.values() {
            limiter.reset();
        }
    }

    /// Stop the sweep task and drop all window state — shutdown path.
    pub fn destroy_all(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
        self.reset_all();
    }

    /// Spawn the background sweep task: every `period`, stale window entries
    /// are removed from every limiter. Idempotent — a second call replaces
    /// (and aborts) the earlier task.
    pub fn spawn_sweeper(self: &Arc<Self>, period: std::time::Duration) {
        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick fires immediately; skip it so a fresh process
            // doesn't sweep an empty map.
            interval.tick().await;
            loop {
                interval.tick().await;
                let now = Utc::now();
                for limiter in registry.limiters.values() {
                    let removed = limiter.sweep(now);
                    if removed > 0 {
                        debug!(
                            limiter = limiter.name(),
                            removed, "swept stale rate windows"
                        );
                    }
                }
            }
        });

        if let Some(old) = self.sweeper.lock().unwrap().replace(handle) {
            old.abort();
        }
    }
}

impl Default for LimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_registers_standard_names() {
        let registry = LimiterRegistry::from_config(&LimitsConfig::default());
        assert!(registry.has(LIMITER_API));
        assert!(registry.has(LIMITER_SCHEDULE));
        assert!(registry.has(LIMITER_DELIVERY));
        assert!(!registry.has("nope"));
    }

    #[test]
    fn get_unknown_name_is_an_error() {
        let registry = LimiterRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(
            err,
            RateLimitError::UnknownLimiter { ref name } if name == "missing"
        ));
    }

    #[test]
    fn reset_all_clears_window_state() {
        let mut registry = LimiterRegistry::new();
        registry.register("t", LimitPolicy::new(1, 60_000));
        let limiter = registry.get("t").unwrap();

        assert!(limiter.check_and_increment("k").allowed);
        assert!(!limiter.check_and_increment("k").allowed);

        registry.reset_all();
        assert!(limiter.check_and_increment("k").allowed);
    }

    #[tokio::test]
    async fn destroy_all_stops_the_sweeper_and_drops_state() {
        let mut registry = LimiterRegistry::new();
        registry.register("t", LimitPolicy::new(5, 60_000));
        let registry = Arc::new(registry);
        registry.spawn_sweeper(std::time::Duration::from_secs(60));

        let limiter = registry.get("t").unwrap();
        limiter.check_and_increment("k");
        assert_eq!(limiter.tracked_keys(), 1);

        registry.destroy_all();
        assert_eq!(limiter.tracked_keys(), 0);
        assert!(registry.sweeper.lock().unwrap().is_none());
    }
}
