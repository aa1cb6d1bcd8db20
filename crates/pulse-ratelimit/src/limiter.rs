//! One named limiter: a policy plus its window store.

use chrono::{DateTime, Duration, Utc};
use pulse_core::config::LimitPolicyConfig;

use crate::window::FixedWindowStore;

/// Immutable limiter policy: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy)]
pub struct LimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl LimitPolicy {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window: Duration::milliseconds(window_ms as i64),
        }
    }
}

impl From<LimitPolicyConfig> for LimitPolicy {
    fn from(cfg: LimitPolicyConfig) -> Self {
        Self::new(cfg.max_requests, cfg.window_ms)
    }
}

/// Outcome of one check-and-increment call.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// When the window rolls over.
    pub reset_at: DateTime<Utc>,
    /// Seconds the caller should wait; set only when denied, always >= 1.
    pub retry_after_secs: Option<u64>,
}

/// Fixed-window rate limiter for one policy.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    policy: LimitPolicy,
    store: FixedWindowStore,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, policy: LimitPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            store: FixedWindowStore::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> LimitPolicy {
        self.policy
    }

    /// Check-and-increment for `key`. Infallible: the counter is always
    /// advanced, and the decision reflects the post-increment count.
    pub fn check_and_increment(&self, key: &str) -> Decision {
        self.check_at(key, Utc::now())
    }

    /// Same as [`check_and_increment`](Self::check_and_increment) with an
    /// explicit clock, so window arithmetic is testable without sleeping.
    pub fn check_at(&self, key: &str, now: DateTime<Utc>) -> Decision {
        let entry = self.store.increment(key, self.policy.window, now);

        let allowed = entry.count <= self.policy.max_requests;
        let remaining = self.policy.max_requests.saturating_sub(entry.count);
        let retry_after_secs = if allowed {
            None
        } else {
            // Ceiling in seconds, clamped to at least 1 so Retry-After is
            // never zero while the window is still open.
            let wait_ms = (entry.reset_at - now).num_milliseconds().max(0);
            Some((wait_ms as u64).div_ceil(1000).max(1))
        };

        Decision {
            allowed,
            remaining,
            reset_at: entry.reset_at,
            retry_after_secs,
        }
    }

    /// Drop stale window entries. Called by the registry's sweep task.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.store.sweep(self.policy.window, now)
    }

    /// Forget all windows for this limiter.
    pub fn reset(&self) {
        self.store.clear();
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_n_allowed_then_rejected_with_wait() {
        // maxRequests=5, windowMs=5000: six calls inside one second.
        let limiter = RateLimiter::new("test", LimitPolicy::new(5, 5000));
        let t0 = Utc::now();

        let mut decisions = Vec::new();
        for i in 0..6u32 {
            let at = t0 + Duration::milliseconds(i as i64 * 150);
            decisions.push(limiter.check_at("u1", at));
        }

        assert!(decisions[..5].iter().all(|d| d.allowed));
        let sixth = &decisions[5];
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        let wait = sixth.retry_after_secs.unwrap();
        assert!((4..=5).contains(&wait), "retry_after was {wait}");
    }

    #[test]
    fn remaining_counts_down() {
        let limiter = RateLimiter::new("test", LimitPolicy::new(3, 1000));
        let t0 = Utc::now();
        assert_eq!(limiter.check_at("k", t0).remaining, 2);
        assert_eq!(limiter.check_at("k", t0).remaining, 1);
        assert_eq!(limiter.check_at("k", t0).remaining, 0);
    }

    #[test]
    fn window_rollover_allows_again() {
        let limiter = RateLimiter::new("test", LimitPolicy::new(1, 1000));
        let t0 = Utc::now();

        assert!(limiter.check_at("k", t0).allowed);
        assert!(!limiter.check_at("k", t0 + Duration::milliseconds(500)).allowed);

        // Past reset_at the counter starts over at 1.
        let after = limiter.check_at("k", t0 + Duration::milliseconds(1001));
        assert!(after.allowed);
        assert_eq!(after.remaining, 0);
    }

    #[test]
    fn distinct_keys_do_not_share_quota() {
        let limiter = RateLimiter::new("test", LimitPolicy::new(2, 5000));
        let t0 = Utc::now();

        assert!(limiter.check_at("a", t0).allowed);
        assert!(limiter.check_at("a", t0).allowed);
        assert!(!limiter.check_at("a", t0).allowed);

        // "b" is untouched by "a"'s exhaustion.
        assert!(limiter.check_at("b", t0).allowed);
    }

    #[test]
    fn reset_forgets_all_windows() {
        let limiter = RateLimiter::new("test", LimitPolicy::new(1, 60_000));
        let t0 = Utc::now();
        assert!(limiter.check_at("k", t0).allowed);
        assert!(!limiter.check_at("k", t0).allowed);

        limiter.reset();
        assert!(limiter.check_at("k", t0).allowed);
    }

    #[test]
    fn concurrent_increments_lose_no_updates() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new("test", LimitPolicy::new(1000, 60_000)));
        let t0 = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        limiter.check_at("shared", t0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // 400 increments total: the 401st check sees remaining = 1000 - 401.
        let d = limiter.check_at("shared", t0);
        assert_eq!(d.remaining, 1000 - 401);
    }
}
