//! The digest job handler: directory check, fetch, deliver.

use std::sync::Arc;

use async_trait::async_trait;
use pulse_ratelimit::RateLimiter;
use pulse_scheduler::{HandlerOutcome, JobHandler, JobRecord};
use tracing::debug;

use crate::channel::DeliveryChannel;
use crate::directory::SubscriberDirectory;
use crate::source::PayloadSource;

/// Handler name stored in job records. Route code and runner wiring both
/// reference this constant so they cannot drift apart.
pub const DIGEST_HANDLER: &str = "digest";

/// Composes the three collaborators into the handler the runner invokes.
///
/// Every failure mode maps to an explicit [`HandlerOutcome`]; nothing here
/// can take the poll loop down.
pub struct DigestHandler {
    directory: Arc<dyn SubscriberDirectory>,
    source: Arc<dyn PayloadSource>,
    channel: Arc<dyn DeliveryChannel>,
    /// Outbound quota per subscriber key. A denied check defers the delivery
    /// to the next slot instead of sending.
    limiter: Arc<RateLimiter>,
}

impl DigestHandler {
    pub fn new(
        directory: Arc<dyn SubscriberDirectory>,
        source: Arc<dyn PayloadSource>,
        channel: Arc<dyn DeliveryChannel>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            directory,
            source,
            channel,
            limiter,
        }
    }
}

#[async_trait]
impl JobHandler for DigestHandler {
    async fn run(&self, record: &JobRecord) -> HandlerOutcome {
        // Directory first: a missing or disabled subscriber self-cancels the
        // job, which is how disabled subscribers stop receiving deliveries.
        let subscriber = match self.directory.get(&record.key) {
            Ok(Some(sub)) if sub.active => sub,
            Ok(_) => {
                debug!(key = %record.key, "subscriber missing or disabled");
                return HandlerOutcome::SubscriberGone;
            }
            Err(e) => return HandlerOutcome::Failed(format!("directory lookup failed: {e}")),
        };

        let decision = self.limiter.check_and_increment(&record.key);
        if !decision.allowed {
            let wait = decision.retry_after_secs.unwrap_or(1);
            debug!(key = %record.key, wait, "delivery quota exhausted; deferring");
            return HandlerOutcome::Failed(format!(
                "delivery rate limit exceeded; retry in {wait}s"
            ));
        }

        let payload = match self.source.fetch().await {
            Ok(payload) => payload,
            Err(e) => return HandlerOutcome::Failed(e.to_string()),
        };

        match self.channel.deliver(&subscriber, &payload).await {
            Ok(()) => HandlerOutcome::Delivered,
            Err(e) => HandlerOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeliveryError, Result};
    use chrono::Utc;
    use pulse_core::types::{Payload, Subscriber};
    use pulse_ratelimit::LimitPolicy;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeDirectory {
        subscriber: Option<Subscriber>,
    }

    impl SubscriberDirectory for FakeDirectory {
        fn get(&self, _key: &str) -> Result<Option<Subscriber>> {
            Ok(self.subscriber.clone())
        }
    }

    struct FakeSource {
        fail: bool,
    }

    #[async_trait]
    impl PayloadSource for FakeSource {
        async fn fetch(&self) -> Result<Payload> {
            if self.fail {
                Err(DeliveryError::UpstreamUnavailable("feed down".into()))
            } else {
                Ok(Payload::new(serde_json::json!({"digest": "ok"})))
            }
        }
    }

    struct FakeChannel {
        deliveries: AtomicU32,
        reject_with: Option<u16>,
    }

    #[async_trait]
    impl DeliveryChannel for FakeChannel {
        async fn deliver(&self, _sub: &Subscriber, _payload: &Payload) -> Result<()> {
            match self.reject_with {
                Some(status) => Err(DeliveryError::Rejected { status }),
                None => {
                    self.deliveries.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        }
    }

    fn active_subscriber() -> Subscriber {
        let now = Utc::now();
        Subscriber {
            key: "u1".into(),
            webhook_url: "https://example.test/hook".into(),
            secret: None,
            interval_minutes: 5,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn record() -> JobRecord {
        JobRecord::new("u1", DIGEST_HANDLER, 5, Utc::now()).unwrap()
    }

    fn permissive_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new("delivery", LimitPolicy::new(1000, 60_000)))
    }

    fn handler(
        subscriber: Option<Subscriber>,
        source_fails: bool,
        reject_with: Option<u16>,
    ) -> (DigestHandler, Arc<FakeChannel>) {
        handler_with_limiter(subscriber, source_fails, reject_with, permissive_limiter())
    }

    fn handler_with_limiter(
        subscriber: Option<Subscriber>,
        source_fails: bool,
        reject_with: Option<u16>,
        limiter: Arc<RateLimiter>,
    ) -> (DigestHandler, Arc<FakeChannel>) {
        let channel = Arc::new(FakeChannel {
            deliveries: AtomicU32::new(0),
            reject_with,
        });
        let handler = DigestHandler::new(
            Arc::new(FakeDirectory { subscriber }),
            Arc::new(FakeSource { fail: source_fails }),
            channel.clone(),
            limiter,
        );
        (handler, channel)
    }

    #[tokio::test]
    async fn active_subscriber_gets_a_delivery() {
        let (handler, channel) = handler(Some(active_subscriber()), false, None);
        let outcome = handler.run(&record()).await;
        assert_eq!(outcome, HandlerOutcome::Delivered);
        assert_eq!(channel.deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_subscriber_reports_gone() {
        let (handler, channel) = handler(None, false, None);
        assert_eq!(handler.run(&record()).await, HandlerOutcome::SubscriberGone);
        assert_eq!(channel.deliveries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_subscriber_reports_gone() {
        let mut sub = active_subscriber();
        sub.active = false;
        let (handler, channel) = handler(Some(sub), false, None);
        assert_eq!(handler.run(&record()).await, HandlerOutcome::SubscriberGone);
        assert_eq!(channel.deliveries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn feed_failure_is_a_transient_failure() {
        let (handler, channel) = handler(Some(active_subscriber()), true, None);
        assert!(matches!(
            handler.run(&record()).await,
            HandlerOutcome::Failed(_)
        ));
        assert_eq!(channel.deliveries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_delivery_is_a_transient_failure() {
        let (handler, _) = handler(Some(active_subscriber()), false, Some(503));
        let outcome = handler.run(&record()).await;
        match outcome {
            HandlerOutcome::Failed(reason) => assert!(reason.contains("503")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_delivery_quota_defers_without_sending() {
        let limiter = Arc::new(RateLimiter::new("delivery", LimitPolicy::new(1, 60_000)));
        let (handler, channel) =
            handler_with_limiter(Some(active_subscriber()), false, None, limiter);

        assert_eq!(handler.run(&record()).await, HandlerOutcome::Delivered);
        assert_eq!(channel.deliveries.load(Ordering::SeqCst), 1);

        // Second run in the same window: deferred, nothing sent.
        match handler.run(&record()).await {
            HandlerOutcome::Failed(reason) => assert!(reason.contains("rate limit")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(channel.deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delivery_quota_is_per_subscriber() {
        let limiter = Arc::new(RateLimiter::new("delivery", LimitPolicy::new(1, 60_000)));
        let (handler, channel) =
            handler_with_limiter(Some(active_subscriber()), false, None, limiter);

        assert_eq!(handler.run(&record()).await, HandlerOutcome::Delivered);

        // A different key has its own window.
        let other = JobRecord::new("u2", DIGEST_HANDLER, 5, Utc::now()).unwrap();
        assert_eq!(handler.run(&other).await, HandlerOutcome::Delivered);
        assert_eq!(channel.deliveries.load(Ordering::SeqCst), 2);
    }
}
