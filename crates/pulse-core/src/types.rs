//! Subscriber and payload types — shared between the delivery pipeline,
//! the scheduler handler, and the gateway's admin routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One registered webhook subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    /// Stable opaque identifier — primary key, also the job-store key.
    pub key: String,
    /// Where digests are POSTed.
    pub webhook_url: String,
    /// When set, outbound deliveries carry an HMAC-SHA256 signature over the
    /// request body in `X-Pulse-Signature`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Delivery cadence, 1–1440 minutes.
    pub interval_minutes: u32,
    /// Disabled subscribers keep their row but receive nothing.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fetched digest payload, ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    /// Upstream feed body, passed through verbatim.
    pub body: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

impl Payload {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            fetched_at: Utc::now(),
        }
    }
}
