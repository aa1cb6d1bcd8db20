//! Delivery channel: how a payload reaches a subscriber.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use pulse_core::types::{Payload, Subscriber};
use sha2::Sha256;
use tracing::debug;

use crate::error::{DeliveryError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Delivers one payload to one subscriber.
///
/// `&self` so a single channel instance can serve concurrent deliveries
/// from the runner's spawned tasks.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn deliver(&self, subscriber: &Subscriber, payload: &Payload) -> Result<()>;
}

/// Production channel: POST the payload as JSON to the subscriber's webhook.
///
/// When the subscriber has a secret, the request carries
/// `X-Pulse-Signature: sha256=<hex>` — an HMAC-SHA256 over the exact body
/// bytes, so receivers can verify it GitHub-style.
pub struct WebhookChannel {
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    async fn deliver(&self, subscriber: &Subscriber, payload: &Payload) -> Result<()> {
        // Receipt ID for tracing; receivers can use it to deduplicate the
        // occasional at-least-once redelivery.
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::json!({
            "delivery_id": delivery_id,
            "subscriber": subscriber.key,
            "payload": payload.body,
            "fetched_at": payload.fetched_at.to_rfc3339(),
        })
        .to_string();

        let mut request = self
            .client
            .post(&subscriber.webhook_url)
            .header("content-type", "application/json")
            .header("x-pulse-delivery", &delivery_id);

        if let Some(ref secret) = subscriber.secret {
            request = request.header("x-pulse-signature", sign_body(secret, body.as_bytes()));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(key = %subscriber.key, %delivery_id, %status, "webhook delivered");
        Ok(())
    }
}

/// HMAC-SHA256 over `body`, formatted as `sha256=<hex>`.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    // new_from_slice only fails on an invalid key length; HMAC accepts any
    // length, so this cannot fail for string secrets.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_has_prefix_and_hex_digest() {
        let sig = sign_body("secret", b"{\"a\":1}");
        let hex_part = sig.strip_prefix("sha256=").unwrap();
        assert_eq!(hex_part.len(), 64);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_is_deterministic_and_key_sensitive() {
        let body = b"payload";
        assert_eq!(sign_body("k1", body), sign_body("k1", body));
        assert_ne!(sign_body("k1", body), sign_body("k2", body));
        assert_ne!(sign_body("k1", body), sign_body("k1", b"other"));
    }

    #[test]
    fn signature_matches_known_vector() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?".
        let sig = sign_body("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
