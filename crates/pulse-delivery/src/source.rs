//! Payload source: where the digest body comes from.

use async_trait::async_trait;
use pulse_core::types::Payload;
use tracing::debug;

use crate::error::{DeliveryError, Result};

/// Fetches the payload to deliver. One fetch per handler invocation; the
/// runner's retry policy owns what happens on failure.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn fetch(&self) -> Result<Payload>;
}

/// Production source: GET a configured feed URL and pass the JSON body
/// through verbatim. A non-JSON body is wrapped as a JSON string rather
/// than rejected — the feed's format is the operator's business.
pub struct FeedSource {
    client: reqwest::Client,
    url: String,
}

impl FeedSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PayloadSource for FeedSource {
    async fn fetch(&self) -> Result<Payload> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DeliveryError::UpstreamUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| DeliveryError::UpstreamUnavailable(e.to_string()))?;

        let text = response
            .text()
            .await
            .map_err(|e| DeliveryError::UpstreamUnavailable(e.to_string()))?;

        let body = serde_json::from_str(&text)
            .unwrap_or_else(|_| serde_json::Value::String(text));

        debug!(url = %self.url, "feed payload fetched");
        Ok(Payload::new(body))
    }
}
