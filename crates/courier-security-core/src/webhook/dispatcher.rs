//! Signed, best-effort webhook delivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::DispatchError;
use crate::webhook::event::{DeliveryResult, WebhookEvent};
use crate::webhook::registry::DestinationRegistry;
use crate::webhook::signer::{WebhookSigner, SIGNATURE_HEADER};

/// HTTP settings for outbound deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: "Courier-Webhook/1.0".to_string(),
        }
    }
}

/// Delivers events to every registered destination.
///
/// Each destination is attempted exactly once and independently: a slow or
/// failing endpoint only affects its own [`DeliveryResult`].
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    signer: Arc<WebhookSigner>,
    destinations: DestinationRegistry,
}

impl WebhookDispatcher {
    /// # Errors
    ///
    /// Returns `DispatchError::Client` if the HTTP client cannot be built.
    pub fn new(
        config: &DispatcherConfig,
        signer: Arc<WebhookSigner>,
        destinations: DestinationRegistry,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DispatchError::Client(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            signer,
            destinations,
        })
    }

    pub fn destinations(&self) -> &DestinationRegistry {
        &self.destinations
    }

    /// Serializes, signs and posts `event` to all destinations.
    ///
    /// # Errors
    ///
    /// `NoDestinationsConfigured` when the registry is empty, or
    /// `Serialization` if the event cannot be encoded. Delivery failures are
    /// reported per destination, never as an error.
    pub async fn dispatch(
        &self,
        event: &WebhookEvent,
    ) -> Result<Vec<DeliveryResult>, DispatchError> {
        let urls = self.destinations.list().await;
        if urls.is_empty() {
            return Err(DispatchError::NoDestinationsConfigured);
        }

        // Serialized once; the signature covers exactly the bytes sent.
        let body = serde_json::to_vec(event)?;
        let signature = self.signer.signature_header(&body);

        let span = info_span!(
            "webhook_dispatch",
            event_type = %event.event_type,
            message_id = %event.message_id,
            destinations = urls.len()
        );

        async move {
            let deliveries = urls
                .into_iter()
                .map(|url| self.deliver(url, body.clone(), &signature));
            let results = join_all(deliveries).await;

            let failed = results.iter().filter(|r| !r.success).count();
            info!(delivered = results.len() - failed, failed, "webhook dispatch finished");

            Ok(results)
        }
        .instrument(span)
        .await
    }

    async fn deliver(&self, url: String, body: Vec<u8>, signature: &str) -> DeliveryResult {
        let started_at = chrono::Utc::now().timestamp();
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await;

        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                let success = response.status().is_success();
                if success {
                    debug!(%url, status, latency_ms, "webhook delivered");
                } else {
                    warn!(%url, status, latency_ms, "webhook rejected by destination");
                }
                DeliveryResult {
                    url,
                    success,
                    status_code: Some(status),
                    latency_ms,
                    error: (!success).then(|| format!("HTTP {status}")),
                    timestamp: started_at,
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request failed: {e}")
                };
                warn!(%url, latency_ms, %error, "webhook delivery failed");
                DeliveryResult {
                    url,
                    success: false,
                    status_code: None,
                    latency_ms,
                    error: Some(error),
                    timestamp: started_at,
                }
            }
        }
    }
}
