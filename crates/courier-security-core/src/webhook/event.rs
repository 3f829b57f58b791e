//! Webhook event and delivery result types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event emitted to webhook subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub message_id: String,
    #[serde(rename = "data", default)]
    pub payload: Map<String, Value>,
    /// Authenticated user who triggered the event, if any.
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl WebhookEvent {
    pub fn new(
        event_type: impl Into<String>,
        from: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().timestamp(),
            from: from.into(),
            to: None,
            message_id: message_id.into(),
            payload: Map::new(),
            actor: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Outcome of delivering one event to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub url: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix seconds at which the attempt started.
    pub timestamp: i64,
}
