//! Inbound webhook receipt, signed outbound dispatch and destination
//! management.

use axum::{extract::State, Json};
use courier_security_core::{DeliveryResult, WebhookEvent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::extract::{SignedPayload, ValidatedJson};
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;
use crate::store::{Direction, StoredMessage};

/// Message pushed to us by the messaging provider.
#[derive(Debug, Deserialize, Validate)]
pub struct IncomingMessage {
    #[validate(length(min = 1, message = "from is required"))]
    pub from: String,
    #[validate(length(min = 1, message = "message_id is required"))]
    pub message_id: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    pub content: Option<String>,
    pub caption: Option<String>,
    pub media_url: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    pub group_name: Option<String>,
    pub sender_name: Option<String>,
}

fn default_message_type() -> String {
    "text".to_string()
}

#[derive(Debug, Serialize)]
pub struct ReceiveResponse {
    pub success: bool,
    pub message: &'static str,
    pub event_id: String,
    pub processed_at: i64,
}

/// Event submitted by an authenticated caller for outbound delivery.
#[derive(Debug, Deserialize, Validate)]
pub struct SendWebhookRequest {
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "type is required"))]
    pub event_type: String,
    #[serde(default)]
    pub from: String,
    pub to: Option<String>,
    pub message_id: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct SendWebhookResponse {
    pub success: bool,
    pub event_id: String,
    pub webhook_urls: usize,
    pub failed: usize,
    pub sent_at: i64,
    pub results: Vec<DeliveryResult>,
}

#[derive(Debug, Serialize)]
pub struct DestinationsResponse {
    pub webhooks: Vec<String>,
    pub count: usize,
    pub secret_configured: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddDestinationRequest {
    #[validate(url(message = "url must be a valid URL"))]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AddDestinationResponse {
    pub success: bool,
    pub added: bool,
    pub url: String,
    pub message: &'static str,
}

/// POST /api/webhook/receive
///
/// The body is only parsed after its signature verified.
pub async fn receive(
    State(state): State<AppState>,
    SignedPayload(body): SignedPayload,
) -> Result<Json<ReceiveResponse>, ApiError> {
    let message: IncomingMessage =
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::validation(format!("Invalid JSON payload: {e}"))
        })?;
    message
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let event_id = format!("evt_{}", Uuid::new_v4().simple());

    let stored = StoredMessage::new(&message.from, &message.message_id, Direction::Inbound)
        .with_field("type", message.message_type.clone())
        .with_field("content", message.content.clone())
        .with_field("caption", message.caption.clone())
        .with_field("media_url", message.media_url.clone())
        .with_field("is_group", message.is_group)
        .with_field("group_name", message.group_name.clone())
        .with_field("sender_name", message.sender_name.clone())
        .with_field("event_id", event_id.clone());
    state.store.store_message(stored).await?;

    let event = WebhookEvent::new("message_received", &message.from, &message.message_id)
        .with_field("message_type", message.message_type)
        .with_field("content", message.content)
        .with_field("is_group", message.is_group)
        .with_field("event_id", event_id.clone());
    let queued = state.fanout.submit(event);

    info!(
        event_id = %event_id,
        message_id = %message.message_id,
        queued,
        "inbound webhook processed"
    );

    Ok(Json(ReceiveResponse {
        success: true,
        message: "Message processed successfully",
        event_id,
        processed_at: state.clock.now().timestamp(),
    }))
}

/// POST /api/webhook/send
pub async fn send(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ValidatedJson(req): ValidatedJson<SendWebhookRequest>,
) -> Result<Json<SendWebhookResponse>, ApiError> {
    let event_id = format!("evt_{}", Uuid::new_v4().simple());
    let message_id = req.message_id.unwrap_or_else(|| event_id.clone());

    let mut event =
        WebhookEvent::new(req.event_type, req.from, message_id).with_actor(&user.username);
    event.timestamp = state.clock.now().timestamp();
    event.to = req.to;
    event.payload = req.data;

    let results = state.dispatcher.dispatch(&event).await?;
    let failed = results.iter().filter(|r| !r.success).count();
    let delivered = results.len() - failed;
    metrics::counter!("courier_webhook_deliveries_total", "outcome" => "success")
        .increment(delivered as u64);
    metrics::counter!("courier_webhook_deliveries_total", "outcome" => "failure")
        .increment(failed as u64);
    if failed > 0 {
        warn!(event_id = %event_id, failed, "some webhook deliveries failed");
    }

    Ok(Json(SendWebhookResponse {
        success: true,
        event_id,
        webhook_urls: results.len(),
        failed,
        sent_at: state.clock.now().timestamp(),
        results,
    }))
}

/// GET /api/webhook/manage
pub async fn list_destinations(State(state): State<AppState>) -> Json<DestinationsResponse> {
    let webhooks = state.dispatcher.destinations().list().await;
    Json(DestinationsResponse {
        count: webhooks.len(),
        webhooks,
        secret_configured: state.webhook_secret_configured,
    })
}

/// POST /api/webhook/manage
pub async fn add_destination(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ValidatedJson(req): ValidatedJson<AddDestinationRequest>,
) -> Json<AddDestinationResponse> {
    let added = state.dispatcher.destinations().add(&req.url).await;
    if added {
        info!(url = %req.url, by = %user.username, "webhook destination added");
    }

    Json(AddDestinationResponse {
        success: true,
        added,
        message: if added {
            "Webhook URL added successfully"
        } else {
            "Webhook URL already registered"
        },
        url: req.url,
    })
}
