//! Endpoints that only need a verified identity (plus the admin dashboard).

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use courier_security_core::{Claims, RateLimitConfig};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::extract::ValidatedJson;
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;
use crate::store::{Direction, StoredMessage};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Serialize)]
pub struct TokenInfo {
    pub issued_at: i64,
    pub expires: i64,
    pub issuer: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: AuthenticatedUser,
    pub token_info: TokenInfo,
    pub permissions: &'static [&'static str],
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct TierSummary {
    pub limit: usize,
    pub window_secs: u64,
    pub tracked_clients: usize,
}

impl TierSummary {
    fn new(config: &RateLimitConfig, tracked_clients: usize) -> Self {
        Self {
            limit: config.limit,
            window_secs: config.window_secs,
            tracked_clients,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RateLimitSummary {
    pub global: TierSummary,
    pub auth: TierSummary,
}

#[derive(Debug, Serialize)]
pub struct WebhookSummary {
    pub destinations: usize,
    pub secret_configured: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub admin: String,
    pub version: &'static str,
    pub production: bool,
    pub uptime_secs: i64,
    pub rate_limits: RateLimitSummary,
    pub webhooks: WebhookSummary,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, message = "phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "message is required"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message_id: String,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub phone: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub messages: Vec<StoredMessage>,
    pub count: usize,
    pub requested_by: String,
    pub timestamp: i64,
}

/// GET /api/protected/profile
pub async fn profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Extension(claims): Extension<Claims>,
) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        permissions: user.role.permissions(),
        user,
        token_info: TokenInfo {
            issued_at: claims.iat,
            expires: claims.exp,
            issuer: claims.iss,
        },
        timestamp: state.clock.now().timestamp(),
    })
}

/// GET /api/protected/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        admin: user.username,
        version: env!("CARGO_PKG_VERSION"),
        production: state.config.production,
        uptime_secs: state.uptime_secs(),
        rate_limits: RateLimitSummary {
            global: TierSummary::new(state.global_limiter.config(), state.global_limiter.tracked()),
            auth: TierSummary::new(state.auth_limiter.config(), state.auth_limiter.tracked()),
        },
        webhooks: WebhookSummary {
            destinations: state.dispatcher.destinations().len().await,
            secret_configured: state.webhook_secret_configured,
            timeout_secs: state.config.webhook_timeout_secs,
        },
        timestamp: state.clock.now().timestamp(),
    })
}

/// POST /api/protected/send
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ValidatedJson(req): ValidatedJson<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let message_id = format!("msg_{}", Uuid::new_v4().simple());

    let stored = StoredMessage::new(&req.phone, &message_id, Direction::Outbound)
        .with_field("type", "text")
        .with_field("content", req.message)
        .with_field("sent_by", user.username.clone())
        .with_field("user_id", user.id.clone());
    state.store.store_message(stored).await?;

    info!(message_id = %message_id, user_id = %user.id, "outbound message stored");

    Ok(Json(SendMessageResponse {
        success: true,
        message_id,
        message: format!("Text message sent successfully by {}", user.username),
        timestamp: state.clock.now().timestamp(),
    }))
}

/// GET /api/protected/history
pub async fn history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let phone = query.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());

    let messages = state.store.fetch_messages(phone, limit).await?;

    Ok(Json(HistoryResponse {
        success: true,
        count: messages.len(),
        messages,
        requested_by: user.username,
        timestamp: state.clock.now().timestamp(),
    }))
}
