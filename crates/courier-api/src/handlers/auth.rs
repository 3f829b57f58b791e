//! Login, refresh, validate and logout.

use axum::{extract::State, Extension, Json};
use courier_security_core::{Claims, Role, TokenPair};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::error::ApiError;
use crate::extract::ValidatedJson;
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "refresh_token is required"))]
    pub refresh_token: String,
}

/// Optional logout body; the refresh token of the same session is revoked
/// along with the presented access token.
#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub created: i64,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

impl AuthResponse {
    fn from_pair(pair: TokenPair, message: &'static str, with_user: bool) -> Self {
        let user = with_user.then(|| UserInfo {
            id: pair.claims.sub.clone(),
            username: pair.claims.username.clone(),
            role: pair.claims.role,
            created: pair.claims.iat,
        });
        Self {
            success: true,
            token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
            message,
            user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub expires: i64,
    pub issued_at: i64,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    /// `false` when the denylist is disabled and the token stays valid
    /// until it expires.
    pub revoked: bool,
    pub refresh_revoked: bool,
    pub message: &'static str,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if !state.credentials.verify(&req.username, &req.password) {
        warn!(username = %req.username, "login rejected");
        metrics::counter!("courier_auth_failures_total", "reason" => "invalid_credentials")
            .increment(1);
        return Err(ApiError::Authentication);
    }

    let pair = state.tokens.issue(&req.username)?;
    info!(user_id = %pair.claims.sub, username = %req.username, "login succeeded");

    Ok(Json(AuthResponse::from_pair(pair, "Authentication successful", true)))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let pair = state.tokens.refresh(&req.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        metrics::counter!("courier_auth_failures_total", "reason" => "invalid_refresh_token")
            .increment(1);
        ApiError::from(e)
    })?;

    Ok(Json(AuthResponse::from_pair(pair, "Token refreshed successfully", false)))
}

/// GET /api/auth/validate
pub async fn validate(
    user: AuthenticatedUser,
    Extension(claims): Extension<Claims>,
) -> Json<ValidateResponse> {
    Json(ValidateResponse {
        valid: true,
        user_id: user.id,
        username: user.username,
        role: user.role,
        expires: claims.exp,
        issued_at: claims.iat,
    })
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<LogoutRequest>>,
) -> Json<LogoutResponse> {
    let revoked = state.tokens.revoke(&claims);

    let req = body.map(|Json(req)| req).unwrap_or_default();
    let refresh_revoked = match req.refresh_token.as_deref() {
        Some(token) => match state.tokens.validate(token) {
            // Only the caller's own session.
            Ok(refresh) if refresh.sub == claims.sub => state.tokens.revoke(&refresh),
            Ok(_) => {
                warn!(user_id = %claims.sub, "logout refresh token belongs to another subject");
                false
            }
            Err(e) => {
                debug!(user_id = %claims.sub, error = %e, "logout refresh token already unusable");
                false
            }
        },
        None => false,
    };

    let message = if revoked {
        "Token revoked"
    } else {
        "Logged out; token remains valid until it expires"
    };

    Json(LogoutResponse {
        success: true,
        revoked,
        refresh_revoked,
        message,
    })
}
