//! HTTP error type shared by guards and handlers.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use courier_security_core::{DispatchError, TokenError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or invalid request input.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credentials. The response never says which.
    #[error("authentication required")]
    Authentication,

    /// Authenticated but not allowed.
    #[error("{0}")]
    Authorization(String),

    #[error("rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    /// Inbound webhook signature did not verify.
    #[error("invalid webhook signature")]
    SignatureMismatch,

    /// A collaborator failed; the detail is logged, not returned.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication | ApiError::SignatureMismatch => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, code, message, retry_after) = match &self {
            ApiError::Validation(msg) => ("Bad Request", "VALIDATION_ERROR", msg.clone(), None),
            ApiError::Authentication => (
                "Unauthorized",
                "AUTHENTICATION_REQUIRED",
                "Valid credentials are required".to_string(),
                None,
            ),
            ApiError::Authorization(msg) => {
                ("Forbidden", "INSUFFICIENT_PERMISSIONS", msg.clone(), None)
            }
            ApiError::RateLimited { retry_after } => (
                "Too Many Requests",
                "RATE_LIMITED",
                format!("Rate limit exceeded, retry after {retry_after} seconds"),
                Some(*retry_after),
            ),
            ApiError::SignatureMismatch => (
                "Unauthorized",
                "INVALID_SIGNATURE",
                "Invalid webhook signature".to_string(),
                None,
            ),
            ApiError::UpstreamUnavailable(detail) => {
                warn!(detail = %detail, "upstream unavailable");
                (
                    "Service Unavailable",
                    "UPSTREAM_UNAVAILABLE",
                    "A required service is unavailable".to_string(),
                    None,
                )
            }
            ApiError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                (
                    "Internal Server Error",
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            error,
            message,
            code,
            retry_after,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(detail) => ApiError::Internal(detail),
            _ => ApiError::Authentication,
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NoDestinationsConfigured => {
                ApiError::UpstreamUnavailable(err.to_string())
            }
            DispatchError::Serialization(_) | DispatchError::Client(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::UpstreamUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limited_sets_header_and_field() {
        let response = ApiError::RateLimited { retry_after: 42 }.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
        let body = body_json(response).await;
        assert_eq!(body["retry_after"], 42);
        assert_eq!(body["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_token_errors_are_uniform() {
        let expired = body_json(ApiError::from(TokenError::Expired).into_response()).await;
        let tampered =
            body_json(ApiError::from(TokenError::InvalidSignature).into_response()).await;

        assert_eq!(expired, tampered);
        assert_eq!(expired["code"], "AUTHENTICATION_REQUIRED");
    }

    #[tokio::test]
    async fn test_upstream_detail_not_leaked() {
        let response =
            ApiError::UpstreamUnavailable("db at 10.0.0.5 refused".into()).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert!(!body["message"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::SignatureMismatch.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(DispatchError::NoDestinationsConfigured).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
