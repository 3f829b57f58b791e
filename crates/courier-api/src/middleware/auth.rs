//! Bearer token authentication.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use courier_security_core::{Claims, Role, TokenService};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Verified caller identity, inserted into request extensions alongside the
/// token [`Claims`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: String,
    pub role: Role,
}

impl From<&Claims> for AuthenticatedUser {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub.clone(),
            username: claims.username.clone(),
            role: claims.role,
        }
    }
}

/// Validates `Authorization: Bearer <token>`.
///
/// Every failure yields the same 401; the reason only reaches the logs.
pub async fn authenticate(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").map(str::trim));

    let token = match token {
        Some(Some(token)) if !token.is_empty() => token.to_string(),
        Some(_) => return reject(request.uri().path(), "invalid_format"),
        None => return reject(request.uri().path(), "missing_token"),
    };

    match tokens.validate(&token) {
        Ok(claims) => {
            let user = AuthenticatedUser::from(&claims);
            debug!(user_id = %user.id, role = %user.role, "request authenticated");
            request.extensions_mut().insert(user);
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            warn!(path = %request.uri().path(), error = %e, "token rejected");
            metrics::counter!("courier_auth_failures_total", "reason" => "invalid_token")
                .increment(1);
            ApiError::from(e).into_response()
        }
    }
}

fn reject(path: &str, reason: &'static str) -> Response {
    warn!(path = %path, reason, "authentication failed");
    metrics::counter!("courier_auth_failures_total", "reason" => reason).increment(1);
    ApiError::Authentication.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use courier_security_core::TokenConfig;
    use tower::ServiceExt;

    fn app(tokens: Arc<TokenService>) -> Router {
        Router::new()
            .route(
                "/",
                get(|Extension(user): Extension<AuthenticatedUser>| async move { user.username }),
            )
            .route_layer(middleware::from_fn_with_state(tokens, authenticate))
    }

    fn request(authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let tokens = Arc::new(TokenService::new("secret", TokenConfig::default()));
        let pair = tokens.issue("alice").unwrap();

        let response = app(tokens)
            .oneshot(request(Some(&format!("Bearer {}", pair.access_token))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"alice");
    }

    #[tokio::test]
    async fn test_missing_malformed_and_foreign_tokens_rejected() {
        let tokens = Arc::new(TokenService::new("secret", TokenConfig::default()));
        let foreign = TokenService::new("other", TokenConfig::default())
            .issue("alice")
            .unwrap()
            .access_token;
        let foreign = format!("Bearer {foreign}");

        for authorization in [
            None,
            Some("Basic YWRtaW46cHc="),
            Some("Bearer "),
            Some("Bearer not-a-jwt"),
            Some(foreign.as_str()),
        ] {
            let response = app(tokens.clone()).oneshot(request(authorization)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{authorization:?}");
        }
    }
}
