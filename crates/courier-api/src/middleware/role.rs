//! Role-based authorization. Must run after authentication.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use courier_security_core::{Claims, Role};
use tracing::warn;

use crate::error::ApiError;

/// Admits only callers whose token carries `required`.
pub async fn require_role(State(required): State<Role>, request: Request, next: Next) -> Response {
    let Some(claims) = request.extensions().get::<Claims>() else {
        return ApiError::Authentication.into_response();
    };

    if claims.role != required {
        warn!(
            user_id = %claims.sub,
            role = %claims.role,
            required = %required,
            path = %request.uri().path(),
            "insufficient role"
        );
        metrics::counter!("courier_authorization_denials_total").increment(1);
        return ApiError::forbidden(format!("{required} role required")).into_response();
    }

    next.run(request).await
}
