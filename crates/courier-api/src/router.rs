//! Route configuration

use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use courier_security_core::Role;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::handlers::{self, auth, protected, webhook};
use crate::middleware::security_headers;
use crate::pipeline::Pipeline;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the application router
///
/// ## Routes
/// - GET /health - liveness (headers only)
/// - POST /api/auth/login, /api/auth/refresh - auth-tier rate limit
/// - POST /api/webhook/receive - global rate limit + HMAC signature
/// - GET /api/auth/validate, POST /api/auth/logout, POST /api/webhook/send,
///   GET /api/protected/{profile,history}, POST /api/protected/send -
///   global rate limit + bearer token
/// - GET/POST /api/webhook/manage, GET /api/protected/dashboard -
///   global rate limit + bearer token + admin role
///
/// Security headers wrap everything, including guard rejections.
pub fn create_router(state: AppState) -> Router {
    let login_routes = Pipeline::new(&state)
        .rate_limit(state.auth_limiter.clone())
        .wrap(
            Router::new()
                .route("/api/auth/login", post(auth::login))
                .route("/api/auth/refresh", post(auth::refresh)),
        );

    let inbound_routes = Pipeline::new(&state)
        .rate_limit(state.global_limiter.clone())
        .wrap(Router::new().route("/api/webhook/receive", post(webhook::receive)));

    let user_routes = Pipeline::new(&state)
        .rate_limit(state.global_limiter.clone())
        .authenticate()
        .wrap(
            Router::new()
                .route("/api/auth/validate", get(auth::validate))
                .route("/api/auth/logout", post(auth::logout))
                .route("/api/webhook/send", post(webhook::send))
                .route("/api/protected/profile", get(protected::profile))
                .route("/api/protected/send", post(protected::send_message))
                .route("/api/protected/history", get(protected::history)),
        );

    let admin_routes = Pipeline::new(&state)
        .rate_limit(state.global_limiter.clone())
        .authenticate()
        .require_role(Role::Admin)
        .wrap(
            Router::new()
                .route(
                    "/api/webhook/manage",
                    get(webhook::list_destinations).post(webhook::add_destination),
                )
                .route("/api/protected/dashboard", get(protected::dashboard)),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .merge(login_routes)
        .merge(inbound_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
