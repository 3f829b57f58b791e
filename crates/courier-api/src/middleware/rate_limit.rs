//! Per-client-IP admission against a sliding-window limiter.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use courier_security_core::{Admission, SlidingWindowLimiter};
use tracing::warn;

use crate::error::ApiError;

/// Rejects the request with 429 once the caller's quota is spent.
pub async fn rate_limit(
    State(limiter): State<Arc<SlidingWindowLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = client_ip(request.headers(), peer);

    match limiter.check(&client_ip) {
        Admission::Admitted => next.run(request).await,
        Admission::Rejected { retry_after } => {
            warn!(
                client_ip = %client_ip,
                path = %request.uri().path(),
                limit = limiter.config().limit,
                retry_after,
                "rate limit exceeded"
            );
            metrics::counter!("courier_rate_limit_rejections_total").increment(1);
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}

/// Caller identifier: first `X-Forwarded-For` entry, then `X-Real-IP`,
/// then the socket peer, else `unknown`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
