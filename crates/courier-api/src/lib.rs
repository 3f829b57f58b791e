//! # Courier API
//!
//! HTTP surface of the Courier messaging gateway: authentication, signed
//! webhooks and identity-scoped messaging endpoints behind an ordered guard
//! pipeline (security headers, rate limit, token, role).

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod router;
pub mod state;
pub mod store;

pub use config::AppConfig;
pub use error::ApiError;
pub use router::create_router;
pub use state::AppState;
