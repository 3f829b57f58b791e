//! Middleware layers
//!
//! ## Available Middleware
//!
//! - `security_headers`: fixed security/CORS headers, pre-flight short-circuit
//! - `rate_limit`: sliding-window admission keyed by client IP
//! - `auth`: bearer token validation, identity injection
//! - `role`: role check on injected claims
//!
//! Compose them through [`crate::pipeline::Pipeline`] rather than by hand.

pub mod auth;
pub mod rate_limit;
pub mod role;
pub mod security_headers;

// Re-exports
pub use auth::{authenticate, AuthenticatedUser};
pub use rate_limit::{client_ip, rate_limit};
pub use role::require_role;
pub use security_headers::security_headers;
