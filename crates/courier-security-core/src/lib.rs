//! # Courier Security Core
//!
//! Transport-agnostic security primitives for the Courier messaging gateway.
//!
//! ## Overview
//!
//! - **Identity tokens**: HS256 access/refresh pairs with role claims and an
//!   optional revocation list ([`TokenService`])
//! - **Rate limiting**: per-identifier sliding windows ([`SlidingWindowLimiter`])
//! - **Signed webhooks**: HMAC-SHA256 verification of inbound payloads and
//!   signed, concurrent delivery of outbound events ([`webhook`])
//! - **Credentials**: static `username:password` list ([`CredentialStore`])
//!
//! Every time-dependent component takes a [`Clock`] so tests can control it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier_security_core::{TokenConfig, TokenService, SlidingWindowLimiter, RateLimitConfig};
//!
//! let tokens = TokenService::new("my-shared-secret", TokenConfig::default());
//! let pair = tokens.issue("alice")?;
//! let claims = tokens.validate(&pair.access_token)?;
//! assert_eq!(claims.username, "alice");
//!
//! let limiter = SlidingWindowLimiter::new(RateLimitConfig::auth());
//! assert!(limiter.admit("203.0.113.7"));
//! ```
//!
//! ## Signed Delivery
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use courier_security_core::webhook::*;
//!
//! let signer = Arc::new(WebhookSigner::new("webhook-secret"));
//! let registry = DestinationRegistry::from_csv("https://example.com/hook");
//! let dispatcher = WebhookDispatcher::new(&DispatcherConfig::default(), signer, registry)?;
//!
//! let event = WebhookEvent::new("message_sent", "628111", "msg_1");
//! for result in dispatcher.dispatch(&event).await? {
//!     println!("{} -> {}", result.url, result.success);
//! }
//! ```

pub mod clock;
pub mod credentials;
pub mod error;
pub mod rate_limit;
pub mod token;
pub mod webhook;

// Primary exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::CredentialStore;
pub use error::{CredentialError, DispatchError, FanoutError, TokenError};
pub use rate_limit::{Admission, RateLimitConfig, SlidingWindowLimiter};
pub use token::{
    Claims, InMemoryRevocationList, RevocationList, Role, TokenConfig, TokenPair, TokenService,
};
pub use webhook::{
    DeliveryResult, DestinationRegistry, DispatcherConfig, FanoutConfig, FanoutHandle,
    FanoutWorker, WebhookDispatcher, WebhookEvent, WebhookSigner, SIGNATURE_HEADER,
};
