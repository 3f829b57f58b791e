//! Ordered composition of request guards.
//!
//! ```rust,ignore
//! let admin = Pipeline::new(&state)
//!     .rate_limit(state.global_limiter.clone())
//!     .authenticate()
//!     .require_role(Role::Admin)
//!     .wrap(admin_routes);
//! ```
//!
//! The stage type parameter makes invalid orders unrepresentable:
//! `require_role` only exists after `authenticate`, and `rate_limit` only
//! before it.

use std::marker::PhantomData;
use std::sync::Arc;

use axum::{middleware, Router};
use courier_security_core::{Role, SlidingWindowLimiter, TokenService};

use crate::middleware::{authenticate, rate_limit, require_role};
use crate::state::AppState;

/// No identity established yet.
#[derive(Debug)]
pub struct Anonymous;

/// Token validated; claims are in the request extensions.
#[derive(Debug)]
pub struct Authenticated;

#[derive(Debug, Clone)]
enum Guard {
    RateLimit(Arc<SlidingWindowLimiter>),
    Authenticate(Arc<TokenService>),
    RequireRole(Role),
}

/// Guard list in execution order.
#[derive(Debug)]
pub struct Pipeline<Stage> {
    tokens: Arc<TokenService>,
    guards: Vec<Guard>,
    _stage: PhantomData<Stage>,
}

impl Pipeline<Anonymous> {
    pub fn new(state: &AppState) -> Self {
        Self {
            tokens: state.tokens.clone(),
            guards: Vec::new(),
            _stage: PhantomData,
        }
    }

    /// Admits requests against `limiter`, keyed by client IP.
    pub fn rate_limit(mut self, limiter: Arc<SlidingWindowLimiter>) -> Self {
        self.guards.push(Guard::RateLimit(limiter));
        self
    }

    /// Requires a valid bearer token.
    pub fn authenticate(mut self) -> Pipeline<Authenticated> {
        self.guards.push(Guard::Authenticate(self.tokens.clone()));
        Pipeline {
            tokens: self.tokens,
            guards: self.guards,
            _stage: PhantomData,
        }
    }
}

impl Pipeline<Authenticated> {
    pub fn require_role(mut self, role: Role) -> Self {
        self.guards.push(Guard::RequireRole(role));
        self
    }
}

impl<Stage> Pipeline<Stage> {
    /// Applies the guards to every route of `router`.
    ///
    /// Guards run in the order they were added; a rejecting guard answers
    /// the request and later guards never run.
    pub fn wrap(self, router: Router<AppState>) -> Router<AppState> {
        // The last layer added runs first.
        self.guards
            .into_iter()
            .rev()
            .fold(router, |router, guard| match guard {
                Guard::RateLimit(limiter) => {
                    router.route_layer(middleware::from_fn_with_state(limiter, rate_limit))
                }
                Guard::Authenticate(tokens) => {
                    router.route_layer(middleware::from_fn_with_state(tokens, authenticate))
                }
                Guard::RequireRole(role) => {
                    router.route_layer(middleware::from_fn_with_state(role, require_role))
                }
            })
    }
}
