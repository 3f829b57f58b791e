//! Request extractors.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use courier_security_core::SIGNATURE_HEADER;
use serde::de::DeserializeOwned;
use tracing::warn;
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;

/// JSON body that is deserialized and then validated.
///
/// Both failures become a 400 [`ApiError::Validation`].
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::validation(e.to_string()))?;
        Ok(Self(value))
    }
}

/// Raw request body whose `X-Hub-Signature-256` header verified against the
/// webhook secret.
#[derive(Debug, Clone)]
pub struct SignedPayload(pub Bytes);

#[async_trait]
impl FromRequest<AppState> for SignedPayload {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;

        if !state.signer.verify(signature.as_deref(), &body) {
            warn!(
                signature_present = signature.is_some(),
                body_len = body.len(),
                "webhook signature verification failed"
            );
            metrics::counter!("courier_signature_failures_total").increment(1);
            return Err(ApiError::SignatureMismatch);
        }

        Ok(Self(body))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(ApiError::Authentication)
    }
}
