//! Error types for Courier security core.

/// Reasons a token can be rejected or fail to be produced.
///
/// The HTTP layer collapses every rejection into the same 401 response; the
/// variant only reaches the logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The signature does not match the shared secret.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// `now >= exp`.
    #[error("token has expired")]
    Expired,

    /// `now < nbf`.
    #[error("token is not valid yet")]
    NotYetValid,

    /// The token cannot be decoded into the expected claim shape.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The token id is on the denylist.
    #[error("token has been revoked")]
    Revoked,

    /// The signing backend failed while issuing a token.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Errors raised by a webhook dispatch as a whole.
///
/// Per-destination failures are not errors: they are reported in the
/// returned delivery results.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The destination registry is empty.
    #[error("no webhook destinations configured")]
    NoDestinationsConfigured,

    /// The event could not be serialized.
    #[error("failed to serialize webhook event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP client could not be built.
    #[error("webhook client configuration error: {0}")]
    Client(String),
}

/// Errors raised while loading the credential list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// An entry is not of the form `username:password`.
    #[error("invalid credential entry at position {0}, expected username:password")]
    InvalidEntry(usize),

    /// No entries were supplied.
    #[error("credential list is empty")]
    Empty,
}

/// Errors raised while stopping the background fan-out worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FanoutError {
    /// Queued and in-flight dispatches did not finish in time.
    #[error("fan-out shutdown timed out after {timeout_secs}s")]
    ShutdownTimeout {
        /// Configured shutdown budget in seconds
        timeout_secs: u64,
    },

    /// The worker task panicked.
    #[error("fan-out worker panicked: {0}")]
    WorkerPanic(String),
}
