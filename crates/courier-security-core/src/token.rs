//! Identity token issuance, validation and refresh.
//!
//! Tokens are HS256 JWTs signed with a single shared secret. Validation is
//! stateless: a token is good if its signature verifies and
//! `nbf <= now < exp`. An optional [`RevocationList`] can be plugged in to
//! reject specific token ids before their natural expiry.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 3600; // 1 hour
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 3600; // 7 days

/// Caller role embedded in every token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Resolves the role for `username`: only the administrator name is admin.
    pub fn for_username(username: &str, admin_username: &str) -> Self {
        if username == admin_username {
            Role::Admin
        } else {
            Role::User
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Operations granted to the role.
    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            Role::Admin => &[
                "send_message",
                "view_messages",
                "manage_sessions",
                "admin_dashboard",
                "manage_users",
                "view_logs",
            ],
            Role::User => &["send_message", "view_messages"],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,
    /// Display name the token was issued for.
    pub username: String,
    pub role: Role,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds.
    pub exp: i64,
    /// Not before, unix seconds.
    pub nbf: i64,
    pub iss: String,
    /// Token id, the denylist key.
    pub jti: String,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Result of issuing a token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Claims embedded in the access token.
    pub claims: Claims,
}

/// Token lifetimes and identity settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub issuer: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    /// Username that resolves to [`Role::Admin`].
    pub admin_username: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "courier-api".to_string(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            admin_username: "admin".to_string(),
        }
    }
}

/// Denylist of token ids, consulted after signature and time checks.
///
/// Entries only need to live as long as the token they block.
pub trait RevocationList: Send + Sync + fmt::Debug {
    /// Blocks `jti` until `expires_at`.
    fn revoke(&self, jti: &str, expires_at: DateTime<Utc>);

    fn is_revoked(&self, jti: &str, now: DateTime<Utc>) -> bool;

    /// Drops entries whose token would have expired anyway.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize;
}

/// Process-local [`RevocationList`].
#[derive(Debug, Default)]
pub struct InMemoryRevocationList {
    entries: DashMap<String, DateTime<Utc>>,
}

impl InMemoryRevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RevocationList for InMemoryRevocationList {
    fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) {
        self.entries.insert(jti.to_string(), expires_at);
    }

    fn is_revoked(&self, jti: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(jti)
            .map(|until| *until > now)
            .unwrap_or(false)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, until| *until > now);
        before.saturating_sub(self.entries.len())
    }
}

/// Issues and validates identity tokens.
///
/// Pure function of its inputs and the shared secret; safe to share across
/// tasks without locking.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: TokenConfig,
    clock: Arc<dyn Clock>,
    revocations: Option<Arc<dyn RevocationList>>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .field("revocations", &self.revocations.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Creates a service signing with `secret`.
    pub fn new(secret: &str, config: TokenConfig) -> Self {
        Self::with_clock(secret, config, Arc::new(SystemClock))
    }

    pub fn with_clock(secret: &str, config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        // Temporal claims are checked against the injected clock, not by the
        // JWT library, so only signature, algorithm and issuer are left here.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::new();
        validation.set_issuer(&[config.issuer.as_str()]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            config,
            clock,
            revocations: None,
        }
    }

    /// Enables the denylist.
    pub fn with_revocation_list(mut self, list: Arc<dyn RevocationList>) -> Self {
        self.revocations = Some(list);
        self
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issues an access/refresh pair for `username`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if the signing backend fails.
    pub fn issue(&self, username: &str) -> Result<TokenPair, TokenError> {
        let now = self.clock.now();
        let sub = subject_id(username, now);
        let role = Role::for_username(username, &self.config.admin_username);

        let access = self.claims_for(
            &sub,
            username,
            role,
            now,
            Duration::seconds(self.config.access_ttl_seconds),
        );
        let refresh = self.claims_for(
            &sub,
            username,
            role,
            now,
            Duration::seconds(self.config.refresh_ttl_seconds),
        );

        let access_token = self.sign(&access)?;
        let refresh_token = self.sign(&refresh)?;

        info!(user_id = %sub, %role, "issued token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.config.access_ttl_seconds,
            claims: access,
        })
    }

    /// Validates `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// `InvalidSignature`, `Expired`, `NotYetValid`, `Malformed` or, with a
    /// denylist configured, `Revoked`.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;

        let now = self.clock.now();
        let ts = now.timestamp();
        if ts < claims.nbf {
            return Err(TokenError::NotYetValid);
        }
        if ts >= claims.exp {
            return Err(TokenError::Expired);
        }

        if let Some(revocations) = &self.revocations {
            if revocations.is_revoked(&claims.jti, now) {
                return Err(TokenError::Revoked);
            }
        }

        Ok(claims)
    }

    /// Exchanges a refresh token for a new pair.
    ///
    /// The refresh token is validated exactly like an access token; it stays
    /// usable until its own expiry unless it is revoked.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let claims = self.validate(refresh_token)?;
        debug!(user_id = %claims.sub, "refreshing token pair");
        self.issue(&claims.username)
    }

    /// Puts the token described by `claims` on the denylist.
    ///
    /// Returns `false` when no denylist is configured.
    pub fn revoke(&self, claims: &Claims) -> bool {
        match &self.revocations {
            Some(revocations) => {
                revocations.revoke(&claims.jti, claims.expires_at());
                info!(user_id = %claims.sub, jti = %claims.jti, "token revoked");
                true
            }
            None => false,
        }
    }

    /// Drops denylist entries for tokens that have expired anyway.
    pub fn purge_revocations(&self) -> usize {
        self.revocations
            .as_ref()
            .map(|r| r.purge_expired(self.clock.now()))
            .unwrap_or(0)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn claims_for(
        &self,
        sub: &str,
        username: &str,
        role: Role,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Claims {
        Claims {
            sub: sub.to_string(),
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            nbf: now.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        }
    }
}

/// Opaque 16-character user id derived from the username and issue time.
fn subject_id(username: &str, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    hex::encode(&hasher.finalize()[..8])
}
