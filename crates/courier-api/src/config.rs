//! Application configuration.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. Optional `courier.toml` in the working directory
//! 3. `COURIER_*` environment variables (`COURIER_JWT_SECRET` -> `jwt_secret`)

use config::{Config, Environment, File};
use courier_security_core::{
    CredentialError, CredentialStore, DispatcherConfig, FanoutConfig, RateLimitConfig, TokenConfig,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use validator::Validate;

const ENV_PREFIX: &str = "COURIER";
const CONFIG_FILE: &str = "courier";

const DEV_JWT_SECRET: &str = "courier-dev-jwt-secret-change-me";
const DEV_WEBHOOK_SECRET: &str = "courier-dev-webhook-secret-change-me";
const DEV_CREDENTIALS: &str = "admin:courier2024";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    /// A secret has no value while running in production mode.
    #[error("{0} must be set in production mode")]
    MissingSecret(&'static str),

    #[error("invalid credential list: {0}")]
    Credentials(#[from] CredentialError),
}

/// Flat configuration; every field maps to one `COURIER_` variable.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    /// Disables development fallbacks for secrets and credentials.
    pub production: bool,
    pub log_json: bool,

    pub jwt_secret: Option<String>,
    pub webhook_secret: Option<String>,
    /// `user:pass[,user:pass]`.
    pub basic_auth: Option<String>,
    /// Comma-separated destination URLs.
    pub webhook_urls: String,
    #[validate(length(min = 1))]
    pub admin_username: String,
    /// Enables the token denylist used by logout.
    pub token_denylist: bool,

    #[validate(range(min = 1))]
    pub global_rate_limit: usize,
    #[validate(range(min = 1))]
    pub global_rate_window_secs: u64,
    #[validate(range(min = 1))]
    pub auth_rate_limit: usize,
    #[validate(range(min = 1))]
    pub auth_rate_window_secs: u64,
    pub limiter_max_tracked: Option<usize>,
    #[validate(range(min = 1))]
    pub limiter_sweep_secs: u64,

    #[validate(range(min = 1))]
    pub fanout_queue: usize,
    #[validate(range(min = 1))]
    pub fanout_concurrency: usize,
    #[validate(range(min = 1))]
    pub webhook_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let global = RateLimitConfig::global();
        let auth = RateLimitConfig::auth();
        let fanout = FanoutConfig::default();

        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            production: false,
            log_json: false,
            jwt_secret: None,
            webhook_secret: None,
            basic_auth: None,
            webhook_urls: String::new(),
            admin_username: TokenConfig::default().admin_username,
            token_denylist: true,
            global_rate_limit: global.limit,
            global_rate_window_secs: global.window_secs,
            auth_rate_limit: auth.limit,
            auth_rate_window_secs: auth.window_secs,
            limiter_max_tracked: None,
            limiter_sweep_secs: 300,
            fanout_queue: fanout.queue_capacity,
            fanout_concurrency: fanout.concurrency,
            webhook_timeout_secs: DispatcherConfig::default().timeout_secs,
        }
    }
}

/// Secrets after applying development fallbacks.
pub struct Secrets {
    pub jwt_secret: String,
    pub webhook_secret: String,
    pub credentials: CredentialStore,
    /// `false` when the webhook secret is a development fallback.
    pub webhook_secret_configured: bool,
}

impl AppConfig {
    /// Loads and validates configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;

        Ok(app_config)
    }

    pub fn global_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            limit: self.global_rate_limit,
            window_secs: self.global_rate_window_secs,
            max_tracked: self.limiter_max_tracked,
        }
    }

    pub fn auth_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            limit: self.auth_rate_limit,
            window_secs: self.auth_rate_window_secs,
            max_tracked: self.limiter_max_tracked,
        }
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            admin_username: self.admin_username.clone(),
            ..TokenConfig::default()
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            timeout_secs: self.webhook_timeout_secs,
            ..DispatcherConfig::default()
        }
    }

    pub fn fanout_config(&self) -> FanoutConfig {
        FanoutConfig {
            queue_capacity: self.fanout_queue,
            concurrency: self.fanout_concurrency,
        }
    }

    /// Resolves secrets and credentials.
    ///
    /// Outside production a missing value falls back to a development
    /// default with a warning; in production it is an error.
    pub fn resolve_secrets(&self) -> Result<Secrets, ConfigError> {
        let jwt_secret =
            self.secret_or_fallback(&self.jwt_secret, "COURIER_JWT_SECRET", DEV_JWT_SECRET)?;
        let webhook_secret = self.secret_or_fallback(
            &self.webhook_secret,
            "COURIER_WEBHOOK_SECRET",
            DEV_WEBHOOK_SECRET,
        )?;
        let basic_auth =
            self.secret_or_fallback(&self.basic_auth, "COURIER_BASIC_AUTH", DEV_CREDENTIALS)?;

        Ok(Secrets {
            jwt_secret,
            webhook_secret,
            credentials: CredentialStore::parse(&basic_auth)?,
            webhook_secret_configured: non_empty(&self.webhook_secret).is_some(),
        })
    }

    fn secret_or_fallback(
        &self,
        value: &Option<String>,
        name: &'static str,
        fallback: &str,
    ) -> Result<String, ConfigError> {
        if let Some(value) = non_empty(value) {
            return Ok(value.to_string());
        }
        if self.production {
            return Err(ConfigError::MissingSecret(name));
        }
        warn!(variable = name, "not set, using development default");
        Ok(fallback.to_string())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
