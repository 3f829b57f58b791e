//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_security_core::{
    Clock, CredentialStore, DestinationRegistry, DispatchError, FanoutHandle, FanoutWorker,
    InMemoryRevocationList, SlidingWindowLimiter, SystemClock, TokenService, WebhookDispatcher,
    WebhookSigner,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{AppConfig, Secrets};
use crate::store::MessageStore;

/// Everything handlers and guards need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenService>,
    pub credentials: Arc<CredentialStore>,
    pub signer: Arc<WebhookSigner>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub fanout: FanoutHandle,
    pub store: Arc<dyn MessageStore>,
    pub global_limiter: Arc<SlidingWindowLimiter>,
    pub auth_limiter: Arc<SlidingWindowLimiter>,
    pub webhook_secret_configured: bool,
    pub clock: Arc<dyn Clock>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wires all components and starts the fan-out worker.
    ///
    /// The worker stops when `cancellation_token` is cancelled; call
    /// [`FanoutWorker::shutdown`] on the returned worker to drain it.
    pub fn build(
        config: AppConfig,
        secrets: Secrets,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Result<(Self, FanoutWorker), DispatchError> {
        let mut tokens =
            TokenService::with_clock(&secrets.jwt_secret, config.token_config(), clock.clone());
        if config.token_denylist {
            tokens = tokens.with_revocation_list(Arc::new(InMemoryRevocationList::new()));
        }

        let signer = Arc::new(WebhookSigner::new(&secrets.webhook_secret));
        let registry = DestinationRegistry::from_csv(&config.webhook_urls);
        let dispatcher = Arc::new(WebhookDispatcher::new(
            &config.dispatcher_config(),
            signer.clone(),
            registry,
        )?);
        let (worker, fanout) =
            FanoutWorker::spawn(dispatcher.clone(), &config.fanout_config(), cancellation_token);

        let global_limiter = Arc::new(SlidingWindowLimiter::with_clock(
            config.global_rate_limit(),
            clock.clone(),
        ));
        let auth_limiter = Arc::new(SlidingWindowLimiter::with_clock(
            config.auth_rate_limit(),
            clock.clone(),
        ));

        let state = Self {
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            credentials: Arc::new(secrets.credentials),
            signer,
            dispatcher,
            fanout,
            store,
            global_limiter,
            auth_limiter,
            webhook_secret_configured: secrets.webhook_secret_configured,
            started_at: clock.now(),
            clock,
        };

        Ok((state, worker))
    }

    /// Builds state with the system clock.
    pub fn from_config(
        config: AppConfig,
        store: Arc<dyn MessageStore>,
        cancellation_token: CancellationToken,
    ) -> anyhow::Result<(Self, FanoutWorker)> {
        let secrets = config.resolve_secrets()?;
        let built = Self::build(config, secrets, store, Arc::new(SystemClock), cancellation_token)?;
        Ok(built)
    }

    pub fn uptime_secs(&self) -> i64 {
        (self.clock.now() - self.started_at).num_seconds().max(0)
    }
}

/// Periodically evicts idle limiter entries and expired denylist entries.
pub fn spawn_sweeper(
    state: AppState,
    interval: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancellation_token.cancelled() => break,
                _ = ticker.tick() => {
                    let global = state.global_limiter.sweep();
                    let auth = state.auth_limiter.sweep();
                    let revocations = state.tokens.purge_revocations();
                    debug!(global, auth, revocations, "sweep finished");
                }
            }
        }

        info!("sweeper stopped");
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_build_honours_config() {
        let config = AppConfig {
            webhook_urls: "http://a/hook, http://b/hook".to_string(),
            auth_rate_limit: 2,
            ..test_config()
        };
        let state = build_state(
            config,
            Arc::new(crate::store::InMemoryMessageStore::new()),
            Arc::new(courier_security_core::ManualClock::starting_now()),
        );

        assert_eq!(state.dispatcher.destinations().len().await, 2);
        assert_eq!(state.auth_limiter.config().limit, 2);
        assert!(state.webhook_secret_configured);
        assert!(state.credentials.verify("alice", "alicepw"));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_cancel() {
        let state = default_state();
        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(state, Duration::from_millis(10), cancel.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
