//! Background fan-out of webhook events.
//!
//! Request handlers hand events to a [`FanoutHandle`] and return
//! immediately; a single supervised worker drains the queue and runs up to
//! `concurrency` dispatches at once. Delivery outcomes are only logged.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::FanoutError;
use crate::webhook::dispatcher::WebhookDispatcher;
use crate::webhook::event::WebhookEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Events buffered before new submissions are dropped.
    pub queue_capacity: usize,
    /// Dispatches allowed in flight at once.
    pub concurrency: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            concurrency: 8,
        }
    }
}

/// Cloneable submission side of the fan-out queue.
#[derive(Debug, Clone)]
pub struct FanoutHandle {
    tx: mpsc::Sender<WebhookEvent>,
}

impl FanoutHandle {
    fn channel(capacity: usize) -> (Self, mpsc::Receiver<WebhookEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues `event` without waiting.
    ///
    /// Returns `false` when the queue is full or the worker has stopped; the
    /// event is dropped in that case.
    pub fn submit(&self, event: WebhookEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    event_type = %event.event_type,
                    message_id = %event.message_id,
                    "fan-out queue full, dropping webhook event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    event_type = %event.event_type,
                    message_id = %event.message_id,
                    "fan-out worker stopped, dropping webhook event"
                );
                false
            }
        }
    }
}

/// Owner of the background worker task.
#[derive(Debug)]
pub struct FanoutWorker {
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl FanoutWorker {
    /// Spawns the worker on the current runtime.
    pub fn spawn(
        dispatcher: Arc<WebhookDispatcher>,
        config: &FanoutConfig,
        cancellation_token: CancellationToken,
    ) -> (Self, FanoutHandle) {
        let (submitter, rx) = FanoutHandle::channel(config.queue_capacity);
        let concurrency = config.concurrency.max(1);

        info!(
            queue_capacity = config.queue_capacity,
            concurrency, "starting webhook fan-out worker"
        );

        let handle = tokio::spawn(run(dispatcher, rx, concurrency, cancellation_token.clone()));

        (
            Self {
                cancellation_token,
                handle,
            },
            submitter,
        )
    }

    /// Stops accepting events, then waits for queued and in-flight dispatches.
    ///
    /// # Errors
    ///
    /// `ShutdownTimeout` if draining takes longer than `timeout` (the worker
    /// is aborted), `WorkerPanic` if the worker task panicked.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), FanoutError> {
        info!(timeout_seconds = timeout.as_secs(), "initiating fan-out shutdown");
        self.cancellation_token.cancel();

        let mut handle = self.handle;
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("fan-out worker shutdown completed");
                Ok(())
            }
            Ok(Err(join_error)) => {
                error!(error = %join_error, "fan-out worker panicked");
                Err(FanoutError::WorkerPanic(join_error.to_string()))
            }
            Err(_elapsed) => {
                handle.abort();
                error!(
                    timeout_seconds = timeout.as_secs(),
                    "fan-out shutdown timed out, pending dispatches abandoned"
                );
                Err(FanoutError::ShutdownTimeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }
}

async fn run(
    dispatcher: Arc<WebhookDispatcher>,
    mut rx: mpsc::Receiver<WebhookEvent>,
    concurrency: usize,
    cancellation_token: CancellationToken,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = cancellation_token.cancelled() => break,
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => log_join(joined),
            next = rx.recv(), if in_flight.len() < concurrency => match next {
                Some(event) => {
                    in_flight.spawn(dispatch_one(dispatcher.clone(), event));
                }
                None => break,
            },
        }
    }

    // Drain whatever was accepted before the queue closed.
    rx.close();
    let mut drained = 0usize;
    while let Some(event) = rx.recv().await {
        while in_flight.len() >= concurrency {
            if let Some(joined) = in_flight.join_next().await {
                log_join(joined);
            }
        }
        in_flight.spawn(dispatch_one(dispatcher.clone(), event));
        drained += 1;
    }
    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }

    info!(drained, "fan-out worker stopped");
}

async fn dispatch_one(dispatcher: Arc<WebhookDispatcher>, event: WebhookEvent) {
    match dispatcher.dispatch(&event).await {
        Ok(results) => {
            let failed = results.iter().filter(|r| !r.success).count();
            debug!(
                message_id = %event.message_id,
                destinations = results.len(),
                failed,
                "background dispatch finished"
            );
        }
        Err(e) => {
            warn!(message_id = %event.message_id, error = %e, "background dispatch skipped");
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(join_error) = joined {
        error!(error = %join_error, "background dispatch task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::dispatcher::DispatcherConfig;
    use crate::webhook::registry::DestinationRegistry;
    use crate::webhook::signer::WebhookSigner;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(id: &str) -> WebhookEvent {
        WebhookEvent::new("message_sent", "628111", id)
    }

    #[test]
    fn test_submit_drops_when_queue_full() {
        let (handle, _rx) = FanoutHandle::channel(1);

        assert!(handle.submit(event("1")));
        assert!(!handle.submit(event("2")));
    }

    #[test]
    fn test_submit_after_close_is_rejected() {
        let (handle, rx) = FanoutHandle::channel(4);
        drop(rx);

        assert!(!handle.submit(event("1")));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
            .expect(5)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(
            &DispatcherConfig::default(),
            Arc::new(WebhookSigner::new("s3cr3t")),
            DestinationRegistry::new([server.uri()]),
        )
        .unwrap();
        let config = FanoutConfig {
            queue_capacity: 16,
            concurrency: 2,
        };
        let (worker, handle) =
            FanoutWorker::spawn(Arc::new(dispatcher), &config, CancellationToken::new());

        for i in 0..5 {
            assert!(handle.submit(event(&format!("msg_{i}"))));
        }

        worker.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 5);
        assert!(!handle.submit(event("late")));
    }

    #[tokio::test]
    async fn test_empty_registry_is_logged_not_fatal() {
        let dispatcher = WebhookDispatcher::new(
            &DispatcherConfig::default(),
            Arc::new(WebhookSigner::new("s3cr3t")),
            DestinationRegistry::default(),
        )
        .unwrap();
        let (worker, handle) = FanoutWorker::spawn(
            Arc::new(dispatcher),
            &FanoutConfig::default(),
            CancellationToken::new(),
        );

        assert!(handle.submit(event("1")));

        worker.shutdown(Duration::from_secs(1)).await.unwrap();
    }
}
