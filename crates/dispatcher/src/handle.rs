//! ProviderHandle - manages a provider with isolated queue and worker task

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{ContractError, Event, Provider};

use crate::metrics::ProviderMetrics;

/// One batch queued for a provider, acknowledged once pushed
struct PushRequest {
    batch: Arc<[Event]>,
    ack: oneshot::Sender<Result<(), ContractError>>,
}

/// Result of handing one batch to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Provider acknowledged the batch
    Delivered,
    /// Provider returned an error
    Failed(String),
    /// No acknowledgement within the push timeout
    TimedOut,
    /// Provider worker is gone
    Closed,
}

impl PushOutcome {
    /// Whether the provider accepted the batch
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Handle to a running provider worker
pub struct ProviderHandle {
    /// Provider name
    name: String,
    /// Channel to send batches to worker
    tx: mpsc::Sender<PushRequest>,
    /// Shared metrics
    metrics: Arc<ProviderMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl ProviderHandle {
    /// Create a new ProviderHandle and spawn the worker task
    pub fn spawn<P: Provider + Send + 'static>(provider: P, queue_capacity: usize) -> Self {
        let name = provider.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(ProviderMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            provider_worker(provider, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get provider name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<ProviderMetrics> {
        &self.metrics
    }

    /// Queue a batch and wait for the provider to acknowledge it
    ///
    /// Queueing and acknowledgement together are bounded by `timeout`. A batch
    /// that was queued before the timeout is still pushed afterwards, so the
    /// provider keeps seeing batches in order.
    pub async fn push(&self, batch: Arc<[Event]>, timeout: Duration) -> PushOutcome {
        let events = batch.len();
        let (ack, ack_rx) = oneshot::channel();

        let outcome = tokio::time::timeout(timeout, async {
            if self.tx.send(PushRequest { batch, ack }).await.is_err() {
                return PushOutcome::Closed;
            }
            self.metrics
                .set_queue_len(self.tx.max_capacity() - self.tx.capacity());

            match ack_rx.await {
                Ok(Ok(())) => PushOutcome::Delivered,
                Ok(Err(e)) => PushOutcome::Failed(e.to_string()),
                Err(_) => PushOutcome::Closed,
            }
        })
        .await
        .unwrap_or(PushOutcome::TimedOut);

        match &outcome {
            PushOutcome::TimedOut => {
                self.metrics.inc_timeout_count();
                counter!(
                    "nes_provider_push_total",
                    "provider" => self.name.clone(),
                    "status" => "timeout"
                )
                .increment(1);
                warn!(
                    provider = %self.name,
                    events,
                    timeout = ?timeout,
                    "Provider did not acknowledge batch in time"
                );
            }
            PushOutcome::Closed => {
                error!(provider = %self.name, "Provider worker closed unexpectedly");
            }
            PushOutcome::Delivered | PushOutcome::Failed(_) => {}
        }
        outcome
    }

    /// Shutdown the provider worker gracefully
    ///
    /// Batches already queued are pushed before the provider is closed.
    #[instrument(name = "provider_handle_shutdown", skip(self), fields(provider = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        // Wait for worker to finish
        if let Err(e) = self.worker_handle.await {
            error!(provider = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(provider = %self.name, "ProviderHandle shutdown complete");
    }
}

/// Worker task that consumes batches and pushes them to the provider
#[instrument(
    name = "provider_worker_loop",
    skip(provider, rx, metrics),
    fields(provider = %name)
)]
async fn provider_worker<P: Provider>(
    mut provider: P,
    mut rx: mpsc::Receiver<PushRequest>,
    metrics: Arc<ProviderMetrics>,
    name: String,
) {
    debug!(provider = %name, "Provider worker started");

    while let Some(request) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        let result = provider.push(&request.batch).await;
        match &result {
            Ok(()) => {
                metrics.record_success(request.batch.len());
                counter!("nes_provider_push_total", "provider" => name.clone(), "status" => "success")
                    .increment(1);
            }
            Err(e) => {
                metrics.inc_failure_count();
                counter!("nes_provider_push_total", "provider" => name.clone(), "status" => "failure")
                    .increment(1);
                error!(
                    provider = %name,
                    events = request.batch.len(),
                    first_index = request.batch.first().map(|e| e.index),
                    error = %e,
                    "Push failed"
                );
                // Continue processing - don't crash on single failure
            }
        }
        // The dispatcher may have stopped waiting
        let _ = request.ack.send(result);
    }

    if let Err(e) = provider.close().await {
        error!(provider = %name, error = %e, "Close failed on shutdown");
    }

    debug!(provider = %name, "Provider worker stopped");
}
