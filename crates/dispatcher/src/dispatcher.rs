//! SinkDispatcher - fan-out of flushed batches to providers

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, instrument, warn};

use contracts::{Event, ProviderConfig, ProviderType, SinksSection};

use crate::error::DispatcherError;
use crate::handle::{ProviderHandle, PushOutcome};
use crate::metrics::{MetricsSnapshot, ProviderMetrics};
use crate::providers::{FileProvider, HttpProvider, LogProvider};

/// Per-batch delivery summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events in the batch
    pub events: usize,
    /// Providers that acknowledged the batch
    pub delivered: Vec<String>,
    /// Providers that failed or timed out, with the reason
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    /// Whether every provider acknowledged the batch
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Builder for creating a SinkDispatcher
pub struct DispatcherBuilder {
    providers: Vec<ProviderConfig>,
    push_timeout: Duration,
}

impl DispatcherBuilder {
    /// Create a builder from the `[sinks]` section
    pub fn new(config: &SinksSection) -> Self {
        Self {
            providers: config.providers.clone(),
            push_timeout: config.batch.push_timeout,
        }
    }

    /// Build and start the provider workers
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub async fn build(self) -> Result<SinkDispatcher, DispatcherError> {
        let handles = Self::initialize_handles(&self.providers).await?;
        Ok(SinkDispatcher::with_handles(handles, self.push_timeout))
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(providers),
        fields(provider_count = providers.len())
    )]
    async fn initialize_handles(
        providers: &[ProviderConfig],
    ) -> Result<Vec<ProviderHandle>, DispatcherError> {
        let mut handles = Vec::with_capacity(providers.len());
        for provider_config in providers {
            match create_provider_handle(provider_config).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Stop the workers that were already started
                    for handle in handles {
                        handle.shutdown().await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }
}

/// Create a ProviderHandle from configuration
#[instrument(
    name = "dispatcher_create_provider_handle",
    skip(config),
    fields(provider = %config.name, provider_type = ?config.provider_type)
)]
pub async fn create_provider_handle(
    config: &ProviderConfig,
) -> Result<ProviderHandle, DispatcherError> {
    match config.provider_type {
        ProviderType::Log => {
            let provider = LogProvider::new(&config.name);
            Ok(ProviderHandle::spawn(provider, config.queue_capacity))
        }
        ProviderType::File => {
            let provider = FileProvider::from_params(&config.name, &config.params)
                .await
                .map_err(|e| DispatcherError::provider_creation(&config.name, e.to_string()))?;
            Ok(ProviderHandle::spawn(provider, config.queue_capacity))
        }
        ProviderType::Http => {
            let provider = HttpProvider::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::provider_creation(&config.name, e.to_string()))?;
            provider
                .check_ready()
                .await
                .map_err(|e| DispatcherError::provider_creation(&config.name, e.to_string()))?;
            Ok(ProviderHandle::spawn(provider, config.queue_capacity))
        }
    }
}

/// Delivers each batch to every provider
///
/// Provider failures are logged and counted but never returned to the caller.
pub struct SinkDispatcher {
    handles: Vec<ProviderHandle>,
    push_timeout: Duration,
}

impl SinkDispatcher {
    /// Create a dispatcher with custom provider handles (for testing)
    pub fn with_handles(handles: Vec<ProviderHandle>, push_timeout: Duration) -> Self {
        Self {
            handles,
            push_timeout,
        }
    }

    /// Number of providers
    pub fn provider_count(&self) -> usize {
        self.handles.len()
    }

    /// Get metrics for all providers
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Shared metric handles, readable after the dispatcher is shut down
    pub fn provider_metrics(&self) -> Vec<(String, Arc<ProviderMetrics>)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), Arc::clone(h.metrics())))
            .collect()
    }

    /// Push `batch` to every provider concurrently and wait for all of them
    ///
    /// Each provider wait is bounded by the push timeout. Empty batches are
    /// ignored.
    #[instrument(name = "dispatcher_dispatch", skip_all, fields(events = batch.len()))]
    pub async fn dispatch(&self, batch: Vec<Event>) -> DispatchReport {
        let mut report = DispatchReport {
            events: batch.len(),
            ..DispatchReport::default()
        };
        if batch.is_empty() {
            return report;
        }

        let batch: Arc<[Event]> = batch.into();
        let outcomes = join_all(
            self.handles
                .iter()
                .map(|handle| handle.push(Arc::clone(&batch), self.push_timeout)),
        )
        .await;

        for (handle, outcome) in self.handles.iter().zip(outcomes) {
            let name = handle.name().to_string();
            match outcome {
                PushOutcome::Delivered => report.delivered.push(name),
                PushOutcome::Failed(reason) => report.failed.push((name, reason)),
                PushOutcome::TimedOut => report.failed.push((name, "push timed out".to_string())),
                PushOutcome::Closed => report.failed.push((name, "provider closed".to_string())),
            }
        }

        if report.all_delivered() {
            debug!(
                events = report.events,
                providers = report.delivered.len(),
                "Batch delivered"
            );
        } else {
            warn!(
                events = report.events,
                delivered = report.delivered.len(),
                failed = ?report.failed,
                "Batch not delivered to every provider"
            );
        }
        report
    }

    /// Drain provider queues and close every provider
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(self) {
        info!(providers = self.handles.len(), "Shutting down providers");
        for handle in self.handles {
            handle.shutdown().await;
        }
        info!("Dispatcher shutdown complete");
    }
}

/// Convenience function to create a dispatcher from the `[sinks]` section
#[instrument(name = "dispatcher_create", skip(config))]
pub async fn create_dispatcher(config: &SinksSection) -> Result<SinkDispatcher, DispatcherError> {
    DispatcherBuilder::new(config).build().await
}
