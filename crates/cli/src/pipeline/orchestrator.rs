//! Pipeline orchestrator - coordinates all components.
//!
//! StreamConsumer -> event queue -> BatchWorker -> SinkDispatcher -> providers

use std::time::Instant;

use contracts::{AppConfig, EventHandler};
use dispatcher::{BatchWorker, event_queue};
use stream::{
    CommitIndexStore, CommitTracker, ConsumerConfig, FeedClient, NomadFeedClient, StreamConsumer,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::PipelineStats;
use crate::error::{CliError, Result};

/// Main pipeline orchestrator
pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run against the Nomad HTTP event stream until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<PipelineStats> {
        let client = NomadFeedClient::from_config(&self.config.stream)?;
        info!(url = %client.stream_url(), "Using Nomad event stream");
        self.run_with_client(client, cancel).await
    }

    /// Run with any feed client
    ///
    /// Fatal consumer errors are returned after the batch worker has flushed
    /// and closed every provider.
    pub async fn run_with_client<C: FeedClient>(
        self,
        client: C,
        cancel: CancellationToken,
    ) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let config = &self.config;

        // Setup Dispatcher
        info!("Setting up dispatcher...");
        if config.sinks.providers.is_empty() {
            warn!("No providers configured - events will be dropped");
        }
        let sink_dispatcher = dispatcher::create_dispatcher(&config.sinks).await?;
        let provider_metrics = sink_dispatcher.provider_metrics();
        info!(providers = provider_metrics.len(), "Dispatcher started");

        // Setup Batch Worker
        let (handler, rx) = event_queue(config.sinks.batch.queue_size);
        let worker = BatchWorker::from_config(rx, sink_dispatcher, &config.sinks.batch);
        let worker_task = tokio::spawn(worker.run(cancel.clone()));

        // Setup Stream Consumer
        let consumer_result = self.run_consumer(client, handler, cancel).await;

        // The consumer dropped its queue handle; the worker drains what is left
        let worker_summary = worker_task
            .await
            .map_err(|e| CliError::task("batch_worker", e.to_string()))?;

        let (exit, consumer_stats) = consumer_result?;

        let mut stats = PipelineStats::new(start_time.elapsed());
        stats.record_consumer(&exit, &consumer_stats);
        stats.record_worker(&worker_summary);
        for (name, metrics) in &provider_metrics {
            stats.record_provider(name, metrics);
        }
        observability::record_run_totals(&stats.totals);

        info!(
            reason = ?exit.reason,
            commit_index = ?exit.commit_index,
            events = exit.events_delivered,
            duration_secs = stats.totals.duration.as_secs_f64(),
            "Pipeline shutdown complete"
        );
        Ok(stats)
    }

    async fn run_consumer<C, H>(
        &self,
        client: C,
        handler: H,
        cancel: CancellationToken,
    ) -> Result<(stream::ConsumerExit, stream::ConsumerStatsSnapshot)>
    where
        C: FeedClient,
        H: EventHandler,
    {
        let config = &self.config;
        let store = CommitIndexStore::new(&config.app.data_dir);
        info!(path = %store.path().display(), "Commit index location");
        let tracker = CommitTracker::new(store, config.app.commit_index_interval);
        let consumer_config = ConsumerConfig::from_section(&config.stream)?;

        let mut consumer = StreamConsumer::new(client, handler, tracker, consumer_config);
        // Fatal errors are logged by the consumer itself
        let exit = consumer.run(cancel).await?;
        Ok((exit, consumer.stats().snapshot()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{Event, FeedFrame};
    use std::time::Duration;
    use stream::{MockFeed, StreamEnd};

    fn config(data_dir: &std::path::Path, out: &std::path::Path, budget: u32) -> AppConfig {
        let toml = format!(
            r#"
[app]
data_dir = "{}"
commit_index_interval = "1s"

[stream]
topics = ["Deployment"]
max_reconnect_attempts = {}
reconnect_backoff_min = "10ms"
reconnect_backoff_max = "20ms"

[sinks.batch]
events_count = 2
idle_timeout = "1s"

[[sinks.providers]]
name = "file"
provider_type = "file"

[sinks.providers.params]
path = "{}"
"#,
            data_dir.display(),
            budget,
            out.display()
        );
        ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap()
    }

    fn deployment(index: u64) -> Event {
        Event::new(index, "Deployment", "DeploymentStatusUpdate")
    }

    #[tokio::test]
    async fn test_pipeline_delivers_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out/events.jsonl");
        let config = config(dir.path(), &out, 1);

        let feed = MockFeed::new().stream(
            vec![
                FeedFrame::new(1, vec![deployment(1)]),
                FeedFrame::new(2, vec![deployment(2)]),
                FeedFrame::new(3, vec![deployment(3)]),
            ],
            StreamEnd::Pending,
        );

        let cancel = CancellationToken::new();
        let pipeline = Pipeline::new(config).run_with_client(feed, cancel.clone());

        // Stop once the first full batch is on disk
        let stopper = async {
            let wait = async {
                loop {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let lines = std::fs::read_to_string(&out)
                        .map(|c| c.lines().count())
                        .unwrap_or(0);
                    if lines >= 2 {
                        break;
                    }
                }
            };
            tokio::time::timeout(Duration::from_secs(5), wait).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        };

        let (result, ()) = tokio::join!(pipeline, stopper);
        let stats = result.unwrap();
        assert_eq!(stats.totals.events_delivered, 3);
        assert_eq!(stats.totals.events_flushed, 3);
        assert_eq!(stats.totals.commit_index, Some(3));

        let content = std::fs::read_to_string(&out).unwrap();
        assert_eq!(content.lines().count(), 3);
        let saved = std::fs::read_to_string(dir.path().join(stream::COMMIT_INDEX_FILE)).unwrap();
        assert_eq!(saved.trim(), "3");
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_fatal_after_drain() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("events.jsonl");
        let config = config(dir.path(), &out, 1);

        let feed = MockFeed::new()
            .stream(vec![FeedFrame::new(5, vec![deployment(5)])], StreamEnd::Error("reset".into()))
            .refuse("connection refused");

        let result = Pipeline::new(config)
            .run_with_client(feed, CancellationToken::new())
            .await;
        let err = result.err().unwrap();
        assert_eq!(err.component(), "stream_consumer");
        assert!(matches!(
            err,
            CliError::Stream(stream::StreamError::ReconnectBudgetExhausted { .. })
        ));

        // Event received before the failure still reached the provider
        let content = std::fs::read_to_string(&out).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_provider_fails_before_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), &dir.path().join("x.jsonl"), 1);
        config.sinks.providers[0].params.clear();

        let feed = MockFeed::new();
        let result = Pipeline::new(config)
            .run_with_client(feed.clone(), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(CliError::Dispatcher(_))));
        assert!(feed.requests().is_empty());
    }
}
