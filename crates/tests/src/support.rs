//! Shared pipeline harness for the e2e and property tests

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{ContractError, Event, FeedFrame, Provider};
use dispatcher::{BatchWorker, ProviderHandle, SinkDispatcher, WorkerSummary, event_queue};
use stream::{
    CommitIndexStore, CommitTracker, ConsumerConfig, ConsumerExit, MockFeed, StreamConsumer,
};
use tokio_util::sync::CancellationToken;

pub type Batches = Arc<Mutex<Vec<Vec<u64>>>>;

/// Provider recording each batch as a list of indices
pub struct RecordingProvider {
    name: String,
    batches: Batches,
    fail: bool,
}

impl RecordingProvider {
    pub fn new(name: &str) -> (Self, Batches) {
        Self::build(name, false)
    }

    /// Records the batch, then reports a failure
    pub fn failing(name: &str) -> (Self, Batches) {
        Self::build(name, true)
    }

    fn build(name: &str, fail: bool) -> (Self, Batches) {
        let batches: Batches = Arc::new(Mutex::new(Vec::new()));
        let provider = Self {
            name: name.to_string(),
            batches: Arc::clone(&batches),
            fail,
        };
        (provider, batches)
    }
}

impl Provider for RecordingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&mut self, events: &[Event]) -> Result<(), ContractError> {
        self.batches
            .lock()
            .unwrap()
            .push(events.iter().map(|e| e.index).collect());
        if self.fail {
            return Err(ContractError::provider_push(&self.name, "sink unavailable"));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

/// Batch settings used by the harness
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub events_count: usize,
    pub idle_timeout: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            events_count: 100,
            idle_timeout: Duration::from_secs(1),
        }
    }
}

pub struct PipelineRun {
    pub exit: stream::Result<ConsumerExit>,
    pub worker: WorkerSummary,
}

/// Run consumer + worker + dispatcher against `feed` until `stop` resolves
/// or the consumer gives up
pub async fn run_pipeline<F>(
    feed: MockFeed,
    config: ConsumerConfig,
    batch: BatchSettings,
    providers: Vec<RecordingProvider>,
    data_dir: &Path,
    stop: F,
) -> PipelineRun
where
    F: Future<Output = ()>,
{
    let handles = providers
        .into_iter()
        .map(|p| ProviderHandle::spawn(p, 16))
        .collect();
    let dispatcher = SinkDispatcher::with_handles(handles, Duration::from_secs(5));

    let (handler, rx) = event_queue(64);
    let worker = BatchWorker::new(rx, dispatcher, batch.events_count, batch.idle_timeout);
    let worker_task = tokio::spawn(worker.run(CancellationToken::new()));

    let tracker = CommitTracker::new(CommitIndexStore::new(data_dir), Duration::from_secs(1));
    let mut consumer = StreamConsumer::new(feed, handler, tracker, config);
    let cancel = CancellationToken::new();

    let exit = {
        let run = consumer.run(cancel.clone());
        tokio::pin!(run);
        tokio::select! {
            exit = &mut run => exit,
            _ = stop => {
                cancel.cancel();
                run.await
            }
        }
    };
    // Closes the producer side; the worker drains and shuts down
    drop(consumer);

    let worker = worker_task.await.unwrap();
    PipelineRun { exit, worker }
}

/// Consumer config selecting `topics`, with a small reconnect budget
pub fn consumer_config(topics: &[&str], budget: u32) -> ConsumerConfig {
    ConsumerConfig {
        topics: contracts::TopicFilter::parse(topics).unwrap(),
        budget: contracts::ReconnectBudget::from_attempts(budget),
        backoff_min: Duration::from_millis(10),
        backoff_max: Duration::from_millis(40),
        ..ConsumerConfig::default()
    }
}

/// One frame per event, each carrying its own index
pub fn frames(topic: &str, indices: impl IntoIterator<Item = u64>) -> Vec<FeedFrame> {
    indices
        .into_iter()
        .map(|i| FeedFrame::new(i, vec![Event::new(i, topic, "Update")]))
        .collect()
}

pub fn flatten(batches: &Batches) -> Vec<u64> {
    batches.lock().unwrap().iter().flatten().copied().collect()
}
