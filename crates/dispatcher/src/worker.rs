//! BatchWorker - accumulates queued events into bounded batches
//!
//! A batch is flushed when it reaches `events_count` events, when the idle
//! deadline passes, or on shutdown. On cancellation the worker closes the
//! queue, drains what is left, flushes once more and shuts the providers down.

use std::time::Duration;

use async_channel::Receiver;
use contracts::{BatchConfig, Event};
use metrics::{counter, histogram};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::dispatcher::SinkDispatcher;

/// What triggered a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Batch reached `events_count`
    Count,
    /// Idle deadline passed
    Idle,
    /// Final flush on shutdown
    Shutdown,
}

impl FlushReason {
    /// Metric label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Idle => "idle",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Totals reported when the worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Events handed to the dispatcher
    pub events_flushed: u64,
    /// Flushes triggered by size
    pub count_flushes: u64,
    /// Flushes triggered by the idle deadline
    pub idle_flushes: u64,
    /// Final flushes (0 or 1)
    pub shutdown_flushes: u64,
    /// Batches that at least one provider did not acknowledge
    pub partial_batches: u64,
}

impl WorkerSummary {
    /// Total non-empty flushes
    pub fn flushes(&self) -> u64 {
        self.count_flushes + self.idle_flushes + self.shutdown_flushes
    }
}

/// Batch accumulator between the event queue and the dispatcher
pub struct BatchWorker {
    rx: Receiver<Event>,
    dispatcher: SinkDispatcher,
    events_count: usize,
    idle_timeout: Duration,
    batch: Vec<Event>,
    summary: WorkerSummary,
}

impl BatchWorker {
    /// Create a worker
    pub fn new(
        rx: Receiver<Event>,
        dispatcher: SinkDispatcher,
        events_count: usize,
        idle_timeout: Duration,
    ) -> Self {
        let events_count = events_count.max(1);
        Self {
            rx,
            dispatcher,
            events_count,
            idle_timeout,
            batch: Vec::with_capacity(events_count),
            summary: WorkerSummary::default(),
        }
    }

    /// Create a worker from `[sinks.batch]`
    pub fn from_config(rx: Receiver<Event>, dispatcher: SinkDispatcher, config: &BatchConfig) -> Self {
        Self::new(rx, dispatcher, config.events_count, config.idle_timeout)
    }

    /// Run until cancelled or the queue is closed by the producer
    ///
    /// Returns once the final flush is done and every provider is closed.
    #[instrument(
        name = "batch_worker_run",
        skip_all,
        fields(events_count = self.events_count, idle_timeout = ?self.idle_timeout)
    )]
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerSummary {
        info!(providers = self.dispatcher.provider_count(), "Batch worker started");
        let mut deadline = Instant::now() + self.idle_timeout;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Cancellation received, closing event queue");
                    self.rx.close();
                    break;
                }
                received = self.rx.recv() => match received {
                    Ok(event) => {
                        self.batch.push(event);
                        if self.batch.len() >= self.events_count {
                            self.flush(FlushReason::Count).await;
                            deadline = Instant::now() + self.idle_timeout;
                        }
                    }
                    Err(_) => {
                        debug!("Event queue closed by producer");
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    self.flush(FlushReason::Idle).await;
                    deadline = Instant::now() + self.idle_timeout;
                }
            }
        }

        // Events accepted before the queue was closed
        while let Ok(event) = self.rx.try_recv() {
            self.batch.push(event);
            if self.batch.len() >= self.events_count {
                self.flush(FlushReason::Count).await;
            }
        }
        self.flush(FlushReason::Shutdown).await;

        let summary = self.summary;
        self.dispatcher.shutdown().await;
        info!(
            events = summary.events_flushed,
            flushes = summary.flushes(),
            partial = summary.partial_batches,
            "Batch worker stopped"
        );
        summary
    }

    async fn flush(&mut self, reason: FlushReason) {
        if self.batch.is_empty() {
            return;
        }

        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.events_count));
        let size = batch.len();
        debug!(
            reason = reason.as_str(),
            events = size,
            first_index = batch.first().map(|e| e.index),
            last_index = batch.last().map(|e| e.index),
            "Flushing batch"
        );
        counter!("nes_batch_flushes_total", "reason" => reason.as_str()).increment(1);
        histogram!("nes_batch_size").record(size as f64);

        let report = self.dispatcher.dispatch(batch).await;

        self.summary.events_flushed += size as u64;
        match reason {
            FlushReason::Count => self.summary.count_flushes += 1,
            FlushReason::Idle => self.summary.idle_flushes += 1,
            FlushReason::Shutdown => self.summary.shutdown_flushes += 1,
        }
        if !report.all_delivered() {
            self.summary.partial_batches += 1;
        }
    }
}
