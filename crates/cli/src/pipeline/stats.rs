//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::{ProviderMetrics, WorkerSummary};
use observability::{ProviderTotals, RunTotals};
use stream::{ConsumerExit, ConsumerStatsSnapshot};

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Aggregated totals
    pub totals: RunTotals,
}

impl PipelineStats {
    pub fn new(duration: Duration) -> Self {
        Self {
            totals: RunTotals {
                duration,
                ..RunTotals::new()
            },
        }
    }

    pub fn record_consumer(&mut self, exit: &ConsumerExit, stats: &ConsumerStatsSnapshot) {
        self.totals.commit_index = exit.commit_index;
        self.totals.generations = exit.generations;
        self.totals.events_delivered = exit.events_delivered;
        self.totals.events_filtered = stats.events_filtered;
        self.totals.frames = stats.frames;
        self.totals.heartbeats = stats.heartbeats;
        self.totals.reconnects = stats.reconnects;
    }

    pub fn record_worker(&mut self, summary: &WorkerSummary) {
        self.totals.batches_flushed = summary.flushes();
        self.totals.events_flushed = summary.events_flushed;
        self.totals.partial_batches = summary.partial_batches;
    }

    pub fn record_provider(&mut self, name: &str, metrics: &ProviderMetrics) {
        let snapshot = metrics.snapshot();
        self.totals.add_provider(
            name,
            ProviderTotals {
                batches: snapshot.batch_count,
                events: snapshot.event_count,
                failures: snapshot.failure_count,
                timeouts: snapshot.timeout_count,
            },
        );
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!();
        print!("{}", self.totals);
        println!();
    }
}
