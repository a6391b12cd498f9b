//! LogProvider - logs batch summary via tracing

use std::collections::BTreeSet;

use contracts::{ContractError, Event, Provider};
use tracing::{info, instrument};

/// Provider that logs batch summaries for debugging
pub struct LogProvider {
    name: String,
}

impl LogProvider {
    /// Create a new LogProvider with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_batch_summary(&self, events: &[Event]) {
        let topics: BTreeSet<&str> = events.iter().map(|e| e.topic.as_str()).collect();

        info!(
            provider = %self.name,
            count = events.len(),
            first_index = events.first().map(|e| e.index),
            last_index = events.last().map(|e| e.index),
            topics = ?topics,
            "Event batch received"
        );
    }
}

impl Provider for LogProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_provider_push",
        skip(self, events),
        fields(provider = %self.name, events = events.len())
    )]
    async fn push(&mut self, events: &[Event]) -> Result<(), ContractError> {
        self.log_batch_summary(events);
        Ok(())
    }

    #[instrument(name = "log_provider_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(provider = %self.name, "LogProvider closed");
        Ok(())
    }
}
