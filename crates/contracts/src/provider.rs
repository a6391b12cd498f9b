//! Provider trait - downstream sink interface
//!
//! Defines the abstract interface for event providers.

use crate::{ContractError, Event};

/// Downstream event provider
///
/// All provider implementations must implement this trait.
#[trait_variant::make(Provider: Send)]
pub trait LocalProvider {
    /// Provider name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Push one batch of events, in arrival order
    ///
    /// # Errors
    /// Returns push error (should include context). Errors are reported by
    /// the dispatcher and never abort the pipeline.
    async fn push(&mut self, events: &[Event]) -> Result<(), ContractError>;

    /// Close provider, releasing its resources
    async fn close(&mut self) -> Result<(), ContractError>;
}
