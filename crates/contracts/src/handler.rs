//! EventHandler trait - per-event delivery from the stream consumer
//!
//! The consumer awaits the handler for every event, so a slow handler applies
//! back-pressure to the feed instead of losing events.

use crate::{Event, Meta};

/// Returned when the handler can no longer accept events
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event handler closed")]
pub struct HandlerClosed;

/// Per-event callback invoked by the stream consumer
#[trait_variant::make(EventHandler: Send)]
pub trait LocalEventHandler {
    /// Deliver one event
    ///
    /// # Errors
    /// `HandlerClosed` once the receiving side is gone; the consumer then
    /// stops streaming.
    async fn handle(&mut self, event: Event, meta: Meta) -> Result<(), HandlerClosed>;
}

/// Adapts a synchronous closure into an [`EventHandler`]
///
/// # Example
///
/// ```
/// use contracts::{CallbackHandler, Event, Meta};
///
/// let mut seen = Vec::new();
/// let _handler = CallbackHandler::new(move |event: Event, _meta: Meta| {
///     seen.push(event.index);
/// });
/// ```
pub struct CallbackHandler<F> {
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: FnMut(Event, Meta) + Send,
{
    /// Wrap a closure
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: FnMut(Event, Meta) + Send,
{
    async fn handle(&mut self, event: Event, meta: Meta) -> Result<(), HandlerClosed> {
        (self.callback)(event, meta);
        Ok(())
    }
}
