//! Bounded event queue between the stream consumer and the batch worker

use async_channel::{bounded, Receiver, Sender};
use contracts::{Event, EventHandler, HandlerClosed, Meta};

/// Create the inbound event queue
///
/// The handler side is given to the stream consumer, the receiver to the
/// [`BatchWorker`](crate::BatchWorker).
pub fn event_queue(capacity: usize) -> (QueueHandler, Receiver<Event>) {
    let (tx, rx) = bounded(capacity.max(1));
    (QueueHandler { tx }, rx)
}

/// [`EventHandler`] that forwards events into the queue
///
/// `handle` waits for free capacity, so a full queue slows the consumer down
/// instead of dropping events. It fails once the worker has closed the queue.
#[derive(Debug, Clone)]
pub struct QueueHandler {
    tx: Sender<Event>,
}

impl QueueHandler {
    /// Events waiting in the queue
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Whether the worker has closed the queue
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl EventHandler for QueueHandler {
    async fn handle(&mut self, event: Event, _meta: Meta) -> Result<(), HandlerClosed> {
        self.tx.send(event).await.map_err(|_| HandlerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handler_forwards_events() {
        let (mut handler, rx) = event_queue(4);
        handler
            .handle(Event::new(1, "Node", "NodeRegistration"), Meta::default())
            .await
            .unwrap();
        assert_eq!(handler.len(), 1);
        assert_eq!(rx.recv().await.unwrap().index, 1);
    }

    #[tokio::test]
    async fn test_full_queue_waits_until_closed() {
        let (mut handler, rx) = event_queue(1);
        handler
            .handle(Event::new(1, "Node", "NodeRegistration"), Meta::default())
            .await
            .unwrap();

        let mut blocked = handler.clone();
        let pending = tokio::spawn(async move {
            blocked
                .handle(Event::new(2, "Node", "NodeRegistration"), Meta::default())
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        rx.close();
        assert_eq!(pending.await.unwrap(), Err(HandlerClosed));
        assert!(handler.is_closed());
        // Events queued before close are still readable
        assert_eq!(rx.recv().await.unwrap().index, 1);
    }
}
