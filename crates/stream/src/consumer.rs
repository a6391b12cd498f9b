//! StreamConsumer - long-lived event feed subscription
//!
//! State machine:
//!
//! ```text
//! Idle -> Connecting -> Streaming -> Reconnecting -> Connecting -> ... -> Terminal
//! ```
//!
//! Every delivered event advances the [`CommitTracker`]. Reconnects back off
//! exponentially and are bounded by the configured [`ReconnectBudget`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ContractError, EventHandler, FeedFrame, InitialPosition, Meta, ReconnectBudget,
    StreamSection, TopicFilter,
};
use metrics::{counter, gauge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::backoff::Backoff;
use crate::client::{FeedClient, FeedSubscription, SubscribeRequest};
use crate::commit_index::CommitTracker;
use crate::error::{Result, StreamError};

/// Consumer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Not started
    Idle,
    /// Opening a subscription
    Connecting,
    /// Reading frames
    Streaming,
    /// Waiting before the next connection attempt
    Reconnecting,
    /// Stopped
    Terminal,
}

/// Why the consumer stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The cancellation token fired
    Cancelled,
    /// The event handler stopped accepting events
    HandlerClosed,
}

/// Summary returned by a clean [`StreamConsumer::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerExit {
    /// Why the consumer stopped
    pub reason: ExitReason,
    /// Highest index recorded by the commit tracker
    pub commit_index: Option<u64>,
    /// Number of successful connections
    pub generations: u64,
    /// Events handed to the handler
    pub events_delivered: u64,
}

/// Consumer settings derived from `[stream]`
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Selected topics
    pub topics: TopicFilter,
    /// Namespace, `*` for all
    pub namespace: String,
    /// Start position without a commit index
    pub initial_position: InitialPosition,
    /// Reconnect limit
    pub budget: ReconnectBudget,
    /// First reconnect delay
    pub backoff_min: Duration,
    /// Reconnect delay cap
    pub backoff_max: Duration,
}

impl ConsumerConfig {
    /// Build from the `[stream]` section
    ///
    /// # Errors
    /// A topic entry is not a valid `Topic` or `Topic:Key`.
    pub fn from_section(section: &StreamSection) -> std::result::Result<Self, ContractError> {
        Ok(Self {
            topics: TopicFilter::parse(&section.topics)?,
            namespace: section.namespace.clone(),
            initial_position: section.initial_position,
            budget: section.reconnect_budget(),
            backoff_min: section.reconnect_backoff_min,
            backoff_max: section.reconnect_backoff_max,
        })
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        let section = StreamSection::default();
        let budget = section.reconnect_budget();
        Self {
            topics: TopicFilter::all(),
            namespace: section.namespace,
            initial_position: section.initial_position,
            budget,
            backoff_min: section.reconnect_backoff_min,
            backoff_max: section.reconnect_backoff_max,
        }
    }
}

/// Consumer counters
#[derive(Debug, Default)]
pub struct ConsumerStats {
    events_delivered: AtomicU64,
    events_filtered: AtomicU64,
    frames: AtomicU64,
    heartbeats: AtomicU64,
    reconnects: AtomicU64,
}

impl ConsumerStats {
    /// Create new stats instance
    pub fn new() -> Self {
        Self::default()
    }

    fn record_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
        counter!("nes_stream_events_total").increment(1);
    }

    fn record_filtered(&self) {
        self.events_filtered.fetch_add(1, Ordering::Relaxed);
        counter!("nes_stream_events_filtered_total").increment(1);
    }

    fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
        counter!("nes_stream_heartbeats_total").increment(1);
    }

    fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        counter!("nes_stream_reconnects_total").increment(1);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_filtered: self.events_filtered.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStatsSnapshot {
    pub events_delivered: u64,
    pub events_filtered: u64,
    pub frames: u64,
    pub heartbeats: u64,
    pub reconnects: u64,
}

enum StreamOutcome {
    Exit(ExitReason),
    Failed(StreamError),
}

/// Event feed consumer
pub struct StreamConsumer<C, H> {
    client: C,
    handler: H,
    tracker: CommitTracker,
    config: ConsumerConfig,
    state: ConsumerState,
    generation: u64,
    attempts: u32,
    last_frame_index: Option<u64>,
    stats: Arc<ConsumerStats>,
}

impl<C, H> StreamConsumer<C, H>
where
    C: FeedClient,
    H: EventHandler,
{
    /// Create a consumer; nothing happens until [`run`](Self::run)
    pub fn new(client: C, handler: H, tracker: CommitTracker, config: ConsumerConfig) -> Self {
        Self {
            client,
            handler,
            tracker,
            config,
            state: ConsumerState::Idle,
            generation: 0,
            attempts: 0,
            last_frame_index: None,
            stats: Arc::new(ConsumerStats::new()),
        }
    }

    /// Current state
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Commit tracker
    pub fn tracker(&self) -> &CommitTracker {
        &self.tracker
    }

    /// Consume the feed until cancelled, the handler closes or the reconnect
    /// budget runs out
    ///
    /// The commit index is flushed before returning in every case.
    ///
    /// # Errors
    /// - `StreamError::Checkpoint` when the stored commit index is unreadable
    /// - `StreamError::ReconnectBudgetExhausted`
    #[instrument(name = "stream_consumer_run", skip_all)]
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<ConsumerExit> {
        self.transition(ConsumerState::Idle);
        let loaded = match self.tracker.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(component = "stream_consumer", error = %e, "failed to load commit index");
                self.transition(ConsumerState::Terminal);
                return Err(e);
            }
        };
        let start_index = loaded.unwrap_or_else(|| self.config.initial_position.start_index());
        info!(
            commit_index = ?loaded,
            start_index,
            topics = ?self.config.topics.entries().iter().map(ToString::to_string).collect::<Vec<_>>(),
            namespace = %self.config.namespace,
            "stream consumer starting"
        );

        let result = self.run_loop(&cancel, start_index).await;

        self.transition(ConsumerState::Terminal);
        // Failures are already logged and counted
        let _ = self.tracker.flush().await;

        let exit = result?;
        let stats = self.stats.snapshot();
        info!(
            reason = ?exit,
            commit_index = ?self.tracker.current(),
            generations = self.generation,
            events = stats.events_delivered,
            "stream consumer stopped"
        );
        Ok(ConsumerExit {
            reason: exit,
            commit_index: self.tracker.current(),
            generations: self.generation,
            events_delivered: stats.events_delivered,
        })
    }

    async fn run_loop(&mut self, cancel: &CancellationToken, start_index: u64) -> Result<ExitReason> {
        let mut backoff = Backoff::new(self.config.backoff_min, self.config.backoff_max);

        loop {
            let request = SubscribeRequest {
                topics: self.config.topics.clone(),
                start_index: self.resume_index(start_index),
                namespace: self.config.namespace.clone(),
            };

            self.transition(ConsumerState::Connecting);
            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(ExitReason::Cancelled),
                result = self.client.subscribe(&request) => result,
            };

            let failure = match connected {
                Ok(mut subscription) => {
                    self.generation += 1;
                    self.attempts = 0;
                    backoff.reset();
                    gauge!("nes_stream_generation").set(self.generation as f64);
                    info!(
                        generation = self.generation,
                        start_index = request.start_index,
                        "subscribed to event stream"
                    );

                    self.transition(ConsumerState::Streaming);
                    match self.stream(&mut subscription, cancel).await {
                        StreamOutcome::Exit(reason) => return Ok(reason),
                        StreamOutcome::Failed(e) => e,
                    }
                }
                Err(e) => e,
            };

            self.record_failed_attempt();
            self.transition(ConsumerState::Reconnecting);

            if self.config.budget.is_exhausted(self.attempts) {
                error!(
                    component = "stream_consumer",
                    attempts = self.attempts,
                    error = %failure,
                    "reconnect budget exhausted"
                );
                return Err(StreamError::ReconnectBudgetExhausted {
                    attempts: self.attempts,
                    last_error: Box::new(failure),
                });
            }

            let delay = backoff.next_delay();
            self.stats.record_reconnect();
            warn!(
                attempt = self.attempts,
                delay = ?delay,
                error = %failure,
                "event stream interrupted, reconnecting"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(ExitReason::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn stream<S>(&mut self, subscription: &mut S, cancel: &CancellationToken) -> StreamOutcome
    where
        S: FeedSubscription,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamOutcome::Exit(ExitReason::Cancelled),
                next = subscription.next_frame() => next,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => return StreamOutcome::Failed(StreamError::FeedClosed),
                Err(e) => return StreamOutcome::Failed(e),
            };

            if frame.is_heartbeat() {
                self.stats.record_heartbeat();
                trace!("heartbeat");
                continue;
            }
            if let Some(err) = &frame.err {
                return StreamOutcome::Failed(StreamError::Protocol {
                    message: format!("server reported stream error: {err}"),
                });
            }

            if let Some(reason) = self.deliver(frame, cancel).await {
                return StreamOutcome::Exit(reason);
            }
        }
    }

    /// Hand every selected event of `frame` to the handler
    async fn deliver(&mut self, frame: FeedFrame, cancel: &CancellationToken) -> Option<ExitReason> {
        self.stats.record_frame();
        let frame_index = frame.index;

        for event in frame.events {
            let index = event.index;
            if !self.config.topics.matches(&event) {
                self.stats.record_filtered();
                debug!(index, topic = %event.topic, "dropping event of unselected topic");
                continue;
            }

            let meta = Meta {
                index,
                generation: self.generation,
            };
            let delivered = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Some(ExitReason::Cancelled),
                delivered = self.handler.handle(event, meta) => delivered,
            };
            if delivered.is_err() {
                info!(index, "event handler closed");
                return Some(ExitReason::HandlerClosed);
            }

            self.stats.record_delivered();
            self.tracker.advance(index).await;
        }

        if frame_index > 0 {
            self.tracker.advance(frame_index).await;
            self.last_frame_index = Some(
                self.last_frame_index
                    .map_or(frame_index, |last| last.max(frame_index)),
            );
        }
        None
    }

    fn record_failed_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Position to subscribe from on the next connect
    fn resume_index(&self, start_index: u64) -> u64 {
        self.last_frame_index
            .map_or(start_index, |last| last.saturating_add(1))
    }

    fn transition(&mut self, next: ConsumerState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "consumer state change");
            self.state = next;
        }
    }
}
