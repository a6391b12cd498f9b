//! # Stream
//!
//! Nomad event stream consumption and checkpointing.
//!
//! Responsibilities:
//! - Subscribe to the event feed (Nomad HTTP or mock)
//! - Decode NDJSON frames, skip heartbeats
//! - Deliver selected events to an `EventHandler`
//! - Persist the commit index and resume from it after restart
//! - Reconnect with exponential backoff within a bounded budget
//!
//! ## Usage Example
//!
//! ```ignore
//! use stream::{CommitIndexStore, CommitTracker, ConsumerConfig, NomadFeedClient, StreamConsumer};
//!
//! let client = NomadFeedClient::from_config(&config.stream)?;
//! let tracker = CommitTracker::new(
//!     CommitIndexStore::new(&config.app.data_dir),
//!     config.app.commit_index_interval,
//! );
//! let mut consumer = StreamConsumer::new(
//!     client,
//!     handler,
//!     tracker,
//!     ConsumerConfig::from_section(&config.stream)?,
//! );
//! let exit = consumer.run(cancel).await?;
//! ```

mod backoff;
mod client;
mod codec;
mod commit_index;
mod consumer;
mod error;
mod mock;
mod nomad;

// Re-exports
pub use backoff::Backoff;
pub use client::{FeedClient, FeedSubscription, LocalFeedSubscription, SubscribeRequest};
pub use codec::FrameDecoder;
pub use commit_index::{CommitIndexStore, CommitTracker, COMMIT_INDEX_FILE};
pub use consumer::{
    ConsumerConfig, ConsumerExit, ConsumerState, ConsumerStats, ConsumerStatsSnapshot,
    ExitReason, StreamConsumer,
};
pub use error::{Result, StreamError};
pub use mock::{MockFeed, MockSubscription, StreamEnd};
pub use nomad::{NomadFeedClient, NomadSubscription, DEFAULT_READ_IDLE_TIMEOUT};
