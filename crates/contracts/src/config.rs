//! AppConfig - Config Loader output
//!
//! Describes the complete runtime configuration: checkpointing, feed
//! subscription, batching and provider routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Checkpoint settings
    #[validate(nested)]
    pub app: AppSection,

    /// Event feed subscription
    #[serde(default)]
    #[validate(nested)]
    pub stream: StreamSection,

    /// Batching and providers
    #[serde(default)]
    #[validate(nested)]
    pub sinks: SinksSection,
}

/// `[app]` section
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppSection {
    /// Directory holding the commit index file
    pub data_dir: PathBuf,

    /// How often the commit index is persisted
    #[serde(default = "default_commit_index_interval", with = "crate::duration")]
    pub commit_index_interval: Duration,
}

fn default_commit_index_interval() -> Duration {
    Duration::from_secs(5)
}

/// Where to start when no commit index has been persisted yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialPosition {
    /// Current tail of the feed
    #[default]
    Latest,
    /// Oldest event still retained by the orchestrator
    Earliest,
}

impl InitialPosition {
    /// Feed index requested for this position
    pub fn start_index(self) -> u64 {
        match self {
            Self::Latest => 0,
            Self::Earliest => 1,
        }
    }
}

/// `[stream]` section
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StreamSection {
    /// Nomad HTTP API address
    #[serde(default = "default_nomad_addr")]
    #[validate(length(min = 1))]
    pub nomad_addr: String,

    /// ACL token sent as `X-Nomad-Token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nomad_token: Option<String>,

    /// Namespace filter (`*` = all namespaces)
    #[serde(default = "default_namespace")]
    #[validate(length(min = 1))]
    pub namespace: String,

    /// Topic filter entries (`Topic` or `Topic:Key`); empty = all topics
    #[serde(default)]
    pub topics: Vec<String>,

    /// Consecutive failed reconnect attempts allowed; 0 = unlimited
    #[serde(default)]
    pub max_reconnect_attempts: u32,

    /// First reconnect backoff delay
    #[serde(default = "default_backoff_min", with = "crate::duration")]
    pub reconnect_backoff_min: Duration,

    /// Reconnect backoff ceiling
    #[serde(default = "default_backoff_max", with = "crate::duration")]
    pub reconnect_backoff_max: Duration,

    /// Start position when no commit index exists
    #[serde(default)]
    pub initial_position: InitialPosition,
}

impl StreamSection {
    /// Reconnect budget derived from `max_reconnect_attempts`
    pub fn reconnect_budget(&self) -> ReconnectBudget {
        ReconnectBudget::from_attempts(self.max_reconnect_attempts)
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            nomad_addr: default_nomad_addr(),
            nomad_token: None,
            namespace: default_namespace(),
            topics: Vec::new(),
            max_reconnect_attempts: 0,
            reconnect_backoff_min: default_backoff_min(),
            reconnect_backoff_max: default_backoff_max(),
            initial_position: InitialPosition::default(),
        }
    }
}

fn default_nomad_addr() -> String {
    "http://127.0.0.1:4646".to_string()
}

fn default_namespace() -> String {
    "*".to_string()
}

fn default_backoff_min() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(30)
}

/// How many consecutive reconnect attempts the consumer may make
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectBudget {
    /// Retry forever
    Unlimited,
    /// Give up after this many consecutive failed attempts
    Limited(NonZeroU32),
}

impl ReconnectBudget {
    /// `0` maps to `Unlimited`
    pub fn from_attempts(attempts: u32) -> Self {
        NonZeroU32::new(attempts).map_or(Self::Unlimited, Self::Limited)
    }

    /// Whether `attempts` failed attempts use up the budget
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Limited(max) => attempts > max.get(),
        }
    }
}

/// `[sinks]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SinksSection {
    /// Batching thresholds
    #[serde(default)]
    #[validate(nested)]
    pub batch: BatchConfig,

    /// Output routing
    #[serde(default)]
    #[validate(nested)]
    pub providers: Vec<ProviderConfig>,
}

/// `[sinks.batch]` section
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Max events per batch
    #[serde(default = "default_events_count")]
    #[validate(range(min = 1))]
    pub events_count: usize,

    /// Max time since the last flush before a pending batch is forced out
    #[serde(default = "default_idle_timeout", with = "crate::duration")]
    pub idle_timeout: Duration,

    /// Capacity of the inbound event queue
    #[serde(default = "default_queue_size")]
    #[validate(range(min = 1))]
    pub queue_size: usize,

    /// Upper bound on waiting for one provider to accept a batch
    #[serde(default = "default_push_timeout", with = "crate::duration")]
    pub push_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            events_count: default_events_count(),
            idle_timeout: default_idle_timeout(),
            queue_size: default_queue_size(),
            push_timeout: default_push_timeout(),
        }
    }
}

fn default_events_count() -> usize {
    100
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_queue_size() -> usize {
    1000
}

fn default_push_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Provider output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider name
    #[validate(length(min = 1))]
    pub name: String,

    /// Provider type
    pub provider_type: ProviderType,

    /// Batches buffered for this provider
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    16
}

/// Provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// Log output
    Log,
    /// JSON lines file output
    File,
    /// Loki-compatible HTTP push
    Http,
}
