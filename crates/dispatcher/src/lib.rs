//! # Dispatcher
//!
//! 事件批处理与分发模块。
//!
//! 负责：
//! - 有界事件队列，连接 `StreamConsumer` 与批处理
//! - `BatchWorker` 按数量 / 空闲超时 / 关闭三种条件 flush
//! - Fan-out 到多个 provider，隔离失败和慢 provider

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod providers;
pub mod queue;
pub mod worker;

pub use contracts::{Event, Provider};
pub use dispatcher::{
    DispatchReport, DispatcherBuilder, SinkDispatcher, create_dispatcher, create_provider_handle,
};
pub use error::DispatcherError;
pub use handle::{ProviderHandle, PushOutcome};
pub use metrics::{MetricsSnapshot, ProviderMetrics};
pub use providers::{FileProvider, HttpProvider, HttpProviderConfig, LogProvider};
pub use queue::{QueueHandler, event_queue};
pub use worker::{BatchWorker, FlushReason, WorkerSummary};
