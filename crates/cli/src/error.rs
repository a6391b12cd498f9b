//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration load or validation error
    #[error("Configuration error: {0}")]
    Config(#[from] contracts::ContractError),

    /// Provider setup error
    #[error("Dispatcher setup failed: {0}")]
    Dispatcher(#[from] dispatcher::DispatcherError),

    /// Fatal stream consumer error
    #[error("Stream consumer failed: {0}")]
    Stream(#[from] stream::StreamError),

    /// A pipeline task did not finish cleanly
    #[error("Task '{component}' failed: {message}")]
    Task { component: String, message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn task(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Task {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Component name used in the fatal log line
    pub fn component(&self) -> &str {
        match self {
            Self::ConfigNotFound { .. } | Self::Config(_) => "config",
            Self::Dispatcher(_) => "sink_dispatcher",
            Self::Stream(_) => "stream_consumer",
            Self::Task { component, .. } => component,
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
