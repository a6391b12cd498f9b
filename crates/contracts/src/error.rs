//! Layered error definitions
//!
//! Categorized by source: config / feed / checkpoint / provider

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Feed Errors =====
    /// Event feed connection error
    #[error("feed connection error: {message}")]
    FeedConnection { message: String },

    /// Malformed frame on the event feed
    #[error("feed protocol error: {message}")]
    FeedProtocol { message: String },

    // ===== Checkpoint Errors =====
    /// Commit index could not be read or written
    #[error("checkpoint error at '{path}': {message}")]
    Checkpoint { path: String, message: String },

    // ===== Provider Errors =====
    /// Provider push error
    #[error("provider '{provider}' push error: {message}")]
    ProviderPush { provider: String, message: String },

    /// Provider connection error
    #[error("provider '{provider}' connection error: {message}")]
    ProviderConnection { provider: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create checkpoint error
    pub fn checkpoint(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Checkpoint {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create provider push error
    pub fn provider_push(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderPush {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
