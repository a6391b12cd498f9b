//! Stream 错误类型

use std::path::PathBuf;

use thiserror::Error;

/// Stream 错误
#[derive(Debug, Error)]
pub enum StreamError {
    /// 无法建立订阅或读取连接失败
    #[error("failed to connect to event feed: {message}")]
    Connect {
        /// 错误消息
        message: String,
    },

    /// 帧格式错误或服务端上报的流错误
    #[error("event feed protocol error: {message}")]
    Protocol {
        /// 错误消息
        message: String,
    },

    /// 服务端关闭了事件流
    #[error("event feed closed by server")]
    FeedClosed,

    /// Commit index 读写失败
    #[error("checkpoint error at '{}': {message}", path.display())]
    Checkpoint {
        /// 文件路径
        path: PathBuf,
        /// 错误消息
        message: String,
    },

    /// 重连次数耗尽
    #[error("reconnect budget exhausted after {attempts} consecutive failures: {last_error}")]
    ReconnectBudgetExhausted {
        /// 连续失败次数
        attempts: u32,
        /// 最后一次失败原因
        last_error: Box<StreamError>,
    },
}

impl StreamError {
    /// 可通过重连恢复的错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Protocol { .. } | Self::FeedClosed
        )
    }

    pub(crate) fn checkpoint(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Checkpoint {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Stream Result 类型别名
pub type Result<T> = std::result::Result<T, StreamError>;
