//! Mock 事件流
//!
//! 用于无 Nomad 环境的测试。每次 `subscribe` 消费一条预设连接脚本。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use contracts::FeedFrame;
use tracing::debug;

use crate::client::{FeedClient, FeedSubscription, SubscribeRequest};
use crate::error::{Result, StreamError};

/// 连接脚本结束方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// 服务端正常关闭
    Close,
    /// 读取失败
    Error(String),
    /// 永不结束 (等待取消)
    Pending,
}

#[derive(Debug, Clone)]
enum ScriptedConnection {
    Refused(String),
    Stream { frames: Vec<FeedFrame>, end: StreamEnd },
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<ScriptedConnection>,
    requests: Vec<SubscribeRequest>,
    client_side_only: bool,
}

/// Mock 事件流客户端
///
/// 默认模拟服务端行为：按 `start_index` 跳过旧帧、按 topic 过滤事件。
/// 脚本耗尽后的订阅请求全部被拒绝。
#[derive(Debug, Clone, Default)]
pub struct MockFeed {
    state: Arc<Mutex<MockState>>,
}

impl MockFeed {
    /// 创建空脚本
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一次被拒绝的连接
    pub fn refuse(self, message: impl Into<String>) -> Self {
        self.push(ScriptedConnection::Refused(message.into()));
        self
    }

    /// 追加一次成功连接
    pub fn stream(self, frames: Vec<FeedFrame>, end: StreamEnd) -> Self {
        self.push(ScriptedConnection::Stream { frames, end });
        self
    }

    /// 关闭服务端 topic 过滤，所有事件原样下发
    pub fn without_server_filter(self) -> Self {
        self.with_state(|state| state.client_side_only = true);
        self
    }

    /// 已收到的订阅请求
    pub fn requests(&self) -> Vec<SubscribeRequest> {
        self.with_state(|state| state.requests.clone())
    }

    /// 剩余脚本数量
    pub fn remaining(&self) -> usize {
        self.with_state(|state| state.script.len())
    }

    fn push(&self, connection: ScriptedConnection) {
        self.with_state(|state| state.script.push_back(connection));
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl FeedClient for MockFeed {
    type Subscription = MockSubscription;

    async fn subscribe(&self, request: &SubscribeRequest) -> Result<MockSubscription> {
        let (connection, client_side_only) = self.with_state(|state| {
            state.requests.push(request.clone());
            (state.script.pop_front(), state.client_side_only)
        });

        match connection {
            None => Err(StreamError::Connect {
                message: "mock feed script exhausted".to_string(),
            }),
            Some(ScriptedConnection::Refused(message)) => Err(StreamError::Connect { message }),
            Some(ScriptedConnection::Stream { frames, end }) => {
                let frames: VecDeque<FeedFrame> = frames
                    .into_iter()
                    .filter(|frame| frame.is_heartbeat() || frame.index >= request.start_index)
                    .map(|mut frame| {
                        if !client_side_only {
                            frame.events.retain(|event| request.topics.matches(event));
                        }
                        frame
                    })
                    .collect();
                debug!(
                    start_index = request.start_index,
                    frames = frames.len(),
                    "mock subscription opened"
                );
                Ok(MockSubscription { frames, end })
            }
        }
    }
}

/// Mock 订阅
#[derive(Debug)]
pub struct MockSubscription {
    frames: VecDeque<FeedFrame>,
    end: StreamEnd,
}

impl FeedSubscription for MockSubscription {
    async fn next_frame(&mut self) -> Result<Option<FeedFrame>> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        match &self.end {
            StreamEnd::Close => Ok(None),
            StreamEnd::Error(message) => Err(StreamError::Connect {
                message: message.clone(),
            }),
            StreamEnd::Pending => std::future::pending().await,
        }
    }
}
