//! Transport 层 - 从远端获取原始 payload
//!
//! 两种实现：
//! - `PushTransport`：一条长连接（WebSocket），每条入站消息是一个 payload
//! - `PollTransport`：固定间隔的 HTTP 请求，整个响应体是一个 payload

pub mod poll;
pub mod push;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use crate::error::TransportError;
pub use poll::{PollConfig, PollTransport};
pub use push::PushTransport;

/// 原始 payload
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl Payload {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            received_at: Utc::now(),
        }
    }
}

/// Transport trait
///
/// `next_payload` 挂起直到拿到新的 payload 或连接/请求失败。
/// 除了自己的连接句柄，不修改任何共享状态。
#[async_trait]
pub trait Transport: Send {
    /// 描述（用于日志）
    fn describe(&self) -> String;

    async fn next_payload(&mut self) -> Result<Payload, TransportError>;

    /// 关闭连接（幂等）
    async fn close(&mut self);
}
