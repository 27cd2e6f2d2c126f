//! 错误类型
//!
//! 只有 `LeaseConflict` 会终止监控循环；其余错误都在本地吸收，只体现在日志里。

use std::time::Duration;

/// Transport 层错误（可恢复，触发 Backoff）
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 建立连接失败
    #[error("transport: connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// 远端关闭连接或流结束
    #[error("transport: connection closed: {0}")]
    Closed(String),

    /// HTTP 非 2xx 响应
    #[error("transport: unexpected HTTP status {0}")]
    Status(u16),

    /// 请求超时
    #[error("transport: request timed out after {0:?}")]
    Timeout(Duration),

    /// 会话凭证过期，已通知 CredentialProvider 刷新
    #[error("transport: credentials expired")]
    CredentialsExpired,

    /// 其他 I/O 或协议错误
    #[error("transport: {0}")]
    Io(String),
}

/// 监控循环错误
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// 另一个实例持有 lease（启动时致命）
    #[error("another monitor instance holds the lease at {path} (created {created_at})")]
    LeaseConflict { path: String, created_at: String },

    /// 没有任何提取规则匹配当前 payload（可恢复）
    ///
    /// 循环内以 `Extraction::Stalled` 传递，这里只用于日志中的错误描述
    #[error("no extraction rule matches the current payload")]
    ExtractionStalled,

    /// 配置无效
    #[error("invalid configuration: {0}")]
    Config(String),

    /// lease 文件读写失败
    #[error("lease file error: {0}")]
    Lease(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
