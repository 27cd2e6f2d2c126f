//! 通知渠道 trait 定义

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 通知目标（如 Telegram chat id）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(pub String);

impl Destination {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 渲染后的信号（与具体渠道无关）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedAlert {
    /// 正文 / 图片说明（HTML）
    pub text: String,
    /// 可选图片 URL
    pub image_url: Option<String>,
    /// 可选链接按钮 (label, url)
    pub link: Option<(String, String)>,
}

impl RenderedAlert {
    /// 创建纯文本消息
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_url: None,
            link: None,
        }
    }

    /// 设置图片
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// 设置链接按钮
    pub fn with_link(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.link = Some((label.into(), url.into()));
        self
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（dry-run 等）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

impl SendResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, SendResult::Failed(_))
    }
}

/// 单个目标的发送报告
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub destination: Destination,
    pub result: SendResult,
}

/// 通知器 trait
///
/// 实现必须尝试所有目标，单个目标失败不能中断其余目标。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 名称（用于日志）
    fn name(&self) -> &str;

    /// 发送到所有目标，按目标返回结果
    async fn notify(&self, destinations: &[Destination], alert: &RenderedAlert) -> Vec<DeliveryReport>;
}
