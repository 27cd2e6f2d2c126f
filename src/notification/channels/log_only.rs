//! 日志渠道 - 只把信号写入 tracing 日志（未配置 token 或 dry-run 时使用）

use async_trait::async_trait;
use tracing::info;

use crate::notification::channel::{DeliveryReport, Destination, Notifier, RenderedAlert, SendResult};

/// 日志通知器
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, destinations: &[Destination], alert: &RenderedAlert) -> Vec<DeliveryReport> {
        info!(
            channel = "log",
            destinations = destinations.len(),
            summary = %truncate_summary(&alert.text, 100),
            "Alert rendered (not forwarded)"
        );

        destinations
            .iter()
            .map(|d| DeliveryReport {
                destination: d.clone(),
                result: SendResult::Skipped("log-only notifier".to_string()),
            })
            .collect()
    }
}

/// 截断摘要到指定字符数
fn truncate_summary(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
