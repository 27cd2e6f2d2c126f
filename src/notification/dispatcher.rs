//! 信号分发器 - 去重、持久化、转发

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::channel::{DeliveryReport, Destination, Notifier, SendResult};
use super::formatter::AlertFormatter;
use super::store::LogSink;
use crate::signal::{AlertId, AlertRecord};

/// 分发结果
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// 已处理（持久化 + 转发）
    Delivered {
        /// 持久化是否成功（失败只记日志）
        persisted: bool,
        /// 每个目标的转发结果
        reports: Vec<DeliveryReport>,
    },
    /// 与上一条身份相同，跳过
    DuplicateSuppressed,
}

/// 信号分发器
///
/// 每个 feed 持有自己的分发器（独立的上一条身份），
/// 日志和通知器可以在多个 feed 之间共享。
pub struct AlertDispatcher {
    sink: Arc<dyn LogSink>,
    notifier: Arc<dyn Notifier>,
    destinations: Vec<Destination>,
    formatter: AlertFormatter,
    last_id: Option<AlertId>,
    dry_run: bool,
}

impl AlertDispatcher {
    pub fn new(
        sink: Arc<dyn LogSink>,
        notifier: Arc<dyn Notifier>,
        destinations: Vec<Destination>,
        formatter: AlertFormatter,
    ) -> Self {
        Self {
            sink,
            notifier,
            destinations,
            formatter,
            last_id: None,
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式（仍然持久化，不转发）
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 上一条已分发信号的身份
    pub fn last_id(&self) -> Option<&AlertId> {
        self.last_id.as_ref()
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    /// 分发信号：先持久化，再转发到所有目标
    pub async fn dispatch(&mut self, alert: &AlertRecord) -> DispatchOutcome {
        if self.last_id.as_ref() == Some(&alert.id) {
            debug!(id = %alert.id, "Duplicate alert suppressed");
            return DispatchOutcome::DuplicateSuppressed;
        }
        self.last_id = Some(alert.id.clone());

        let persisted = match self.sink.append(alert) {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %alert.id, error = %e, "Failed to persist alert");
                false
            }
        };

        let reports = if self.dry_run {
            self.destinations
                .iter()
                .map(|d| {
                    eprintln!("[DRY-RUN] Would send alert {} to {}", alert.id, d);
                    DeliveryReport {
                        destination: d.clone(),
                        result: SendResult::Skipped("dry-run".to_string()),
                    }
                })
                .collect()
        } else {
            let rendered = self.formatter.render(alert);
            self.notifier.notify(&self.destinations, &rendered).await
        };

        for report in reports.iter().filter(|r| r.result.is_failed()) {
            warn!(
                notifier = self.notifier.name(),
                destination = %report.destination,
                result = ?report.result,
                "Alert forward failed"
            );
        }

        info!(
            id = %alert.id,
            value = alert.value,
            tier = %alert.tier,
            persisted,
            destinations = reports.len(),
            failed = reports.iter().filter(|r| r.result.is_failed()).count(),
            "Alert dispatched"
        );

        DispatchOutcome::Delivered { persisted, reports }
    }
}
