//! Monitor - 在一个 lease 下运行所有 feed

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{info, warn};

use super::feed::{FeedMonitor, MonitorSnapshot};
use crate::error::Result;
use crate::infra::MonitorLease;

/// 外部命令层使用的只读句柄
///
/// 除了请求优雅关闭，不提供任何修改操作。
#[derive(Clone)]
pub struct MonitorHandle {
    shutdown: Arc<watch::Sender<bool>>,
    snapshots: Vec<watch::Receiver<MonitorSnapshot>>,
}

impl MonitorHandle {
    /// 所有 feed 的当前快照
    pub fn snapshot(&self) -> Vec<MonitorSnapshot> {
        self.snapshots.iter().map(|rx| rx.borrow().clone()).collect()
    }

    /// 请求优雅关闭；各 feed 在下一个挂起点退出
    pub fn request_shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.send_replace(true);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// 监控器：持有 lease 路径和所有 feed
pub struct Monitor {
    lease_path: PathBuf,
    feeds: Vec<FeedMonitor>,
    shutdown: Arc<watch::Sender<bool>>,
    snapshots: Vec<watch::Receiver<MonitorSnapshot>>,
}

impl Monitor {
    pub fn new(lease_path: impl Into<PathBuf>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            lease_path: lease_path.into(),
            feeds: Vec::new(),
            shutdown: Arc::new(shutdown),
            snapshots: Vec::new(),
        }
    }

    pub fn with_feed(mut self, feed: FeedMonitor) -> Self {
        self.add_feed(feed);
        self
    }

    pub fn add_feed(&mut self, feed: FeedMonitor) {
        self.snapshots.push(feed.subscribe());
        self.feeds.push(feed);
    }

    pub fn lease_path(&self) -> &Path {
        &self.lease_path
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// 句柄（在 `run` 之前获取）
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            shutdown: self.shutdown.clone(),
            snapshots: self.snapshots.clone(),
        }
    }

    /// 获取 lease 后并发运行所有 feed，直到收到关闭请求
    ///
    /// lease 已被持有时立即返回 `LeaseConflict`，不会启动任何 feed。
    pub async fn run(self) -> Result<Vec<MonitorSnapshot>> {
        let lease = MonitorLease::acquire(&self.lease_path)?;
        info!(
            lease = %lease.path().display(),
            feeds = self.feeds.len(),
            "Monitor started"
        );

        let shutdown = self.shutdown.subscribe();
        let runs = self.feeds.into_iter().map(|feed| feed.run(shutdown.clone()));
        let finals = join_all(runs).await;

        if let Err(e) = lease.release() {
            warn!(error = %e, "Failed to release monitor lease");
        }
        info!("Monitor stopped");
        Ok(finals)
    }
}
