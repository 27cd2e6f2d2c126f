//! 单个 feed 的监控循环
//!
//! 状态机：Idle -> Connecting -> Streaming -> Backoff -> Connecting ... -> ShuttingDown。
//! 每个 feed 独占自己的提取器、历史窗口和分发器（上一条身份），
//! 只有 lease、通知器和日志在 feed 之间共享。

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use crate::error::MonitorError;
use crate::infra::transport::{Payload, Transport};
use crate::notification::{AlertDispatcher, DispatchOutcome};
use crate::signal::{AlertBuilder, Extraction, HeuristicPredictor, HistoryWindow, PatternExtractor, Thresholds};

/// 监控循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    Idle,
    Connecting,
    Streaming,
    Backoff,
    ShuttingDown,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorState::Idle => "idle",
            MonitorState::Connecting => "connecting",
            MonitorState::Streaming => "streaming",
            MonitorState::Backoff => "backoff",
            MonitorState::ShuttingDown => "shutting_down",
        }
    }
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 一个 payload 中哪些值进入历史窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampling {
    /// 只取最后一个匹配（轮询文档包含整个历史面板）
    Newest,
    /// 按顺序取全部（推送消息只含新的结果）
    Each,
}

/// 只读快照，供外部命令层查询
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub feed: String,
    pub state: MonitorState,
    pub window: Vec<f64>,
    pub last_id: Option<String>,
    pub active_rule: Option<String>,
    pub backoff_cycles: u64,
    pub alerts_dispatched: u64,
}

/// `handle_payload` 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadOutcome {
    /// 空 payload
    Empty,
    /// 没有规则匹配；`limit_reached` 表示连续失败次数达到上限
    Stalled { consecutive: u32, limit_reached: bool },
    /// 提取成功
    Processed { accepted: usize, dispatched: usize },
}

/// 单 feed 监控器
pub struct FeedMonitor {
    name: String,
    transport: Box<dyn Transport>,
    extractor: PatternExtractor,
    history: HistoryWindow,
    predictor: HeuristicPredictor,
    thresholds: Thresholds,
    builder: AlertBuilder,
    dispatcher: AlertDispatcher,
    backoff: BackoffPolicy,
    sampling: Sampling,
    /// 连续无匹配的上限，0 表示不限
    stall_limit: u32,
    stalled: u32,
    state: MonitorState,
    backoff_cycles: u64,
    alerts_dispatched: u64,
    snapshot_tx: watch::Sender<MonitorSnapshot>,
}

impl FeedMonitor {
    pub fn new(name: impl Into<String>, transport: Box<dyn Transport>, dispatcher: AlertDispatcher) -> Self {
        let name = name.into();
        let history = HistoryWindow::default();
        let (snapshot_tx, _) = watch::channel(MonitorSnapshot {
            feed: name.clone(),
            state: MonitorState::Idle,
            window: Vec::new(),
            last_id: None,
            active_rule: None,
            backoff_cycles: 0,
            alerts_dispatched: 0,
        });

        Self {
            builder: AlertBuilder::new(name.clone(), Utc.fix()),
            name,
            transport,
            extractor: PatternExtractor::new(),
            history,
            predictor: HeuristicPredictor::default(),
            thresholds: Thresholds::default(),
            dispatcher,
            backoff: BackoffPolicy::default(),
            sampling: Sampling::Each,
            stall_limit: 20,
            stalled: 0,
            state: MonitorState::Idle,
            backoff_cycles: 0,
            alerts_dispatched: 0,
            snapshot_tx,
        }
    }

    pub fn with_extractor(mut self, extractor: PatternExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = HistoryWindow::new(capacity);
        self
    }

    pub fn with_predictor(mut self, predictor: HeuristicPredictor) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// 信号本地时间使用的时区偏移
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.builder = AlertBuilder::new(self.name.clone(), offset);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_stall_limit(mut self, stall_limit: u32) -> Self {
        self.stall_limit = stall_limit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// 订阅快照
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// 当前快照
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            feed: self.name.clone(),
            state: self.state,
            window: self.history.snapshot(),
            last_id: self.dispatcher.last_id().map(|id| id.0.clone()),
            active_rule: self.extractor.active_rule().map(|r| r.label.clone()),
            backoff_cycles: self.backoff_cycles,
            alerts_dispatched: self.alerts_dispatched,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn set_state(&mut self, state: MonitorState) {
        if self.state != state {
            debug!(feed = %self.name, from = %self.state, to = %state, "Feed state changed");
            self.state = state;
        }
        self.publish();
    }

    /// 处理一个 payload：提取 -> 历史窗口 -> 预测/分级/构建 -> 分发
    pub async fn handle_payload(&mut self, payload: &Payload) -> PayloadOutcome {
        let values = match self.extractor.process(&payload.body) {
            Extraction::Empty => {
                debug!(feed = %self.name, "Empty payload");
                return PayloadOutcome::Empty;
            }
            Extraction::Stalled => {
                self.stalled = self.stalled.saturating_add(1);
                let limit_reached = self.stall_limit > 0 && self.stalled >= self.stall_limit;
                warn!(
                    feed = %self.name,
                    consecutive = self.stalled,
                    limit = self.stall_limit,
                    error = %MonitorError::ExtractionStalled,
                    "Extraction stalled"
                );
                let consecutive = self.stalled;
                if limit_reached {
                    self.stalled = 0;
                }
                return PayloadOutcome::Stalled {
                    consecutive,
                    limit_reached,
                };
            }
            Extraction::Values(values) => values,
        };
        self.stalled = 0;

        let sampled: Vec<f64> = match self.sampling {
            Sampling::Newest => values.last().copied().into_iter().collect(),
            Sampling::Each => values,
        };

        let mut accepted = 0;
        let mut dispatched = 0;
        for value in sampled {
            if let Some(outcome) = self.observe(value, payload.received_at).await {
                accepted += 1;
                if matches!(outcome, DispatchOutcome::Delivered { .. }) {
                    dispatched += 1;
                }
            }
        }

        self.publish();
        PayloadOutcome::Processed { accepted, dispatched }
    }

    /// 单个值；被历史窗口拒绝时返回 None
    async fn observe(&mut self, value: f64, observed_at: DateTime<Utc>) -> Option<DispatchOutcome> {
        let (accepted, window) = self.history.push(value);
        if !accepted {
            debug!(feed = %self.name, value, "Unchanged value ignored");
            return None;
        }

        let prediction = self.predictor.predict(&window);
        let tier = self.thresholds.classify(value);
        info!(
            feed = %self.name,
            value,
            tier = %tier,
            expected = prediction.expected,
            confidence = prediction.confidence,
            "New value"
        );

        let alert = self.builder.build(value, tier, prediction, observed_at);
        let outcome = self.dispatcher.dispatch(&alert).await;
        if matches!(outcome, DispatchOutcome::Delivered { .. }) {
            self.alerts_dispatched += 1;
        }
        Some(outcome)
    }

    /// 进入 Backoff 并等待；等待期间收到关闭请求返回 false
    async fn back_off(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let delay = self.backoff.next_delay();
        self.backoff_cycles += 1;
        self.set_state(MonitorState::Backoff);
        warn!(
            feed = %self.name,
            attempt = self.backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "Backing off"
        );

        tokio::select! {
            _ = shutdown.changed() => false,
            _ = sleep(delay) => {
                self.set_state(MonitorState::Connecting);
                info!(feed = %self.name, "Reconnecting");
                true
            }
        }
    }

    /// 运行直到收到关闭请求；返回最终快照
    ///
    /// 关闭请求只在挂起点（等待 payload、等待 backoff）被观察到，
    /// 正在进行的持久化和转发会先完成。
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> MonitorSnapshot {
        info!(feed = %self.name, transport = %self.transport.describe(), "Feed starting");
        self.set_state(MonitorState::Connecting);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = self.transport.next_payload() => next,
            };

            match next {
                Ok(payload) => {
                    if self.state != MonitorState::Streaming {
                        info!(feed = %self.name, "Streaming");
                        self.set_state(MonitorState::Streaming);
                    }
                    self.backoff.reset();

                    if let PayloadOutcome::Stalled { limit_reached: true, .. } = self.handle_payload(&payload).await {
                        warn!(feed = %self.name, "Too many stalled payloads, reconnecting");
                        self.transport.close().await;
                        if !self.back_off(&mut shutdown).await {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(feed = %self.name, error = %e, "Transport error");
                    if !self.back_off(&mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(feed = %self.name, "Shutting down");
        self.set_state(MonitorState::ShuttingDown);
        self.transport.close().await;
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::notification::{AlertFormatter, DeliveryReport, Destination, LogSink, Notifier, RenderedAlert, SendResult};
    use crate::signal::AlertRecord;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// 按脚本返回结果，脚本耗尽后请求关闭并永久挂起
    struct ScriptedTransport {
        script: VecDeque<Result<Payload, TransportError>>,
        done: Option<watch::Sender<bool>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn next_payload(&mut self) -> Result<Payload, TransportError> {
            if let Some(next) = self.script.pop_front() {
                return next;
            }
            if let Some(tx) = self.done.take() {
                let _ = tx.send(true);
            }
            std::future::pending().await
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        fn name(&self) -> &str {
            "counting"
        }

        async fn notify(&self, destinations: &[Destination], _alert: &RenderedAlert) -> Vec<DeliveryReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            destinations
                .iter()
                .map(|d| DeliveryReport {
                    destination: d.clone(),
                    result: SendResult::Sent,
                })
                .collect()
        }
    }

    #[derive(Default)]
    struct MemorySink {
        records: Mutex<Vec<AlertRecord>>,
    }

    impl LogSink for MemorySink {
        fn append(&self, record: &AlertRecord) -> anyhow::Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn feed(transport: ScriptedTransport, sink: Arc<MemorySink>, notifier: Arc<CountingNotifier>) -> FeedMonitor {
        let dispatcher = AlertDispatcher::new(
            sink,
            notifier,
            vec![Destination::new("chat")],
            AlertFormatter::new("Aviator"),
        );
        FeedMonitor::new("test", Box::new(transport), dispatcher)
            .with_backoff(BackoffPolicy::new(Duration::from_millis(5), Duration::from_millis(20)))
    }

    fn scripted(script: Vec<Result<Payload, TransportError>>) -> (ScriptedTransport, watch::Receiver<bool>, Arc<AtomicBool>) {
        let (tx, rx) = watch::channel(false);
        let closed = Arc::new(AtomicBool::new(false));
        let transport = ScriptedTransport {
            script: script.into(),
            done: Some(tx),
            closed: closed.clone(),
        };
        (transport, rx, closed)
    }

    #[tokio::test]
    async fn test_newest_sampling_takes_last_value() {
        let (transport, _rx, _) = scripted(vec![]);
        let sink = Arc::new(MemorySink::default());
        let mut monitor = feed(transport, sink.clone(), Arc::default()).with_sampling(Sampling::Newest);

        let outcome = monitor
            .handle_payload(&Payload::new("<span>1,20x</span><span>3,60x</span>"))
            .await;

        assert_eq!(outcome, PayloadOutcome::Processed { accepted: 1, dispatched: 1 });
        assert_eq!(monitor.snapshot().window, vec![3.6]);
        assert_eq!(sink.records.lock().unwrap()[0].value, 3.6);
    }

    #[tokio::test]
    async fn test_each_sampling_and_unchanged_value() {
        let (transport, _rx, _) = scripted(vec![]);
        let notifier = Arc::new(CountingNotifier::default());
        let mut monitor = feed(transport, Arc::default(), notifier.clone());

        monitor.handle_payload(&Payload::new(r#"{"crash_point": "1.50"}"#)).await;
        monitor.handle_payload(&Payload::new(r#"{"crash_point": "1.80"}"#)).await;
        let outcome = monitor.handle_payload(&Payload::new(r#"{"crash_point": "1.80"}"#)).await;

        assert_eq!(outcome, PayloadOutcome::Processed { accepted: 0, dispatched: 0 });
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.window, vec![1.5, 1.8]);
        assert_eq!(snapshot.alerts_dispatched, 2);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
        assert!(snapshot.last_id.unwrap().ends_with("-1.80"));
    }

    #[tokio::test]
    async fn test_stall_does_not_touch_history() {
        let (transport, _rx, _) = scripted(vec![]);
        let mut monitor = feed(transport, Arc::default(), Arc::default()).with_stall_limit(2);

        monitor.handle_payload(&Payload::new("<b>2.5x</b>")).await;
        let first = monitor.handle_payload(&Payload::new("<p>loading</p>")).await;
        let second = monitor.handle_payload(&Payload::new("<p>loading</p>")).await;

        assert_eq!(first, PayloadOutcome::Stalled { consecutive: 1, limit_reached: false });
        assert_eq!(second, PayloadOutcome::Stalled { consecutive: 2, limit_reached: true });
        assert_eq!(monitor.snapshot().window, vec![2.5]);
        assert_eq!(monitor.handle_payload(&Payload::new("  ")).await, PayloadOutcome::Empty);
    }

    #[tokio::test]
    async fn test_run_backs_off_and_recovers() {
        let (transport, rx, closed) = scripted(vec![
            Err(TransportError::Status(502)),
            Err(TransportError::Closed("reset".to_string())),
            Ok(Payload::new("<b>4.20x</b>")),
        ]);
        let sink = Arc::new(MemorySink::default());
        let monitor = feed(transport, sink.clone(), Arc::default());
        let snapshots = monitor.subscribe();

        let last = tokio::time::timeout(Duration::from_secs(5), monitor.run(rx))
            .await
            .unwrap();

        assert_eq!(last.state, MonitorState::ShuttingDown);
        assert_eq!(last.backoff_cycles, 2);
        assert_eq!(last.window, vec![4.2]);
        assert_eq!(snapshots.borrow().state, MonitorState::ShuttingDown);
        assert_eq!(sink.records.lock().unwrap().len(), 1);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let (transport, _rx, closed) = scripted(vec![Ok(Payload::new("<b>2x</b>"))]);
        let (_tx, rx) = watch::channel(true);
        let last = feed(transport, Arc::default(), Arc::default()).run(rx).await;

        assert!(last.window.is_empty());
        assert!(closed.load(Ordering::SeqCst));
    }
}
