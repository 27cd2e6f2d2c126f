//! Crash Signal Monitor - 观察远端结果流，提取数值并分发分级信号

pub mod config;
pub mod error;
pub mod infra;
pub mod notification;
pub mod signal;
pub mod watcher;

pub use config::{ConfigSource, FlatConfig, MonitorConfig};
pub use error::{MonitorError, Result, TransportError};
pub use infra::{MonitorLease, Payload, PollTransport, PushTransport, Transport};
pub use notification::{AlertDispatcher, AlertFormatter, DispatchOutcome, JsonlLogSink, LogNotifier, Notifier, TelegramNotifier};
pub use signal::{AlertRecord, HeuristicPredictor, HistoryWindow, PatternExtractor, Thresholds, Tier};
pub use watcher::{BackoffPolicy, FeedMonitor, Monitor, MonitorHandle, MonitorSnapshot, MonitorState, Sampling};
