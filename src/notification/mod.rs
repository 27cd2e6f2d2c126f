//! 通知层 - 信号渲染、持久化与转发
//!
//! # 设计目标
//! 1. 统一接口：所有渠道实现 `Notifier` trait
//! 2. 先持久化再转发：日志失败不阻止转发，转发失败不阻止其他目标
//! 3. 去重只看上一条信号的身份 (observed_at, value)
//!
//! # 使用示例
//! ```ignore
//! use crash_signal_monitor::notification::{AlertDispatcher, AlertFormatter, JsonlLogSink, LogNotifier};
//!
//! let mut dispatcher = AlertDispatcher::new(
//!     Arc::new(JsonlLogSink::new("signals.jsonl")),
//!     Arc::new(LogNotifier::new()),
//!     vec![Destination::new("-100123")],
//!     AlertFormatter::new("Aviator"),
//! );
//! dispatcher.dispatch(&alert).await;
//! ```

pub mod channel;
pub mod channels;
pub mod dispatcher;
pub mod formatter;
pub mod store;

pub use channel::{DeliveryReport, Destination, Notifier, RenderedAlert, SendResult};
pub use channels::{LogNotifier, TelegramConfig, TelegramNotifier};
pub use dispatcher::{AlertDispatcher, DispatchOutcome};
pub use formatter::AlertFormatter;
pub use store::{JsonlLogSink, LogSink};
