//! Monitor loop - reconnect/backoff state machine per feed, single-instance lease

mod backoff;
mod feed;
mod monitor;

pub use backoff::BackoffPolicy;
pub use feed::{FeedMonitor, MonitorSnapshot, MonitorState, PayloadOutcome, Sampling};
pub use monitor::{Monitor, MonitorHandle};
