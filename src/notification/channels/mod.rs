//! 具体渠道实现

pub mod log_only;
pub mod telegram;

pub use log_only::LogNotifier;
pub use telegram::{TelegramConfig, TelegramNotifier};
