//! 信号处理核心 - 提取、历史窗口、启发式提示、分级与信号构建

pub mod alert;
pub mod classifier;
pub mod extractor;
pub mod history;
pub mod predictor;

pub use alert::{AlertBuilder, AlertId, AlertRecord, MOTIVATIONAL_LINES};
pub use classifier::{Thresholds, Tier};
pub use extractor::{default_rules, extract, parse_outcome, select_rule, Extraction, ExtractionRule, PatternExtractor, RuleKind};
pub use history::HistoryWindow;
pub use predictor::{HeuristicPredictor, PredictionResult};
