//! 信号记录 - 每个被接受的结果值生成一条

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::Tier;
use super::predictor::PredictionResult;

/// Rare 级别附带的激励语（按秒轮换，纯装饰）
pub const MOTIVATIONAL_LINES: &[&str] = &[
    "💥 Today could be the day it turns around!",
    "🎯 Success is in the details. Stay focused!",
    "🚀 Whoever flies high is not afraid of the fall!",
    "📈 Persistence turns attempts into wins!",
    "🎲 The next flight could be the big one!",
];

/// 信号身份：(observed_at, value)，只用于抑制紧邻的重复发送
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub String);

impl AlertId {
    pub fn new(observed_at: &DateTime<Utc>, value: f64) -> Self {
        Self(format!("{}-{:.2}", observed_at.to_rfc3339(), value))
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 信号记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// 来源 feed 名称
    pub feed: String,
    /// 观测时间（UTC）
    pub observed_at: DateTime<Utc>,
    /// 来源本地时间 HH:MM:SS
    pub local_time: String,
    pub value: f64,
    pub tier: Tier,
    pub prediction: PredictionResult,
    /// Rare 时的激励语
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    pub id: AlertId,
}

/// 信号构建器
#[derive(Debug, Clone)]
pub struct AlertBuilder {
    feed: String,
    offset: FixedOffset,
}

impl AlertBuilder {
    pub fn new(feed: impl Into<String>, offset: FixedOffset) -> Self {
        Self {
            feed: feed.into(),
            offset,
        }
    }

    pub fn build(
        &self,
        value: f64,
        tier: Tier,
        prediction: PredictionResult,
        now_utc: DateTime<Utc>,
    ) -> AlertRecord {
        let now_local = now_utc.with_timezone(&self.offset);
        let annotation = (tier == Tier::Rare).then(|| motivational_line(now_local.second()));

        AlertRecord {
            feed: self.feed.clone(),
            observed_at: now_utc,
            local_time: now_local.format("%H:%M:%S").to_string(),
            value,
            tier,
            prediction: if prediction.expected {
                prediction
            } else {
                PredictionResult::none()
            },
            annotation,
            id: AlertId::new(&now_utc, value),
        }
    }
}

fn motivational_line(second: u32) -> String {
    MOTIVATIONAL_LINES[second as usize % MOTIVATIONAL_LINES.len()].to_string()
}
