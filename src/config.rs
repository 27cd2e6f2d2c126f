//! 配置 - 扁平 key/value 配置源与类型化的监控配置
//!
//! 核心只通过 `ConfigSource` 读取配置；文件和环境变量由二进制入口负责加载。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::FixedOffset;

use crate::error::MonitorError;
use crate::infra::transport::poll::DEFAULT_USER_AGENT;
use crate::notification::Destination;
use crate::signal::Thresholds;

/// 扁平配置源
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// 内存中的扁平配置
#[derive(Debug, Clone, Default)]
pub struct FlatConfig {
    values: HashMap<String, String>,
}

impl FlatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// 从扁平 JSON 对象加载；非字符串值按 JSON 文本保存
    pub fn from_json_str(content: &str) -> Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(content).context("config must be a flat JSON object")?;

        let values = map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let s = match v {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Array(items) => items
                        .iter()
                        .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                        .collect::<Vec<_>>()
                        .join(","),
                    other => other.to_string(),
                };
                (k, s)
            })
            .collect();

        Ok(Self { values })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&content)
    }

    /// 从环境变量加载：`CSM_POLL_URL` -> `poll.url`（第一个 `_` 变成 `.`）
    pub fn from_env_vars<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let values = vars
            .into_iter()
            .filter_map(|(k, v)| {
                let rest = k.strip_prefix(prefix)?.to_lowercase();
                let key = match rest.split_once('_') {
                    Some((section, name)) => format!("{}.{}", section, name),
                    None => rest,
                };
                Some((key, v))
            })
            .collect();
        Self { values }
    }

    /// 合并，`other` 中的值覆盖当前值
    pub fn merge(mut self, other: FlatConfig) -> Self {
        self.values.extend(other.values);
        self
    }
}

impl ConfigSource for FlatConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// 默认数据目录
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("crash-signal-monitor")
}

/// 日志和 lease 文件位置（不需要 feed 配置，`signals` / `lease` 命令也使用）
#[derive(Debug, Clone, PartialEq)]
pub struct StorePaths {
    pub signals: PathBuf,
    pub lease: PathBuf,
}

impl StorePaths {
    pub fn from_source(source: &dyn ConfigSource) -> Self {
        let data = data_dir();
        Self {
            signals: source
                .get("store.signals_path")
                .map(PathBuf::from)
                .unwrap_or_else(|| data.join("signals.jsonl")),
            lease: source
                .get("store.lease_path")
                .map(PathBuf::from)
                .unwrap_or_else(|| data.join("monitor.lock")),
        }
    }
}

/// 轮询 feed 设置
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub url: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub user_agent: String,
    pub cookie_file: Option<PathBuf>,
    pub expired_marker: Option<String>,
}

/// 推送 feed 设置
#[derive(Debug, Clone)]
pub struct PushSettings {
    pub url: String,
    pub idle_timeout: Duration,
}

/// 类型化的监控配置
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll: Option<PollSettings>,
    pub push: Option<PushSettings>,
    pub history_capacity: usize,
    pub thresholds: Thresholds,
    pub low_ceiling: f64,
    pub stall_limit: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub telegram_token: Option<String>,
    pub telegram_api_base: String,
    pub destinations: Vec<Destination>,
    pub game_name: String,
    pub utc_offset: FixedOffset,
    pub banner_link: Option<String>,
    pub banner_image: Option<String>,
    pub store: StorePaths,
    pub archive_dir: Option<PathBuf>,
}

impl MonitorConfig {
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, MonitorError> {
        let poll = match source.get("poll.url") {
            Some(url) => {
                let interval = Duration::from_secs(parse_or(source, "poll.interval_secs", 10u64)?.max(1));
                let timeout = Duration::from_secs(parse_or(source, "poll.timeout_secs", 10u64)?);
                if timeout < interval {
                    tracing::warn!(
                        timeout_secs = timeout.as_secs(),
                        interval_secs = interval.as_secs(),
                        "Poll timeout shorter than interval, using interval"
                    );
                }
                Some(PollSettings {
                    url,
                    interval,
                    timeout: timeout.max(interval),
                    user_agent: source
                        .get("poll.user_agent")
                        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                    cookie_file: source.get("poll.cookie_file").map(PathBuf::from),
                    expired_marker: source.get("poll.expired_marker"),
                })
            }
            None => None,
        };

        let push = source.get("push.url").map(|url| -> Result<_, MonitorError> {
            Ok(PushSettings {
                url,
                idle_timeout: Duration::from_secs(parse_or(source, "push.idle_timeout_secs", 120u64)?),
            })
        });
        let push = push.transpose()?;

        if poll.is_none() && push.is_none() {
            return Err(MonitorError::Config(
                "at least one of poll.url / push.url is required".to_string(),
            ));
        }

        let thresholds = Thresholds {
            high: parse_or(source, "tier.high", 2.0f64)?,
            rare: parse_or(source, "tier.rare", 100.0f64)?,
        };
        if !(thresholds.high < thresholds.rare) {
            return Err(MonitorError::Config(format!(
                "tier.high ({}) must be below tier.rare ({})",
                thresholds.high, thresholds.rare
            )));
        }

        let backoff_initial = Duration::from_secs(parse_or(source, "backoff.initial_secs", 5u64)?);
        if backoff_initial.is_zero() {
            return Err(MonitorError::Config(
                "backoff.initial_secs must be at least 1".to_string(),
            ));
        }
        let backoff_max = Duration::from_secs(parse_or(source, "backoff.max_secs", 60u64)?);

        let utc_offset = match source.get("alert.utc_offset") {
            Some(raw) => parse_offset(&raw)?,
            None => FixedOffset::east_opt(3600).ok_or_else(|| MonitorError::Config("bad default offset".to_string()))?,
        };

        Ok(Self {
            poll,
            push,
            history_capacity: parse_or(source, "history.capacity", 20usize)?.max(2),
            thresholds,
            low_ceiling: parse_or(source, "predict.low_ceiling", 2.0f64)?,
            stall_limit: parse_or(source, "extract.stall_limit", 20u32)?,
            backoff_initial,
            backoff_max: backoff_max.max(backoff_initial),
            telegram_token: source.get("notify.telegram_token"),
            telegram_api_base: source
                .get("notify.api_base")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            destinations: source
                .get("notify.destinations")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(Destination::new)
                        .collect()
                })
                .unwrap_or_default(),
            game_name: source.get("alert.game_name").unwrap_or_else(|| "Aviator".to_string()),
            utc_offset,
            banner_link: source.get("alert.banner_link"),
            banner_image: source.get("alert.banner_image"),
            store: StorePaths::from_source(source),
            archive_dir: source.get("store.archive_dir").map(PathBuf::from),
        })
    }
}

fn parse_or<T: std::str::FromStr>(source: &dyn ConfigSource, key: &str, default: T) -> Result<T, MonitorError> {
    match source.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| MonitorError::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

/// 解析 `+01:00` / `-03:30` / `1`（小时）
pub fn parse_offset(raw: &str) -> Result<FixedOffset, MonitorError> {
    let invalid = || MonitorError::Config(format!("alert.utc_offset has invalid value '{}'", raw));
    let raw = raw.trim();

    let (sign, rest) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw.strip_prefix('+').unwrap_or(raw)),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<u8>().map_err(|_| invalid())?, m.parse::<u8>().map_err(|_| invalid())?),
        None => (rest.parse::<u8>().map_err(|_| invalid())?, 0),
    };

    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (i32::from(hours) * 3600 + i32::from(minutes) * 60)).ok_or_else(invalid)
}
