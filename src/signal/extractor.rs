//! 结果提取模块 - 从原始 payload 中提取回合结果
//!
//! 远端页面格式不受控，所以准备了一组候选规则，
//! 通过"竞争试验"选出匹配最多的一条；当前规则失效时自动重新选择。

use std::collections::VecDeque;

use regex::Regex;
use tracing::{debug, info, warn};

/// 用于重新选择规则的最近样本数
const SAMPLE_CAPACITY: usize = 3;

/// 规则类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// 数字后跟 `x`，如 `3,60x`、`1x`
    VisualSuffix,
    /// JSON 字段，如 `"multiplier": "2.31"`
    KeyedField { key: String },
    /// HTML 属性，如 `data-value="2.31"`
    Attribute { name: String },
    /// `<div class="result-item">2.31x</div>`
    ResultItem,
}

impl RuleKind {
    fn pattern(&self) -> String {
        match self {
            // 前面不能紧跟数字或分隔符，否则 `1.234x` 会截出 234
            RuleKind::VisualSuffix => r"(?i)(?:^|[^\d.,])(\d{1,6}(?:[.,]\d{1,2})?)x\b".to_string(),
            RuleKind::KeyedField { key } => format!(
                r#"(?i)"{}"\s*:\s*"?(\d+(?:[.,]\d+)?)"#,
                regex::escape(key)
            ),
            RuleKind::Attribute { name } => format!(
                r#"(?i){}\s*=\s*"(\d+(?:[.,]\d+)?)""#,
                regex::escape(name)
            ),
            RuleKind::ResultItem => {
                r#"(?i)<div class="result-item[^"]*">\s*(\d+(?:[.,]\d+)?)x?\s*</div>"#.to_string()
            }
        }
    }

    fn label(&self) -> String {
        match self {
            RuleKind::VisualSuffix => "visual: 3,60x / 2x".to_string(),
            RuleKind::KeyedField { key } => format!("json field \"{}\"", key),
            RuleKind::Attribute { name } => format!("attribute {}=\"...\"", name),
            RuleKind::ResultItem => "div.result-item".to_string(),
        }
    }
}

/// 提取规则
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub kind: RuleKind,
    /// 人类可读的描述
    pub label: String,
    /// 最近一次选择时在样本上的匹配次数
    pub hits: usize,
    regex: Regex,
}

impl ExtractionRule {
    pub fn new(kind: RuleKind) -> Result<Self, regex::Error> {
        let regex = Regex::new(&kind.pattern())?;
        Ok(Self {
            label: kind.label(),
            kind,
            hits: 0,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// 返回所有匹配到的原始文本（第一个捕获组）
    pub fn try_match<'a>(&self, payload: &'a str) -> Vec<&'a str> {
        self.regex
            .captures_iter(payload)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect()
    }

    pub fn count(&self, payload: &str) -> usize {
        self.regex.captures_iter(payload).count()
    }
}

/// 默认候选规则（顺序决定平局时的优先级）
pub fn default_rules() -> Vec<ExtractionRule> {
    [
        RuleKind::VisualSuffix,
        RuleKind::KeyedField { key: "multiplier".to_string() },
        RuleKind::KeyedField { key: "crash_point".to_string() },
        RuleKind::Attribute { name: "data-value".to_string() },
        RuleKind::ResultItem,
    ]
    .into_iter()
    .filter_map(|kind| ExtractionRule::new(kind).ok())
    .collect()
}

/// 竞争选择：在所有样本上统计各规则命中数，取最大者；全部为 0 时返回 None
pub fn select_rule<S: AsRef<str>>(rules: &[ExtractionRule], samples: &[S]) -> Option<ExtractionRule> {
    let mut best: Option<(usize, usize)> = None;

    for (idx, rule) in rules.iter().enumerate() {
        let hits: usize = samples.iter().map(|s| rule.count(s.as_ref())).sum();
        // 严格大于：平局保留先评估的规则
        if hits > 0 && best.map_or(true, |(_, max)| hits > max) {
            best = Some((idx, hits));
        }
    }

    best.map(|(idx, hits)| {
        let mut rule = rules[idx].clone();
        rule.hits = hits;
        rule
    })
}

/// 把匹配文本转换为数值：逗号视为小数点，解析失败或非法值直接丢弃
pub fn parse_outcome(raw: &str) -> Option<f64> {
    let normalized = raw.trim().trim_end_matches(['x', 'X']).replace(',', ".");
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// 用指定规则提取所有结果值
pub fn extract(payload: &str, rule: &ExtractionRule) -> Vec<f64> {
    rule.try_match(payload)
        .into_iter()
        .filter_map(parse_outcome)
        .collect()
}

/// 单次提取的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// 提取到的值（按 payload 中出现的顺序）
    Values(Vec<f64>),
    /// payload 为空，不算错误
    Empty,
    /// 没有任何规则匹配
    Stalled,
}

/// 自适应提取器：持有候选规则、当前规则和最近样本
pub struct PatternExtractor {
    candidates: Vec<ExtractionRule>,
    active: Option<ExtractionRule>,
    samples: VecDeque<String>,
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(candidates: Vec<ExtractionRule>) -> Self {
        Self {
            candidates,
            active: None,
            samples: VecDeque::with_capacity(SAMPLE_CAPACITY),
        }
    }

    /// 当前规则
    pub fn active_rule(&self) -> Option<&ExtractionRule> {
        self.active.as_ref()
    }

    /// 处理一个 payload
    ///
    /// 当前规则在非空 payload 上零匹配时触发重新选择，
    /// 以应对远端页面格式变化。
    pub fn process(&mut self, payload: &str) -> Extraction {
        if payload.trim().is_empty() {
            return Extraction::Empty;
        }

        self.remember(payload);

        if let Some(rule) = &self.active {
            let values = extract(payload, rule);
            if !values.is_empty() {
                return Extraction::Values(values);
            }
            if rule.count(payload) > 0 {
                // 匹配到了但全部解析失败
                return Extraction::Values(Vec::new());
            }
            debug!(rule = %rule.label, "Active rule stopped matching, reselecting");
        }

        self.reselect();

        match &self.active {
            Some(rule) => Extraction::Values(extract(payload, rule)),
            None => {
                log_candidate_lines(payload);
                Extraction::Stalled
            }
        }
    }

    fn remember(&mut self, payload: &str) {
        if self.samples.len() == SAMPLE_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(payload.to_string());
    }

    fn reselect(&mut self) {
        // 最新样本必须能被选中的规则匹配，否则旧样本会把失效规则选回来
        let newest = self.samples.back().map(String::as_str).unwrap_or_default();
        let viable: Vec<ExtractionRule> = self
            .candidates
            .iter()
            .filter(|r| r.count(newest) > 0)
            .cloned()
            .collect();
        let samples: Vec<&str> = self.samples.iter().map(String::as_str).collect();

        match select_rule(&viable, &samples) {
            Some(rule) => {
                info!(rule = %rule.label, hits = rule.hits, "Extraction rule selected");
                self.active = Some(rule);
            }
            None => {
                if self.active.take().is_some() {
                    warn!("No extraction rule matches any more");
                } else {
                    warn!("No extraction rule found, waiting for next payload");
                }
            }
        }
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// 记录最多 5 行可能包含结果的片段，便于调整规则
fn log_candidate_lines(payload: &str) {
    for (i, line) in payload
        .lines()
        .map(str::trim)
        .filter(|l| l.len() < 500 && (l.contains('x') || l.contains("multiplier")))
        .take(5)
        .enumerate()
    {
        debug!(line_no = i + 1, snippet = %line, "Candidate line");
    }
}
