//! 入场提示 - 固定的确定性规则，不是统计模型
//!
//! 最近两个值都低于阈值时给出提示，置信度随两者离阈值的距离上升。

use serde::{Deserialize, Serialize};

/// 置信度上限
const MAX_CONFIDENCE: f64 = 99.9;
/// 基础置信度
const BASE_CONFIDENCE: f64 = 90.0;
/// 每低于阈值 1.0 增加的置信度
const STEP: f64 = 5.0;

/// 预测结果；`expected == false` 时 confidence 恒为 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub expected: bool,
    pub confidence: f64,
}

impl PredictionResult {
    pub fn none() -> Self {
        Self {
            expected: false,
            confidence: 0.0,
        }
    }
}

/// 启发式预测器
#[derive(Debug, Clone, Copy)]
pub struct HeuristicPredictor {
    low_ceiling: f64,
}

impl HeuristicPredictor {
    pub fn new(low_ceiling: f64) -> Self {
        Self { low_ceiling }
    }

    /// `window` 从旧到新
    pub fn predict(&self, window: &[f64]) -> PredictionResult {
        let [.., second, newest] = window else {
            return PredictionResult::none();
        };

        if *newest >= self.low_ceiling || *second >= self.low_ceiling {
            return PredictionResult::none();
        }

        let bonus = STEP * (self.low_ceiling - newest) + STEP * (self.low_ceiling - second);
        let confidence = round1(BASE_CONFIDENCE + round1(bonus)).min(MAX_CONFIDENCE);

        PredictionResult {
            expected: true,
            confidence,
        }
    }
}

impl Default for HeuristicPredictor {
    fn default() -> Self {
        Self::new(2.0)
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_low_values_expect_entry() {
        let result = HeuristicPredictor::default().predict(&[1.5, 1.8]);
        assert!(result.expected);
        assert_eq!(result.confidence, 93.5);
    }

    #[test]
    fn test_mixed_values_do_not_expect_entry() {
        let result = HeuristicPredictor::default().predict(&[2.5, 1.0]);
        assert_eq!(result, PredictionResult::none());
    }

    #[test]
    fn test_short_window() {
        let predictor = HeuristicPredictor::default();
        assert_eq!(predictor.predict(&[]), PredictionResult::none());
        assert_eq!(predictor.predict(&[1.0]), PredictionResult::none());
    }

    #[test]
    fn test_confidence_is_capped() {
        let result = HeuristicPredictor::default().predict(&[0.0, 0.0]);
        assert_eq!(result.confidence, 99.9);
    }

    #[test]
    fn test_only_last_two_values_count() {
        let result = HeuristicPredictor::default().predict(&[50.0, 1.0, 1.0]);
        assert!(result.expected);
        assert_eq!(result.confidence, 99.9);
    }
}
