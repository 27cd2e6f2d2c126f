//! 消息格式化模块 - 将信号记录渲染为用户可读的通知
//!
//! 输出与渠道无关：HTML 正文 + 可选图片 + 可选链接按钮。

use super::channel::RenderedAlert;
use crate::signal::{AlertRecord, Tier};

/// 消息文本常量
pub mod msg {
    pub const TITLE: &str = "🎰 <b>SIGNAL DETECTED</b>";
    pub const TIME: &str = "🕐 <b>Time:</b>";
    pub const VALUE: &str = "🎯 <b>Multiplier:</b>";
    pub const TIER: &str = "📊 <b>Tier:</b>";
    pub const PREDICTION: &str = "🔮 <b>Prediction:</b>";
    pub const NO_PREDICTION: &str = "none";
    pub const ENTRY_HINT: &str = "🚀 <b>Entry window open</b>\n🎯 Consider the next round.";
    pub const SIGN_UP: &str = "🔗 Sign up";
}

/// 分级标签
pub fn tier_label(tier: Tier, high: f64, rare: f64) -> String {
    match tier {
        Tier::Low => format!("🧊 Low (&lt;{}x)", high),
        Tier::High => format!("🔥 High (≥{}x)", high),
        Tier::Rare => format!("💎 Rare (≥{}x)", rare),
    }
}

/// 信号格式化器
#[derive(Debug, Clone)]
pub struct AlertFormatter {
    game_name: String,
    high: f64,
    rare: f64,
    banner_link: Option<String>,
    banner_image: Option<String>,
}

impl AlertFormatter {
    pub fn new(game_name: impl Into<String>) -> Self {
        Self {
            game_name: game_name.into(),
            high: 2.0,
            rare: 100.0,
            banner_link: None,
            banner_image: None,
        }
    }

    /// 设置分级阈值（只影响标签文字）
    pub fn with_thresholds(mut self, high: f64, rare: f64) -> Self {
        self.high = high;
        self.rare = rare;
        self
    }

    /// 设置推广链接
    pub fn with_banner_link(mut self, link: Option<String>) -> Self {
        self.banner_link = link;
        self
    }

    /// 设置推广图片
    pub fn with_banner_image(mut self, image: Option<String>) -> Self {
        self.banner_image = image;
        self
    }

    /// 渲染信号
    pub fn render(&self, alert: &AlertRecord) -> RenderedAlert {
        let prediction = if alert.prediction.expected {
            format!("{:.1}%", alert.prediction.confidence)
        } else {
            msg::NO_PREDICTION.to_string()
        };

        let mut text = format!(
            "{} - {}\n\n{} {}\n{} <code>{:.2}x</code>\n{} {}\n{} {}\n",
            msg::TITLE,
            self.game_name.to_uppercase(),
            msg::TIME,
            alert.local_time,
            msg::VALUE,
            alert.value,
            msg::TIER,
            tier_label(alert.tier, self.high, self.rare),
            msg::PREDICTION,
            prediction,
        );

        if alert.prediction.expected {
            text.push('\n');
            text.push_str(msg::ENTRY_HINT);
            text.push('\n');
        }

        if let Some(annotation) = &alert.annotation {
            text.push('\n');
            text.push_str(annotation);
            text.push('\n');
        }

        if let Some(link) = &self.banner_link {
            text.push_str(&format!("\n👉 <a href='{0}'>{0}</a>", link));
        }

        let mut rendered = RenderedAlert::new(text.trim_end());
        if let Some(image) = &self.banner_image {
            rendered = rendered.with_image(image.clone());
        }
        if let Some(link) = &self.banner_link {
            rendered = rendered.with_link(msg::SIGN_UP, link.clone());
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{AlertBuilder, PredictionResult};
    use chrono::{FixedOffset, TimeZone, Utc};

    fn alert(value: f64, tier: Tier, prediction: PredictionResult) -> AlertRecord {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        AlertBuilder::new("poll", FixedOffset::east_opt(3600).unwrap()).build(value, tier, prediction, now)
    }

    #[test]
    fn test_render_without_prediction() {
        let formatter = AlertFormatter::new("Aviator");
        let rendered = formatter.render(&alert(2.5, Tier::High, PredictionResult::none()));

        assert!(rendered.text.contains("AVIATOR"));
        assert!(rendered.text.contains("<code>2.50x</code>"));
        assert!(rendered.text.contains("11:00:00"));
        assert!(rendered.text.contains("Prediction:</b> none"));
        assert!(!rendered.text.contains("Entry window"));
        assert!(rendered.image_url.is_none());
        assert!(rendered.link.is_none());
    }

    #[test]
    fn test_render_with_prediction_and_banner() {
        let formatter = AlertFormatter::new("Aviator")
            .with_banner_link(Some("https://example.com/join".to_string()))
            .with_banner_image(Some("https://example.com/banner.png".to_string()));
        let prediction = PredictionResult {
            expected: true,
            confidence: 93.5,
        };
        let rendered = formatter.render(&alert(1.8, Tier::Low, prediction));

        assert!(rendered.text.contains("93.5%"));
        assert!(rendered.text.contains("Entry window"));
        assert!(rendered.text.contains("https://example.com/join"));
        assert_eq!(rendered.image_url.as_deref(), Some("https://example.com/banner.png"));
        assert_eq!(rendered.link.unwrap().1, "https://example.com/join");
    }

    #[test]
    fn test_render_rare_includes_annotation() {
        let formatter = AlertFormatter::new("Aviator");
        let record = alert(250.0, Tier::Rare, PredictionResult::none());
        let rendered = formatter.render(&record);
        assert!(rendered.text.contains(record.annotation.as_deref().unwrap()));
        assert!(rendered.text.contains("Rare"));
    }
}
