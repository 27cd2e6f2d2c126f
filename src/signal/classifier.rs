//! Tier classification for outcome values
//!
//! The tier is derived purely from the newest value:
//! - LOW: below `high`
//! - HIGH: at least `high`, below `rare`
//! - RARE: at least `rare`

/// Outcome tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Tier {
    Low,
    High,
    Rare,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Low => "LOW",
            Tier::High => "HIGH",
            Tier::Rare => "RARE",
        }
    }
}

/// Tier boundaries (configuration, see `tier.high` / `tier.rare`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub high: f64,
    pub rare: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high: 2.0,
            rare: 100.0,
        }
    }
}

impl Thresholds {
    pub fn classify(&self, value: f64) -> Tier {
        if value >= self.rare {
            Tier::Rare
        } else if value >= self.high {
            Tier::High
        } else {
            Tier::Low
        }
    }
}
