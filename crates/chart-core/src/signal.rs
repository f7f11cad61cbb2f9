//! Rule-based signal state synthesized from the indicator families

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::candle::Timeframe;

/// Overall directional read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
            Self::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

/// Coarse trend classification from the moving-average stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendLabel {
    StrongUptrend,
    Uptrend,
    Sideways,
    Downtrend,
    StrongDowntrend,
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StrongUptrend => "STRONG_UPTREND",
            Self::Uptrend => "UPTREND",
            Self::Sideways => "SIDEWAYS",
            Self::Downtrend => "DOWNTREND",
            Self::StrongDowntrend => "STRONG_DOWNTREND",
        };
        f.write_str(s)
    }
}

/// Volatility regime bucketed from ATR percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityTier {
    Low,
    Normal,
    High,
    Extreme,
}

impl fmt::Display for VolatilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Extreme => "EXTREME",
        };
        f.write_str(s)
    }
}

/// Per-family directional score, each in {-1, 0, +1}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FamilyScores {
    pub trend: i8,
    pub momentum: i8,
    pub volatility: i8,
    pub volume: i8,
    pub levels: i8,
}

impl FamilyScores {
    /// Weighted raw score in [-100, 100]. Trend and momentum dominate,
    /// levels carry a fifth, volatility and volume a tenth each.
    pub fn weighted_raw(&self) -> i32 {
        i32::from(self.trend) * 30
            + i32::from(self.momentum) * 30
            + i32::from(self.levels) * 20
            + i32::from(self.volatility) * 10
            + i32::from(self.volume) * 10
    }
}

/// Price levels the signal stage considers actionable
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyLevels {
    pub nearest_support: Option<f64>,
    pub nearest_resistance: Option<f64>,
    pub pivot: Option<f64>,
}

/// Two or more families agreeing on direction, with the evidence behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confluence {
    pub name: String,
    pub evidence: Vec<String>,
}

/// The complete rule-derived state for one analysis pass.
///
/// Derived deterministically from an [`crate::IndicatorSet`]; the same
/// indicator values always serialize to the same signal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bias: Bias,
    /// Conviction in [0, 100], the magnitude of the weighted family score
    pub strength: u8,
    pub trend: TrendLabel,
    pub volatility: VolatilityTier,
    pub family_scores: FamilyScores,
    pub key_levels: KeyLevels,
    pub confluences: Vec<Confluence>,
    /// Human-readable observations, in the order they were derived
    pub observations: Vec<String>,
}

impl SignalState {
    /// One-paragraph summary suitable for prompts and report headers
    pub fn summary_line(&self) -> String {
        format!(
            "{} {} bias, strength {}/100, trend {}, volatility {}",
            self.symbol, self.bias, self.strength, self.trend, self.volatility
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_raw_bounds() {
        let all_up = FamilyScores {
            trend: 1,
            momentum: 1,
            volatility: 1,
            volume: 1,
            levels: 1,
        };
        assert_eq!(all_up.weighted_raw(), 100);

        let all_down = FamilyScores {
            trend: -1,
            momentum: -1,
            volatility: -1,
            volume: -1,
            levels: -1,
        };
        assert_eq!(all_down.weighted_raw(), -100);

        assert_eq!(FamilyScores::default().weighted_raw(), 0);
    }

    #[test]
    fn test_bias_serde_vocabulary() {
        let json = serde_json::to_string(&Bias::Bullish).unwrap();
        assert_eq!(json, "\"BULLISH\"");
        let parsed: Bias = serde_json::from_str("\"NEUTRAL\"").unwrap();
        assert_eq!(parsed, Bias::Neutral);
    }

    #[test]
    fn test_summary_line() {
        let state = SignalState {
            symbol: "AAPL".to_string(),
            timeframe: Timeframe::D1,
            bias: Bias::Bullish,
            strength: 60,
            trend: TrendLabel::Uptrend,
            volatility: VolatilityTier::Normal,
            family_scores: FamilyScores::default(),
            key_levels: KeyLevels::default(),
            confluences: vec![],
            observations: vec![],
        };
        assert_eq!(
            state.summary_line(),
            "AAPL BULLISH bias, strength 60/100, trend UPTREND, volatility NORMAL"
        );
    }
}
