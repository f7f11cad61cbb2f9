//! Chart pattern findings produced by the vision stage

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::signal::Bias;

/// Closed confidence vocabulary used across pattern and scenario output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Coarse read of how price is currently organized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStructure {
    Trending,
    Ranging,
    Reversal,
    Unclear,
}

impl fmt::Display for MarketStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trending => "TRENDING",
            Self::Ranging => "RANGING",
            Self::Reversal => "REVERSAL",
            Self::Unclear => "UNCLEAR",
        };
        f.write_str(s)
    }
}

/// One pattern the vision stage claims to see on the chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub name: String,
    /// Directional implication, if the pattern has one
    pub implication: Option<Bias>,
    pub confidence: ConfidenceTier,
    pub description: String,
}

/// Output of the pattern recognition stage.
///
/// When the stage is unavailable the pipeline carries
/// [`PatternFinding::unavailable`] forward instead of failing the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFinding {
    pub patterns: Vec<DetectedPattern>,
    pub market_structure: MarketStructure,
    pub confidence: ConfidenceTier,
    pub observations: Vec<String>,
    /// Set when this finding is a degradation placeholder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PatternFinding {
    /// Placeholder finding used when the vision stage failed or timed out
    pub fn unavailable(reason: &str) -> Self {
        Self {
            patterns: vec![],
            market_structure: MarketStructure::Unclear,
            confidence: ConfidenceTier::Low,
            observations: vec![],
            note: Some(format!("Pattern analysis unavailable: {reason}")),
        }
    }

    /// True if this finding came from the degradation path
    pub fn is_degraded(&self) -> bool {
        self.note.is_some()
    }
}
