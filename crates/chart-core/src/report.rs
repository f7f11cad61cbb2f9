//! Final report and its closed recommendation vocabulary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::candle::Timeframe;
use crate::error::AnalysisError;

/// The one actionable verdict of a report.
///
/// Rendered as `BUY - <scenario>` / `SELL - <scenario>` (plain hyphen) or
/// the bare keywords `WATCH` / `WAIT`. Anything outside this vocabulary is
/// rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Buy { scenario: String },
    Sell { scenario: String },
    Watch,
    Wait,
}

impl Recommendation {
    /// The keyword without any scenario suffix
    pub fn action(&self) -> &'static str {
        match self {
            Self::Buy { .. } => "BUY",
            Self::Sell { .. } => "SELL",
            Self::Watch => "WATCH",
            Self::Wait => "WAIT",
        }
    }

    /// Whether the verdict commits to a trade
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Buy { .. } | Self::Sell { .. })
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy { scenario } => write!(f, "BUY - {scenario}"),
            Self::Sell { scenario } => write!(f, "SELL - {scenario}"),
            Self::Watch => f.write_str("WATCH"),
            Self::Wait => f.write_str("WAIT"),
        }
    }
}

impl FromStr for Recommendation {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let reject = || {
            AnalysisError::MalformedUpstreamResponse {
                stage: "report".to_string(),
                reason: format!("recommendation '{trimmed}' outside the allowed vocabulary"),
            }
        };
        match trimmed {
            "WATCH" => return Ok(Self::Watch),
            "WAIT" => return Ok(Self::Wait),
            _ => {}
        }
        let (keyword, rest) = trimmed.split_once(" - ").ok_or_else(reject)?;
        let scenario = rest.trim();
        if scenario.is_empty() {
            return Err(reject());
        }
        match keyword {
            "BUY" => Ok(Self::Buy {
                scenario: scenario.to_string(),
            }),
            "SELL" => Ok(Self::Sell {
                scenario: scenario.to_string(),
            }),
            _ => Err(reject()),
        }
    }
}

/// The assembled end product of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub generated_at: DateTime<Utc>,
    pub recommendation: Recommendation,
    /// Two-to-three sentence executive summary
    pub summary: String,
    /// Narrative body produced by the report stage
    pub narrative: String,
    /// Deterministically assembled markdown document
    pub markdown: String,
    /// Disclosures about degraded stages, in pipeline order
    pub caveats: Vec<String>,
}
