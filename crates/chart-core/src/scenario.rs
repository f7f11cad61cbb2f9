//! Trade scenarios and the aggregated risk view

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AnalysisError, Result};
use crate::pattern::ConfidenceTier;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        };
        f.write_str(s)
    }
}

/// One actionable trade idea with fully specified levels.
///
/// A scenario is only usable after [`Scenario::validate`] accepts it; the
/// pipeline drops anything that fails validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    /// Price targets ordered from nearest to furthest
    pub targets: Vec<f64>,
    /// Reward-to-risk using the first target
    pub rr_ratio: f64,
    pub confidence: ConfidenceTier,
    pub rationale: String,
    /// Optional analyst commentary, carried verbatim and never validated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyst_take: Option<String>,
}

impl Scenario {
    /// Reward-to-risk implied by entry, stop, and first target
    pub fn implied_rr(&self) -> Option<f64> {
        let target = *self.targets.first()?;
        let risk = (self.entry - self.stop_loss).abs();
        if risk <= f64::EPSILON {
            return None;
        }
        Some((target - self.entry).abs() / risk)
    }

    /// Check level ordering and the reward-to-risk figure.
    ///
    /// On success the returned scenario carries the recomputed `rr_ratio`,
    /// so downstream consumers never see a stale number.
    pub fn validate(mut self) -> Result<Self> {
        let reject = AnalysisError::InvalidScenario;

        if self.name.trim().is_empty() {
            return Err(reject("scenario name is empty".to_string()));
        }
        let mut levels = vec![self.entry, self.stop_loss];
        levels.extend_from_slice(&self.targets);
        if levels.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(reject(format!(
                "scenario '{}': levels must be finite and positive",
                self.name
            )));
        }
        if self.targets.is_empty() {
            return Err(reject(format!("scenario '{}': no targets", self.name)));
        }

        let ordered = match self.direction {
            Direction::Long => {
                self.stop_loss < self.entry
                    && self.targets.iter().all(|t| *t > self.entry)
                    && self.targets.windows(2).all(|w| w[0] < w[1])
            }
            Direction::Short => {
                self.stop_loss > self.entry
                    && self.targets.iter().all(|t| *t < self.entry)
                    && self.targets.windows(2).all(|w| w[0] > w[1])
            }
        };
        if !ordered {
            return Err(reject(format!(
                "scenario '{}': levels out of order for {} direction",
                self.name, self.direction
            )));
        }

        match self.implied_rr() {
            Some(rr) if rr.is_finite() && rr > 0.0 => {
                self.rr_ratio = (rr * 100.0).round() / 100.0;
                Ok(self)
            }
            _ => Err(reject(format!(
                "scenario '{}': degenerate reward-to-risk",
                self.name
            ))),
        }
    }
}

/// Letter grade for the overall trade setup quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskGrade {
    A,
    B,
    C,
    D,
}

impl RiskGrade {
    /// Grade from the best available reward-to-risk, tightened one notch
    /// when conviction is low.
    pub fn from_metrics(best_rr: f64, confidence: ConfidenceTier) -> Self {
        let base = if best_rr >= 2.5 {
            Self::A
        } else if best_rr >= 1.8 {
            Self::B
        } else if best_rr >= 1.2 {
            Self::C
        } else {
            Self::D
        };
        if confidence == ConfidenceTier::Low {
            base.downgrade()
        } else {
            base
        }
    }

    fn downgrade(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::C,
            Self::C | Self::D => Self::D,
        }
    }
}

impl fmt::Display for RiskGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        };
        f.write_str(s)
    }
}

/// Position sizing guidance bucketed from the volatility regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSizing {
    Small,
    Moderate,
    Standard,
}

impl PositionSizing {
    /// Sizing from ATR as a percentage of price. Wider daily ranges get
    /// smaller size.
    pub fn from_atr_percent(atr_percent: Option<f64>) -> Self {
        match atr_percent {
            Some(p) if p > 5.0 => Self::Small,
            Some(p) if p > 3.0 => Self::Moderate,
            _ => Self::Standard,
        }
    }

    /// Suggested account risk band for the report
    pub fn risk_band(&self) -> &'static str {
        match self {
            Self::Small => "1-2% of account",
            Self::Moderate => "2-3% of account",
            Self::Standard => "3-5% of account",
        }
    }
}

impl fmt::Display for PositionSizing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Small => "SMALL",
            Self::Moderate => "MODERATE",
            Self::Standard => "STANDARD",
        };
        f.write_str(s)
    }
}

/// Validated scenarios plus aggregates the report stage consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub scenarios: Vec<Scenario>,
    pub best_rr: f64,
    pub average_rr: f64,
    pub grade: RiskGrade,
    pub position_sizing: PositionSizing,
    /// Set when the scenarios came from the deterministic fallback path
    pub degraded: bool,
}

impl RiskAnalysis {
    /// Aggregate already-validated scenarios. Fails with
    /// [`AnalysisError::NoValidScenarios`] when the slice is empty.
    pub fn from_scenarios(
        scenarios: Vec<Scenario>,
        atr_percent: Option<f64>,
        degraded: bool,
    ) -> Result<Self> {
        if scenarios.is_empty() {
            return Err(AnalysisError::NoValidScenarios);
        }
        let best_rr = scenarios
            .iter()
            .map(|s| s.rr_ratio)
            .fold(f64::MIN, f64::max);
        let average_rr =
            scenarios.iter().map(|s| s.rr_ratio).sum::<f64>() / scenarios.len() as f64;
        let top_confidence = scenarios
            .iter()
            .map(|s| s.confidence)
            .max()
            .unwrap_or(ConfidenceTier::Low);
        Ok(Self {
            best_rr,
            average_rr,
            grade: RiskGrade::from_metrics(best_rr, top_confidence),
            position_sizing: PositionSizing::from_atr_percent(atr_percent),
            degraded,
            scenarios,
        })
    }

    /// Scenario with the highest reward-to-risk
    pub fn best_scenario(&self) -> Option<&Scenario> {
        self.scenarios
            .iter()
            .max_by(|a, b| a.rr_ratio.total_cmp(&b.rr_ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_scenario() -> Scenario {
        Scenario {
            name: "Breakout continuation".to_string(),
            direction: Direction::Long,
            entry: 100.0,
            stop_loss: 95.0,
            targets: vec![110.0, 120.0],
            rr_ratio: 0.0,
            confidence: ConfidenceTier::High,
            rationale: "Close above resistance with volume".to_string(),
            analyst_take: None,
        }
    }

    #[test]
    fn test_validate_recomputes_rr() {
        let s = long_scenario().validate().unwrap();
        assert!((s.rr_ratio - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_long_with_stop_above_entry() {
        let mut s = long_scenario();
        s.stop_loss = 105.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unordered_targets() {
        let mut s = long_scenario();
        s.targets = vec![120.0, 110.0];
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_short_ordering() {
        let s = Scenario {
            name: "Rejection short".to_string(),
            direction: Direction::Short,
            entry: 100.0,
            stop_loss: 104.0,
            targets: vec![94.0, 90.0],
            rr_ratio: 0.0,
            confidence: ConfidenceTier::Medium,
            rationale: "Failed retest of resistance".to_string(),
            analyst_take: Some("Watch the open".to_string()),
        };
        let s = s.validate().unwrap();
        assert!((s.rr_ratio - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_zero_risk() {
        let mut s = long_scenario();
        s.stop_loss = 100.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_risk_grade_tiers() {
        assert_eq!(RiskGrade::from_metrics(3.0, ConfidenceTier::High), RiskGrade::A);
        assert_eq!(RiskGrade::from_metrics(2.0, ConfidenceTier::High), RiskGrade::B);
        assert_eq!(RiskGrade::from_metrics(1.3, ConfidenceTier::Medium), RiskGrade::C);
        assert_eq!(RiskGrade::from_metrics(0.8, ConfidenceTier::High), RiskGrade::D);
        // low conviction drops one notch
        assert_eq!(RiskGrade::from_metrics(3.0, ConfidenceTier::Low), RiskGrade::B);
    }

    #[test]
    fn test_position_sizing_from_atr() {
        assert_eq!(PositionSizing::from_atr_percent(Some(6.0)), PositionSizing::Small);
        assert_eq!(PositionSizing::from_atr_percent(Some(4.0)), PositionSizing::Moderate);
        assert_eq!(PositionSizing::from_atr_percent(Some(1.0)), PositionSizing::Standard);
        assert_eq!(PositionSizing::from_atr_percent(None), PositionSizing::Standard);
    }

    #[test]
    fn test_risk_analysis_aggregates() {
        let a = long_scenario().validate().unwrap();
        let mut b = long_scenario();
        b.name = "Pullback entry".to_string();
        b.targets = vec![105.0];
        let b = b.validate().unwrap();

        let analysis = RiskAnalysis::from_scenarios(vec![a, b], Some(2.0), false).unwrap();
        assert!((analysis.best_rr - 2.0).abs() < 1e-9);
        assert!((analysis.average_rr - 1.5).abs() < 1e-9);
        assert_eq!(analysis.grade, RiskGrade::B);
        assert_eq!(analysis.best_scenario().unwrap().name, "Breakout continuation");
    }

    #[test]
    fn test_empty_scenarios_is_no_valid_scenarios() {
        let err = RiskAnalysis::from_scenarios(vec![], None, false).unwrap_err();
        assert!(matches!(err, AnalysisError::NoValidScenarios));
    }
}
