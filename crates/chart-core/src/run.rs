//! Analysis run record and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::candle::Timeframe;
use crate::pattern::PatternFinding;
use crate::report::Report;
use crate::scenario::RiskAnalysis;
use crate::signal::SignalState;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Fetch,
    Indicators,
    Signals,
    Patterns,
    Scenarios,
    Report,
    Assembly,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Indicators => "indicators",
            Self::Signals => "signals",
            Self::Patterns => "patterns",
            Self::Scenarios => "scenarios",
            Self::Report => "report",
            Self::Assembly => "assembly",
        };
        f.write_str(s)
    }
}

/// Lifecycle of one run.
///
/// Transitions only move forward through the stage order; any in-flight
/// state may drop to `Failed`, and `Done`/`Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Fetching,
    Indicators,
    Signals,
    Patterns,
    Scenarios,
    Report,
    Assembling,
    Done,
    Failed,
}

impl RunState {
    fn order(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Fetching => Some(1),
            Self::Indicators => Some(2),
            Self::Signals => Some(3),
            Self::Patterns => Some(4),
            Self::Scenarios => Some(5),
            Self::Report => Some(6),
            Self::Assembling => Some(7),
            Self::Done => Some(8),
            Self::Failed => None,
        }
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == Self::Done || self == Self::Failed {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        match (self.order(), next.order()) {
            (Some(a), Some(b)) => b == a + 1,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Fetching => "FETCHING",
            Self::Indicators => "INDICATORS",
            Self::Signals => "SIGNALS",
            Self::Patterns => "PATTERNS",
            Self::Scenarios => "SCENARIOS",
            Self::Report => "REPORT",
            Self::Assembling => "ASSEMBLING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Timing and outcome record for one executed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: StageName,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub attempts: u32,
    /// True when the stage fell back to a degraded result
    pub degraded: bool,
}

/// Why a run ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub stage: StageName,
    pub error: String,
}

/// Aggregate record of one pipeline pass, terminal or in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Candles actually fed to the indicator stage
    pub candles_analyzed: usize,
    pub timings: Vec<StageTiming>,
    pub signal: Option<SignalState>,
    pub patterns: Option<PatternFinding>,
    pub risk: Option<RiskAnalysis>,
    pub report: Option<Report>,
    pub failure: Option<RunFailure>,
}

impl AnalysisRun {
    /// Fresh run in `Pending` state
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            timeframe,
            state: RunState::Pending,
            started_at: Utc::now(),
            finished_at: None,
            candles_analyzed: 0,
            timings: vec![],
            signal: None,
            patterns: None,
            risk: None,
            report: None,
            failure: None,
        }
    }

    /// Stages that completed via a degradation path, in pipeline order
    pub fn degraded_stages(&self) -> Vec<StageName> {
        self.timings
            .iter()
            .filter(|t| t.degraded)
            .map(|t| t.stage)
            .collect()
    }

    /// Total wall time across recorded stages
    pub fn total_duration_ms(&self) -> u64 {
        self.timings.iter().map(|t| t.duration_ms).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_transitions() {
        let order = [
            RunState::Pending,
            RunState::Fetching,
            RunState::Indicators,
            RunState::Signals,
            RunState::Patterns,
            RunState::Scenarios,
            RunState::Report,
            RunState::Assembling,
            RunState::Done,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        // no skipping
        assert!(!RunState::Pending.can_transition_to(RunState::Indicators));
        assert!(!RunState::Signals.can_transition_to(RunState::Scenarios));
        // no going back
        assert!(!RunState::Report.can_transition_to(RunState::Patterns));
    }

    #[test]
    fn test_any_active_state_may_fail() {
        for state in [
            RunState::Pending,
            RunState::Fetching,
            RunState::Scenarios,
            RunState::Assembling,
        ] {
            assert!(state.can_transition_to(RunState::Failed));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(!RunState::Done.can_transition_to(RunState::Failed));
        assert!(!RunState::Failed.can_transition_to(RunState::Pending));
        assert!(!RunState::Failed.can_transition_to(RunState::Failed));
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Patterns.is_terminal());
    }

    #[test]
    fn test_degraded_stages_in_order() {
        let mut run = AnalysisRun::new("AAPL", Timeframe::D1);
        run.timings = vec![
            StageTiming {
                stage: StageName::Fetch,
                started_at: Utc::now(),
                duration_ms: 5,
                attempts: 1,
                degraded: false,
            },
            StageTiming {
                stage: StageName::Patterns,
                started_at: Utc::now(),
                duration_ms: 12,
                attempts: 2,
                degraded: true,
            },
        ];
        assert_eq!(run.degraded_stages(), vec![StageName::Patterns]);
        assert_eq!(run.total_duration_ms(), 17);
    }
}
