//! Core data model for chart-rs
//!
//! This crate defines the types shared by every stage of the chart analysis
//! pipeline:
//!
//! - Candle series and timeframes
//! - Computed indicator families
//! - Rule-based signal state
//! - Pattern findings, trade scenarios, and risk aggregates
//! - The final report and the run record that ties a pipeline pass together

pub mod candle;
pub mod error;
pub mod indicator;
pub mod pattern;
pub mod report;
pub mod run;
pub mod scenario;
pub mod signal;

pub use candle::{Candle, CandleSeries, Timeframe};
pub use error::{AnalysisError, Result};
pub use indicator::{
    FibLevel, FibonacciLevels, IndicatorSeries, IndicatorSet, LevelIndicators, MomentumIndicators,
    PivotPoints, TrendIndicators, VolatilityIndicators, VolumeIndicators,
};
pub use pattern::{ConfidenceTier, DetectedPattern, MarketStructure, PatternFinding};
pub use report::{Recommendation, Report};
pub use run::{AnalysisRun, RunFailure, RunState, StageName, StageTiming};
pub use scenario::{Direction, PositionSizing, RiskAnalysis, RiskGrade, Scenario};
pub use signal::{Bias, Confluence, FamilyScores, KeyLevels, SignalState, TrendLabel, VolatilityTier};
