//! Error types for chart analysis operations

use thiserror::Error;

/// Chart analysis specific errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Candle series too short for the requested computation
    #[error("Insufficient data: need at least {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Candle series violates a structural invariant
    #[error("Invalid series: {0}")]
    InvalidSeries(String),

    /// Invalid stock symbol provided
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Data not available for the requested symbol
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Rate limit exceeded for an external service
    #[error("Rate limit exceeded for {provider}")]
    RateLimited { provider: String },

    /// External reasoning service unreachable or timed out for a stage
    #[error("Upstream unavailable in {stage} stage: {reason}")]
    UpstreamUnavailable { stage: String, reason: String },

    /// External reasoning service replied with something the stage schema rejects
    #[error("Malformed upstream response in {stage} stage: {reason}")]
    MalformedUpstreamResponse { stage: String, reason: String },

    /// Technical indicator calculation error
    #[error("Technical indicator error: {0}")]
    IndicatorError(String),

    /// A single scenario failed level or reward-to-risk validation
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// Scenario generation produced output but nothing survived validation
    #[error("No valid trade scenarios could be constructed")]
    NoValidScenarios,

    /// Chart image rendering failed
    #[error("Chart rendering failed: {0}")]
    RenderFailed(String),

    /// Run was cancelled before completion
    #[error("Analysis run cancelled")]
    Cancelled,

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl AnalysisError {
    /// Whether the orchestrator may substitute a degraded result for this
    /// error instead of failing the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. }
                | Self::MalformedUpstreamResponse { .. }
                | Self::RateLimited { .. }
        )
    }
}

/// Result type alias for chart analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;
