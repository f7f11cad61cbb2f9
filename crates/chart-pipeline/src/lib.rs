//! Analysis orchestrator for chart-rs
//!
//! Drives one symbol/timeframe analysis through its stages: fetch,
//! indicators, signals, pattern recognition, trade scenarios, and the final
//! report. The orchestrator owns timeouts, retries, bounded concurrency
//! toward the reasoning service, cooperative cancellation, and the
//! degradation policy when a non-essential stage fails.

pub mod cancel;
pub mod config;
pub mod logging;
pub mod market;
pub mod orchestrator;
pub mod prompts;
pub mod stages;

pub use cancel::CancelToken;
pub use config::{PipelineConfig, PipelineConfigBuilder, StageConfig};
pub use market::{ChartImage, ChartRenderer, MarketDataProvider};
pub use orchestrator::{AnalysisPipeline, AnalysisPipelineBuilder};
