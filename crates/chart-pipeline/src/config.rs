//! Configuration for the analysis pipeline

use chart_core::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-stage settings for the reasoning-service stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Model identifier sent to the provider
    pub model: String,

    /// Wall-clock budget for a single attempt
    pub timeout: Duration,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: usize,
}

impl StageConfig {
    fn new(model: &str, timeout_secs: u64, max_tokens: usize) -> Self {
        Self {
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
            max_retries: 1,
            temperature: 0.2,
            max_tokens,
        }
    }
}

/// Configuration for one analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Candles requested from the market data provider
    pub candle_limit: usize,

    /// Budget for one market data fetch attempt
    pub fetch_timeout: Duration,

    /// Retries after the first fetch attempt
    pub fetch_retries: u32,

    /// Initial backoff duration for retries (doubles per attempt)
    pub retry_backoff_base: Duration,

    /// Concurrent in-flight reasoning-service calls across runs
    pub max_concurrent_llm: usize,

    /// Vision pattern recognition stage
    pub patterns: StageConfig,

    /// Trade scenario stage
    pub scenarios: StageConfig,

    /// Report synthesis stage
    pub report: StageConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            candle_limit: 250,
            fetch_timeout: Duration::from_secs(30),
            fetch_retries: 1,
            retry_backoff_base: Duration::from_secs(1),
            max_concurrent_llm: 4,
            patterns: StageConfig::new("gpt-4o", 60, 1024),
            scenarios: StageConfig::new("gpt-4o-mini", 45, 1536),
            report: StageConfig::new("gpt-4o-mini", 45, 2048),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Apply per-stage model overrides from the environment.
    ///
    /// Reads `VISION_MODEL`, `SCENARIO_MODEL`, and `REPORT_MODEL` when set.
    pub fn with_env_models(mut self) -> Self {
        if let Ok(model) = std::env::var("VISION_MODEL") {
            self.patterns.model = model;
        }
        if let Ok(model) = std::env::var("SCENARIO_MODEL") {
            self.scenarios.model = model;
        }
        if let Ok(model) = std::env::var("REPORT_MODEL") {
            self.report.model = model;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.candle_limit == 0 {
            return Err(AnalysisError::ConfigError(
                "candle_limit must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_llm == 0 {
            return Err(AnalysisError::ConfigError(
                "max_concurrent_llm must be greater than 0".to_string(),
            ));
        }
        for (name, stage) in [
            ("patterns", &self.patterns),
            ("scenarios", &self.scenarios),
            ("report", &self.report),
        ] {
            if stage.model.trim().is_empty() {
                return Err(AnalysisError::ConfigError(format!(
                    "{name} stage has no model configured"
                )));
            }
            if stage.timeout.is_zero() {
                return Err(AnalysisError::ConfigError(format!(
                    "{name} stage timeout must be greater than zero"
                )));
            }
            if stage.max_tokens == 0 {
                return Err(AnalysisError::ConfigError(format!(
                    "{name} stage max_tokens must be greater than 0"
                )));
            }
        }
        Ok(())
    }

    /// Get retry backoff duration for attempt number
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff_base * 2_u32.pow(attempt)
    }
}

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    candle_limit: Option<usize>,
    fetch_timeout: Option<Duration>,
    fetch_retries: Option<u32>,
    retry_backoff_base: Option<Duration>,
    max_concurrent_llm: Option<usize>,
    patterns: Option<StageConfig>,
    scenarios: Option<StageConfig>,
    report: Option<StageConfig>,
}

impl PipelineConfigBuilder {
    /// Set the number of candles requested per run
    pub fn candle_limit(mut self, limit: usize) -> Self {
        self.candle_limit = Some(limit);
        self
    }

    /// Set the market data fetch timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Set fetch retries
    pub fn fetch_retries(mut self, retries: u32) -> Self {
        self.fetch_retries = Some(retries);
        self
    }

    /// Set retry backoff base duration
    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    /// Set the concurrent reasoning-call limit
    pub fn max_concurrent_llm(mut self, limit: usize) -> Self {
        self.max_concurrent_llm = Some(limit);
        self
    }

    /// Replace the pattern stage settings
    pub fn patterns(mut self, stage: StageConfig) -> Self {
        self.patterns = Some(stage);
        self
    }

    /// Replace the scenario stage settings
    pub fn scenarios(mut self, stage: StageConfig) -> Self {
        self.scenarios = Some(stage);
        self
    }

    /// Replace the report stage settings
    pub fn report(mut self, stage: StageConfig) -> Self {
        self.report = Some(stage);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();

        let config = PipelineConfig {
            candle_limit: self.candle_limit.unwrap_or(defaults.candle_limit),
            fetch_timeout: self.fetch_timeout.unwrap_or(defaults.fetch_timeout),
            fetch_retries: self.fetch_retries.unwrap_or(defaults.fetch_retries),
            retry_backoff_base: self.retry_backoff_base.unwrap_or(defaults.retry_backoff_base),
            max_concurrent_llm: self.max_concurrent_llm.unwrap_or(defaults.max_concurrent_llm),
            patterns: self.patterns.unwrap_or(defaults.patterns),
            scenarios: self.scenarios.unwrap_or(defaults.scenarios),
            report: self.report.unwrap_or(defaults.report),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.candle_limit, 250);
        assert_eq!(config.patterns.max_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::builder()
            .candle_limit(500)
            .max_concurrent_llm(2)
            .fetch_timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        assert_eq!(config.candle_limit, 500);
        assert_eq!(config.max_concurrent_llm, 2);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let result = PipelineConfig::builder().max_concurrent_llm(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_blank_model() {
        let mut stage = PipelineConfig::default().patterns;
        stage.model = String::new();
        let result = PipelineConfig::builder().patterns(stage).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_retry_backoff() {
        let config = PipelineConfig::default();
        assert_eq!(config.retry_backoff(0), Duration::from_secs(1));
        assert_eq!(config.retry_backoff(1), Duration::from_secs(2));
        assert_eq!(config.retry_backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_env_model_overrides() {
        unsafe {
            std::env::set_var("VISION_MODEL", "qwen2-vl");
            std::env::set_var("REPORT_MODEL", "llama-3.3-70b");
        }
        let config = PipelineConfig::default().with_env_models();
        assert_eq!(config.patterns.model, "qwen2-vl");
        assert_eq!(config.report.model, "llama-3.3-70b");
        unsafe {
            std::env::remove_var("VISION_MODEL");
            std::env::remove_var("REPORT_MODEL");
        }
    }
}
