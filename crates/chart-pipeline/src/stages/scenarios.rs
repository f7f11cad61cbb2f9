//! Trade scenario and risk analysis stage

use chart_core::{
    Bias, ConfidenceTier, Direction, PatternFinding, Result, RiskAnalysis, Scenario, SignalState,
};
use chart_llm::{CompletionRequest, LLMProvider, Message};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::StageConfig;
use crate::prompts;
use crate::stages::{extract_json, malformed, map_llm_error};

const STAGE: &str = "scenarios";

/// Stop distance in ATRs for fallback scenarios
const FALLBACK_STOP_ATR: f64 = 1.5;
/// Target distance in ATRs for fallback scenarios
const FALLBACK_TARGET_ATR: f64 = 3.0;
/// ATR substitute when the indicator never warmed up, as a price fraction
const FALLBACK_ATR_FRACTION: f64 = 0.02;

/// Strict response schema for the scenario stage
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioResponse {
    scenarios: Vec<ScenarioDto>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioDto {
    name: String,
    direction: Direction,
    entry: f64,
    stop_loss: f64,
    targets: Vec<f64>,
    confidence: ConfidenceTier,
    rationale: String,
    #[serde(default)]
    analyst_take: Option<String>,
}

impl ScenarioDto {
    fn into_scenario(self) -> Scenario {
        Scenario {
            name: self.name,
            direction: self.direction,
            entry: self.entry,
            stop_loss: self.stop_loss,
            targets: self.targets,
            rr_ratio: 0.0,
            confidence: self.confidence,
            rationale: self.rationale,
            analyst_take: self.analyst_take,
        }
    }
}

/// Turns the signal state and pattern finding into validated trade
/// scenarios with risk aggregates.
pub struct ScenarioAnalyst {
    provider: Arc<dyn LLMProvider>,
    config: StageConfig,
}

impl ScenarioAnalyst {
    pub fn new(provider: Arc<dyn LLMProvider>, config: StageConfig) -> Self {
        Self { provider, config }
    }

    /// One completion attempt. Scenarios that fail validation are dropped
    /// with a warning; a response whose scenarios ALL fail validation is
    /// [`AnalysisError::NoValidScenarios`].
    #[instrument(skip(self, signal, patterns), fields(symbol = signal.symbol))]
    pub async fn analyze(
        &self,
        signal: &SignalState,
        patterns: &PatternFinding,
        last_close: f64,
        atr: Option<f64>,
    ) -> Result<RiskAnalysis> {
        let request = CompletionRequest::builder(&self.config.model)
            .system(prompts::SCENARIO_SYSTEM_PROMPT)
            .add_message(Message::user(prompts::scenario_user_prompt(
                signal, patterns, last_close, atr,
            )))
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature)
            .build();

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| map_llm_error(STAGE, e))?;
        let text = response
            .message
            .text()
            .ok_or_else(|| malformed(STAGE, "response carried no text"))?;
        let json = extract_json(text).ok_or_else(|| malformed(STAGE, "no JSON object in response"))?;
        let parsed: ScenarioResponse =
            serde_json::from_str(json).map_err(|e| malformed(STAGE, e))?;

        if parsed.scenarios.is_empty() {
            return Err(malformed(STAGE, "response contained no scenarios"));
        }

        let mut valid = Vec::with_capacity(parsed.scenarios.len());
        for dto in parsed.scenarios {
            match dto.into_scenario().validate() {
                Ok(scenario) => valid.push(scenario),
                Err(e) => warn!(error = %e, "dropping invalid scenario"),
            }
        }
        debug!(valid = valid.len(), "scenario validation complete");

        let atr_percent = atr.map(|a| a / last_close * 100.0);
        RiskAnalysis::from_scenarios(valid, atr_percent, false)
    }

    /// Deterministic scenarios from key levels and ATR, used when the
    /// reasoning service is unavailable. Always yields a long and a short
    /// setup; conviction is capped at the signal's own read.
    pub fn fallback(
        &self,
        signal: &SignalState,
        last_close: f64,
        atr: Option<f64>,
    ) -> Result<RiskAnalysis> {
        let atr_value = atr.unwrap_or(last_close * FALLBACK_ATR_FRACTION);

        let long_stop = signal
            .key_levels
            .nearest_support
            .unwrap_or(last_close - FALLBACK_STOP_ATR * atr_value)
            .min(last_close - 0.25 * atr_value);
        let long_target = signal
            .key_levels
            .nearest_resistance
            .unwrap_or(last_close + FALLBACK_TARGET_ATR * atr_value)
            .max(last_close + 0.25 * atr_value);
        let short_stop = signal
            .key_levels
            .nearest_resistance
            .unwrap_or(last_close + FALLBACK_STOP_ATR * atr_value)
            .max(last_close + 0.25 * atr_value);
        let short_target = signal
            .key_levels
            .nearest_support
            .unwrap_or(last_close - FALLBACK_TARGET_ATR * atr_value)
            .min(last_close - 0.25 * atr_value);

        let confidence = match signal.bias {
            Bias::Neutral => ConfidenceTier::Low,
            Bias::Bullish | Bias::Bearish => ConfidenceTier::Medium,
        };

        let candidates = vec![
            Scenario {
                name: "Support bounce".to_string(),
                direction: Direction::Long,
                entry: last_close,
                stop_loss: long_stop,
                targets: vec![long_target],
                rr_ratio: 0.0,
                confidence: if signal.bias == Bias::Bullish {
                    confidence
                } else {
                    ConfidenceTier::Low
                },
                rationale: "Rule-derived long from nearest support and ATR".to_string(),
                analyst_take: None,
            },
            Scenario {
                name: "Resistance rejection".to_string(),
                direction: Direction::Short,
                entry: last_close,
                stop_loss: short_stop,
                targets: vec![short_target],
                rr_ratio: 0.0,
                confidence: if signal.bias == Bias::Bearish {
                    confidence
                } else {
                    ConfidenceTier::Low
                },
                rationale: "Rule-derived short from nearest resistance and ATR".to_string(),
                analyst_take: None,
            },
        ];

        let mut valid = Vec::with_capacity(candidates.len());
        for scenario in candidates {
            match scenario.validate() {
                Ok(s) => valid.push(s),
                Err(e) => warn!(error = %e, "dropping degenerate fallback scenario"),
            }
        }
        let atr_percent = atr.map(|a| a / last_close * 100.0);
        RiskAnalysis::from_scenarios(valid, atr_percent, true)
    }
}
