//! Vision pattern recognition stage

use chart_core::{Bias, ConfidenceTier, DetectedPattern, MarketStructure, PatternFinding, Result, SignalState};
use chart_llm::{CompletionRequest, LLMProvider, Message};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::StageConfig;
use crate::market::ChartImage;
use crate::prompts;
use crate::stages::{extract_json, malformed, map_llm_error};

const STAGE: &str = "patterns";

/// Strict response schema for the pattern stage
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternResponse {
    patterns: Vec<PatternDto>,
    market_structure: MarketStructure,
    confidence: ConfidenceTier,
    #[serde(default)]
    observations: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternDto {
    name: String,
    #[serde(default)]
    implication: Option<Bias>,
    confidence: ConfidenceTier,
    description: String,
}

/// Sends the rendered chart plus signal summary to a vision model and
/// parses the pattern finding out of the reply.
pub struct PatternRecognizer {
    provider: Arc<dyn LLMProvider>,
    config: StageConfig,
}

impl PatternRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: StageConfig) -> Self {
        Self { provider, config }
    }

    /// One completion attempt. Timeout and retries belong to the caller.
    #[instrument(skip(self, chart, signal), fields(symbol = signal.symbol))]
    pub async fn analyze(&self, chart: &ChartImage, signal: &SignalState) -> Result<PatternFinding> {
        let request = CompletionRequest::builder(&self.config.model)
            .system(prompts::PATTERN_SYSTEM_PROMPT)
            .add_message(Message::user_with_image(
                prompts::pattern_user_prompt(signal),
                chart.media_type.clone(),
                chart.data.clone(),
            ))
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
        let parsed: PatternResponse =
            serde_json::from_str(json).map_err(|e| malformed(STAGE, e))?;

        debug!(
            patterns = parsed.patterns.len(),
            structure = %parsed.market_structure,
            "pattern response parsed"
        );
        Ok(PatternFinding {
            patterns: parsed
                .patterns
                .into_iter()
                .map(|p| DetectedPattern {
                    name: p.name,
                    implication: p.implication,
                    confidence: p.confidence,
                    description: p.description,
                })
                .collect(),
            market_structure: parsed.market_structure,
            confidence: parsed.confidence,
            observations: parsed.observations,
            note: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_core::AnalysisError;
    use chart_llm::{CompletionResponse, LLMError, Result as LLMResult, StopReason, TokenUsage};

    struct CannedProvider {
        reply: std::result::Result<String, ()>,
    }

    #[async_trait::async_trait]
    impl LLMProvider for CannedProvider {
        async fn complete(&self, _request: CompletionRequest) -> LLMResult<CompletionResponse> {
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    message: Message::assistant(text.clone()),
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage {
                        input_tokens: 10,
                        output_tokens: 10,
                    },
                }),
                Err(()) => Err(LLMError::RequestFailed("boom".to_string())),
            }
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn signal() -> SignalState {
        use chart_core::{FamilyScores, KeyLevels, Timeframe, TrendLabel, VolatilityTier};
        SignalState {
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
        }
    }

    fn recognizer(reply: std::result::Result<String, ()>) -> PatternRecognizer {
        let config = crate::PipelineConfig::default().patterns;
        PatternRecognizer::new(Arc::new(CannedProvider { reply }), config)
    }

    #[tokio::test]
    async fn test_parses_valid_response() {
        let reply = r#"{
            "patterns": [
                {"name": "Ascending triangle", "implication": "BULLISH",
                 "confidence": "HIGH", "description": "Flat top, rising lows"}
            ],
            "market_structure": "TRENDING",
            "confidence": "MEDIUM",
            "observations": ["Higher lows since the gap"]
        }"#;
        let finding = recognizer(Ok(reply.to_string()))
            .analyze(&ChartImage::png("data"), &signal())
            .await
            .unwrap();
        assert_eq!(finding.patterns.len(), 1);
        assert_eq!(finding.patterns[0].name, "Ascending triangle");
        assert_eq!(finding.market_structure, MarketStructure::Trending);
        assert!(!finding.is_degraded());
    }

    #[tokio::test]
    async fn test_rejects_unknown_vocabulary() {
        let reply = r#"{
            "patterns": [],
            "market_structure": "SOMETHING_ELSE",
            "confidence": "MEDIUM",
            "observations": []
        }"#;
        let err = recognizer(Ok(reply.to_string()))
            .analyze(&ChartImage::png("data"), &signal())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedUpstreamResponse { .. }));
    }

    #[tokio::test]
    async fn test_rejects_prose_without_json() {
        let err = recognizer(Ok("I see a triangle, looks bullish.".to_string()))
            .analyze(&ChartImage::png("data"), &signal())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedUpstreamResponse { .. }));
    }

    #[tokio::test]
    async fn test_maps_provider_failure() {
        let err = recognizer(Err(()))
            .analyze(&ChartImage::png("data"), &signal())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UpstreamUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_accepts_fenced_json() {
        let reply = "```json\n{\"patterns\": [], \"market_structure\": \"RANGING\", \
                     \"confidence\": \"LOW\", \"observations\": []}\n```";
        let finding = recognizer(Ok(reply.to_string()))
            .analyze(&ChartImage::png("data"), &signal())
            .await
            .unwrap();
        assert_eq!(finding.market_structure, MarketStructure::Ranging);
    }
}
