//! Report synthesis stage and deterministic markdown assembly

use chart_core::{
    Bias, PatternFinding, Recommendation, Report, Result, RiskAnalysis, Scenario, SignalState,
};
use chart_llm::{CompletionRequest, LLMProvider, Message};
use chrono::Utc;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::StageConfig;
use crate::prompts;
use crate::stages::{extract_json, malformed, map_llm_error};

const STAGE: &str = "report";

/// Minimum reward-to-risk before the fallback commits to a trade
const FALLBACK_ACTIONABLE_RR: f64 = 1.5;
/// Minimum best reward-to-risk before the fallback suggests watching
const FALLBACK_WATCH_RR: f64 = 1.0;

/// Strict response schema for the report stage
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReportResponse {
    summary: String,
    narrative: String,
    recommendation: String,
}

/// Narrative pieces produced by the report stage, before assembly
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub summary: String,
    pub narrative: String,
    pub recommendation: Recommendation,
}

/// Writes the narrative and picks the recommendation, then assembles the
/// final markdown deterministically.
pub struct ReportSynthesizer {
    provider: Arc<dyn LLMProvider>,
    config: StageConfig,
}

impl ReportSynthesizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: StageConfig) -> Self {
        Self { provider, config }
    }

    /// One drafting pass with at most one corrective round-trip.
    ///
    /// A recommendation outside the vocabulary, or one naming a scenario
    /// that was never proposed, triggers a single corrective prompt. A
    /// second miss is a malformed response and the caller falls back.
    #[instrument(skip(self, signal, patterns, risk), fields(symbol = signal.symbol))]
    pub async fn synthesize(
        &self,
        signal: &SignalState,
        patterns: &PatternFinding,
        risk: &RiskAnalysis,
    ) -> Result<ReportDraft> {
        let user = Message::user(prompts::report_user_prompt(signal, patterns, risk));
        let response = self
            .provider
            .complete(self.request(vec![user.clone()]))
            .await
            .map_err(|e| map_llm_error(STAGE, e))?;
        let text = response
            .message
            .text()
            .ok_or_else(|| malformed(STAGE, "response carried no text"))?
            .to_string();

        match self.parse_draft(&text, risk) {
            Ok(draft) => Ok(draft),
            Err(invalid) => {
                warn!(recommendation = %invalid, "recommendation rejected, sending corrective prompt");
                let retry = vec![
                    user,
                    Message::assistant(text),
                    Message::user(prompts::recommendation_retry_prompt(&invalid, risk)),
                ];
                let response = self
                    .provider
                    .complete(self.request(retry))
                    .await
                    .map_err(|e| map_llm_error(STAGE, e))?;
                let text = response
                    .message
                    .text()
                    .ok_or_else(|| malformed(STAGE, "retry response carried no text"))?;
                self.parse_draft(text, risk).map_err(|invalid| {
                    malformed(
                        STAGE,
                        format!("recommendation '{invalid}' invalid after corrective retry"),
                    )
                })
            }
        }
    }

    /// Deterministic draft used when the reasoning service cannot produce
    /// a valid one. The recommendation follows the rule-based signal.
    pub fn fallback(&self, signal: &SignalState, risk: &RiskAnalysis) -> ReportDraft {
        let recommendation = fallback_recommendation(signal, risk);
        let summary = format!(
            "{} closed with a {} read ({} strength {}). Narrative synthesis was \
             unavailable; the recommendation below is rule-derived.",
            signal.symbol,
            signal.bias,
            signal.trend,
            signal.strength,
        );
        let narrative = format!(
            "Automated readout only. Signal: {}. Risk grade {} with best \
             reward-to-risk {:.2}; suggested sizing {}.",
            signal.summary_line(),
            risk.grade,
            risk.best_rr,
            risk.position_sizing,
        );
        debug!(recommendation = %recommendation, "using fallback report draft");
        ReportDraft {
            summary,
            narrative,
            recommendation,
        }
    }

    fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        let mut builder = CompletionRequest::builder(&self.config.model)
            .system(prompts::REPORT_SYSTEM_PROMPT)
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature);
        for message in messages {
            builder = builder.add_message(message);
        }
        builder.build()
    }

    /// Parse one reply. `Ok` is a usable draft; `Err` carries the offending
    /// recommendation string for the corrective prompt. Structural failures
    /// (no JSON, schema mismatch) are reported the same way since the
    /// corrective prompt restates the full output contract.
    fn parse_draft(&self, text: &str, risk: &RiskAnalysis) -> std::result::Result<ReportDraft, String> {
        let Some(json) = extract_json(text) else {
            return Err("<no JSON object>".to_string());
        };
        let parsed: ReportResponse = match serde_json::from_str(json) {
            Ok(parsed) => parsed,
            Err(_) => return Err("<schema mismatch>".to_string()),
        };
        let recommendation = match Recommendation::from_str(&parsed.recommendation) {
            Ok(r) => r,
            Err(_) => return Err(parsed.recommendation),
        };
        match &recommendation {
            Recommendation::Buy { scenario } | Recommendation::Sell { scenario } => {
                if !risk.scenarios.iter().any(|s| &s.name == scenario) {
                    return Err(parsed.recommendation);
                }
            }
            Recommendation::Watch | Recommendation::Wait => {}
        }
        Ok(ReportDraft {
            summary: parsed.summary,
            narrative: parsed.narrative,
            recommendation,
        })
    }
}

/// Rule-derived recommendation: trade only when a scenario agrees with the
/// bias and clears the reward-to-risk bar, otherwise watch or wait.
fn fallback_recommendation(signal: &SignalState, risk: &RiskAnalysis) -> Recommendation {
    let aligned = risk
        .scenarios
        .iter()
        .filter(|s| match signal.bias {
            Bias::Bullish => s.direction == chart_core::Direction::Long,
            Bias::Bearish => s.direction == chart_core::Direction::Short,
            Bias::Neutral => false,
        })
        .max_by(|a, b| a.rr_ratio.total_cmp(&b.rr_ratio));

    if let Some(best) = aligned {
        if best.rr_ratio >= FALLBACK_ACTIONABLE_RR {
            return match signal.bias {
                Bias::Bullish => Recommendation::Buy {
                    scenario: best.name.clone(),
                },
                Bias::Bearish => Recommendation::Sell {
                    scenario: best.name.clone(),
                },
                Bias::Neutral => Recommendation::Wait,
            };
        }
    }
    if risk.best_rr >= FALLBACK_WATCH_RR {
        Recommendation::Watch
    } else {
        Recommendation::Wait
    }
}

/// Assemble the final markdown document. This never consults the reasoning
/// service, so a report always renders even for degraded runs.
pub fn assemble_report(
    signal: &SignalState,
    patterns: &PatternFinding,
    risk: &RiskAnalysis,
    draft: ReportDraft,
    caveats: Vec<String>,
) -> Report {
    let generated_at = Utc::now();
    let mut md = String::new();

    md.push_str(&format!(
        "# {} Technical Analysis ({})\n\n",
        signal.symbol, signal.timeframe
    ));
    md.push_str(&format!(
        "_Generated {}_\n\n",
        generated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    md.push_str(&format!("**Recommendation: {}**\n\n", draft.recommendation));

    md.push_str("## Summary\n\n");
    md.push_str(&draft.summary);
    md.push_str("\n\n");

    md.push_str("## Signal\n\n");
    md.push_str(&format!("- Read: {}\n", signal.summary_line()));
    md.push_str(&format!(
        "- Family scores (trend/momentum/volatility/volume/levels): {}/{}/{}/{}/{}\n",
        signal.family_scores.trend,
        signal.family_scores.momentum,
        signal.family_scores.volatility,
        signal.family_scores.volume,
        signal.family_scores.levels,
    ));
    if let Some(support) = signal.key_levels.nearest_support {
        md.push_str(&format!("- Nearest support: {support:.2}\n"));
    }
    if let Some(resistance) = signal.key_levels.nearest_resistance {
        md.push_str(&format!("- Nearest resistance: {resistance:.2}\n"));
    }
    for observation in &signal.observations {
        md.push_str(&format!("- {observation}\n"));
    }
    for confluence in &signal.confluences {
        md.push_str(&format!(
            "- Confluence: {} ({})\n",
            confluence.name,
            confluence.evidence.join("; ")
        ));
    }
    md.push('\n');

    md.push_str("## Patterns\n\n");
    md.push_str(&format!(
        "Market structure: {} ({} confidence)\n\n",
        patterns.market_structure, patterns.confidence
    ));
    if patterns.patterns.is_empty() {
        md.push_str("No classical patterns detected.\n\n");
    } else {
        for pattern in &patterns.patterns {
            md.push_str(&format!(
                "- **{}** ({}): {}\n",
                pattern.name, pattern.confidence, pattern.description
            ));
        }
        md.push('\n');
    }

    md.push_str("## Scenarios\n\n");
    for scenario in &risk.scenarios {
        md.push_str(&render_scenario(scenario));
    }
    md.push_str(&format!(
        "Risk grade **{}**, best reward-to-risk {:.2}, average {:.2}. Sizing: {} ({}).\n\n",
        risk.grade,
        risk.best_rr,
        risk.average_rr,
        risk.position_sizing,
        risk.position_sizing.risk_band(),
    ));

    md.push_str("## Analysis\n\n");
    md.push_str(&draft.narrative);
    md.push_str("\n\n");

    if !caveats.is_empty() {
        md.push_str("## Caveats\n\n");
        for caveat in &caveats {
            md.push_str(&format!("- {caveat}\n"));
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
    md.push_str(
        "*Automated technical analysis for informational purposes only. \
         Not financial advice.*\n",
    );

    Report {
        symbol: signal.symbol.clone(),
        timeframe: signal.timeframe,
        generated_at,
        recommendation: draft.recommendation,
        summary: draft.summary,
        narrative: draft.narrative,
        markdown: md,
        caveats,
    }
}

fn render_scenario(scenario: &Scenario) -> String {
    let targets = scenario
        .targets
        .iter()
        .map(|t| format!("{t:.2}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut block = format!(
        "### {} ({})\n\n\
         - Entry {:.2}, stop {:.2}, targets {}\n\
         - Reward-to-risk {:.2}, confidence {}\n\
         - {}\n",
        scenario.name,
        scenario.direction,
        scenario.entry,
        scenario.stop_loss,
        targets,
        scenario.rr_ratio,
        scenario.confidence,
        scenario.rationale,
    );
    if let Some(take) = &scenario.analyst_take {
        block.push_str(&format!("- Analyst take: {take}\n"));
    }
    block.push('\n');
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_core::{
        ConfidenceTier, Direction, FamilyScores, KeyLevels, MarketStructure, Timeframe,
        TrendLabel, VolatilityTier,
    };
    use chart_llm::{CompletionResponse, Result as LLMResult, StopReason, TokenUsage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| (*r).to_string()).collect()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(&self, _request: CompletionRequest) -> LLMResult<CompletionResponse> {
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "<script exhausted>".to_string());
            Ok(CompletionResponse {
                message: Message::assistant(reply),
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 10,
                },
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn signal() -> SignalState {
        SignalState {
            symbol: "AAPL".to_string(),
            timeframe: Timeframe::D1,
            bias: Bias::Bullish,
            strength: 60,
            trend: TrendLabel::Uptrend,
            volatility: VolatilityTier::Normal,
            family_scores: FamilyScores::default(),
            key_levels: KeyLevels {
                nearest_support: Some(95.0),
                nearest_resistance: Some(110.0),
                pivot: Some(100.0),
            },
            confluences: vec![],
            observations: vec![],
        }
    }

    fn finding() -> PatternFinding {
        PatternFinding {
            patterns: vec![],
            market_structure: MarketStructure::Trending,
            confidence: ConfidenceTier::Medium,
            observations: vec![],
            note: None,
        }
    }

    fn risk() -> RiskAnalysis {
        let scenario = Scenario {
            name: "Breakout continuation".to_string(),
            direction: Direction::Long,
            entry: 100.0,
            stop_loss: 95.0,
            targets: vec![110.0],
            rr_ratio: 0.0,
            confidence: ConfidenceTier::High,
            rationale: "test".to_string(),
            analyst_take: None,
        }
        .validate()
        .unwrap();
        RiskAnalysis::from_scenarios(vec![scenario], Some(2.0), false).unwrap()
    }

    fn synthesizer(replies: &[&str]) -> ReportSynthesizer {
        let config = crate::PipelineConfig::default().report;
        ReportSynthesizer::new(Arc::new(ScriptedProvider::new(replies)), config)
    }

    #[tokio::test]
    async fn test_valid_draft_first_try() {
        let reply = r#"{"summary": "Looks strong.", "narrative": "Up and to the right.",
            "recommendation": "BUY - Breakout continuation"}"#;
        let draft = synthesizer(&[reply])
            .synthesize(&signal(), &finding(), &risk())
            .await
            .unwrap();
        assert_eq!(
            draft.recommendation,
            Recommendation::Buy {
                scenario: "Breakout continuation".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_corrective_retry_recovers() {
        let bad = r#"{"summary": "s", "narrative": "n", "recommendation": "STRONG BUY"}"#;
        let good = r#"{"summary": "s", "narrative": "n", "recommendation": "WATCH"}"#;
        let draft = synthesizer(&[bad, good])
            .synthesize(&signal(), &finding(), &risk())
            .await
            .unwrap();
        assert_eq!(draft.recommendation, Recommendation::Watch);
    }

    #[tokio::test]
    async fn test_unknown_scenario_name_rejected_twice() {
        let bad = r#"{"summary": "s", "narrative": "n", "recommendation": "BUY - Imaginary"}"#;
        let err = synthesizer(&[bad, bad])
            .synthesize(&signal(), &finding(), &risk())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            chart_core::AnalysisError::MalformedUpstreamResponse { .. }
        ));
    }

    #[test]
    fn test_fallback_buys_aligned_scenario() {
        let draft = synthesizer(&[]).fallback(&signal(), &risk());
        assert_eq!(
            draft.recommendation,
            Recommendation::Buy {
                scenario: "Breakout continuation".to_string()
            }
        );
    }

    #[test]
    fn test_fallback_waits_on_neutral_low_rr() {
        let mut s = signal();
        s.bias = Bias::Neutral;
        let scenario = Scenario {
            name: "Weak bounce".to_string(),
            direction: Direction::Long,
            entry: 100.0,
            stop_loss: 95.0,
            targets: vec![102.0],
            rr_ratio: 0.0,
            confidence: ConfidenceTier::Low,
            rationale: "test".to_string(),
            analyst_take: None,
        }
        .validate()
        .unwrap();
        let risk = RiskAnalysis::from_scenarios(vec![scenario], Some(2.0), true).unwrap();
        let draft = synthesizer(&[]).fallback(&s, &risk);
        assert_eq!(draft.recommendation, Recommendation::Wait);
    }

    #[test]
    fn test_assembled_markdown_carries_sections() {
        let draft = ReportDraft {
            summary: "Strong uptrend.".to_string(),
            narrative: "Detailed analysis here.".to_string(),
            recommendation: Recommendation::Watch,
        };
        let report = assemble_report(
            &signal(),
            &finding(),
            &risk(),
            draft,
            vec!["Pattern analysis unavailable: timeout".to_string()],
        );
        assert!(report.markdown.contains("# AAPL Technical Analysis"));
        assert!(report.markdown.contains("**Recommendation: WATCH**"));
        assert!(report.markdown.contains("## Scenarios"));
        assert!(report.markdown.contains("## Caveats"));
        assert!(report.markdown.contains("Not financial advice"));
        assert_eq!(report.caveats.len(), 1);
    }
}
