//! Stage prompts and response schemas
//!
//! Each reasoning stage gets a system prompt fixing its role and the exact
//! JSON shape it must return. Responses are parsed strictly; anything that
//! does not match the schema is rejected by the stage.

use chart_core::{PatternFinding, RiskAnalysis, SignalState};

pub const PATTERN_SYSTEM_PROMPT: &str = r#"You are a chart pattern recognition specialist.

You receive a rendered price chart and a summary of the computed technical state.
Identify classical chart patterns (triangles, flags, head and shoulders, double tops/bottoms,
channels, wedges) and describe the market structure.

Respond with ONLY a JSON object, no prose and no code fences, in exactly this shape:
{
  "patterns": [
    {
      "name": "string",
      "implication": "BULLISH" | "BEARISH" | "NEUTRAL" | null,
      "confidence": "LOW" | "MEDIUM" | "HIGH",
      "description": "string"
    }
  ],
  "market_structure": "TRENDING" | "RANGING" | "REVERSAL" | "UNCLEAR",
  "confidence": "LOW" | "MEDIUM" | "HIGH",
  "observations": ["string"]
}

Only report patterns you can actually see on the chart. An empty patterns array is a valid answer.
"#;

pub const SCENARIO_SYSTEM_PROMPT: &str = r#"You are a risk and trade-scenario analyst.

You receive the technical signal state, detected chart patterns, and key price levels.
Propose concrete trade scenarios with fully specified levels. Every scenario must respect:
- LONG: stop_loss < entry < every target, targets ascending
- SHORT: stop_loss > entry > every target, targets descending
- all levels positive prices near the current price

Respond with ONLY a JSON object, no prose and no code fences, in exactly this shape:
{
  "scenarios": [
    {
      "name": "string",
      "direction": "LONG" | "SHORT",
      "entry": number,
      "stop_loss": number,
      "targets": [number],
      "confidence": "LOW" | "MEDIUM" | "HIGH",
      "rationale": "string",
      "analyst_take": "string or omit"
    }
  ]
}

Two or three scenarios covering the plausible directions is ideal. Do not force a scenario
against strong evidence.
"#;

pub const REPORT_SYSTEM_PROMPT: &str = r#"You are a technical analysis report writer.

You receive the complete analysis: signal state, patterns, and validated trade scenarios.
Write the narrative and pick exactly one recommendation.

The recommendation MUST be one of:
- "BUY - <scenario name>" where the name matches a provided scenario exactly
- "SELL - <scenario name>" where the name matches a provided scenario exactly
- "WATCH"
- "WAIT"

Respond with ONLY a JSON object, no prose and no code fences, in exactly this shape:
{
  "summary": "two or three sentence executive summary",
  "narrative": "several paragraphs of analysis in markdown",
  "recommendation": "string from the vocabulary above"
}

Technical analysis is probabilistic; say so when conviction is low.
"#;

/// User prompt for the pattern stage: the chart summary the image rides on
pub fn pattern_user_prompt(signal: &SignalState) -> String {
    format!(
        "Analyze the attached {timeframe} chart for {symbol}.\n\
         Computed technical state: {summary}.\n\
         Family scores (trend/momentum/volatility/volume/levels): \
         {t}/{m}/{v}/{vol}/{l}.\n\
         Key levels: support {support}, resistance {resistance}.\n\
         Rule-based observations: {observations}.\n\
         Identify chart patterns and the market structure.",
        timeframe = signal.timeframe,
        symbol = signal.symbol,
        summary = signal.summary_line(),
        t = signal.family_scores.trend,
        m = signal.family_scores.momentum,
        v = signal.family_scores.volatility,
        vol = signal.family_scores.volume,
        l = signal.family_scores.levels,
        support = fmt_level(signal.key_levels.nearest_support),
        resistance = fmt_level(signal.key_levels.nearest_resistance),
        observations = fmt_observations(&signal.observations),
    )
}

/// User prompt for the scenario stage
pub fn scenario_user_prompt(
    signal: &SignalState,
    patterns: &PatternFinding,
    last_close: f64,
    atr: Option<f64>,
) -> String {
    let pattern_lines = if patterns.patterns.is_empty() {
        "none detected".to_string()
    } else {
        patterns
            .patterns
            .iter()
            .map(|p| format!("{} ({})", p.name, p.confidence))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Symbol {symbol} on the {timeframe} timeframe, last close {last_close:.2}.\n\
         Signal: {summary}.\n\
         Patterns: {pattern_lines}. Market structure: {structure}.\n\
         Key levels: support {support}, resistance {resistance}, pivot {pivot}.\n\
         ATR: {atr}.\n\
         Propose trade scenarios with exact entry, stop, and targets.",
        symbol = signal.symbol,
        timeframe = signal.timeframe,
        summary = signal.summary_line(),
        structure = patterns.market_structure,
        support = fmt_level(signal.key_levels.nearest_support),
        resistance = fmt_level(signal.key_levels.nearest_resistance),
        pivot = fmt_level(signal.key_levels.pivot),
        atr = fmt_level(atr),
    )
}

/// User prompt for the report stage
pub fn report_user_prompt(
    signal: &SignalState,
    patterns: &PatternFinding,
    risk: &RiskAnalysis,
) -> String {
    let scenario_lines = risk
        .scenarios
        .iter()
        .map(|s| {
            format!(
                "- \"{}\" ({}, entry {:.2}, stop {:.2}, first target {:.2}, rr {:.2}, {})",
                s.name,
                s.direction,
                s.entry,
                s.stop_loss,
                s.targets.first().copied().unwrap_or_default(),
                s.rr_ratio,
                s.confidence,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Write the report for {symbol} ({timeframe}).\n\
         Signal: {summary}.\n\
         Market structure: {structure}. Patterns: {pattern_count} detected.\n\
         Risk grade {grade}, best reward-to-risk {best_rr:.2}, sizing {sizing}.\n\
         Scenarios:\n{scenario_lines}\n\
         Pick the single recommendation per the vocabulary rules.",
        symbol = signal.symbol,
        timeframe = signal.timeframe,
        summary = signal.summary_line(),
        structure = patterns.market_structure,
        pattern_count = patterns.patterns.len(),
        grade = risk.grade,
        best_rr = risk.best_rr,
        sizing = risk.position_sizing,
    )
}

/// Corrective prompt sent once when the recommendation leaves the vocabulary
pub fn recommendation_retry_prompt(invalid: &str, risk: &RiskAnalysis) -> String {
    let names = risk
        .scenarios
        .iter()
        .map(|s| format!("\"{}\"", s.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Your recommendation \"{invalid}\" is not in the allowed vocabulary.\n\
         Allowed: \"BUY - <scenario>\", \"SELL - <scenario>\", \"WATCH\", \"WAIT\",\n\
         where <scenario> is one of: {names}.\n\
         Resend the SAME JSON object with a corrected recommendation."
    )
}

fn fmt_level(level: Option<f64>) -> String {
    level.map_or_else(|| "n/a".to_string(), |l| format!("{l:.2}"))
}

fn fmt_observations(observations: &[String]) -> String {
    if observations.is_empty() {
        "none".to_string()
    } else {
        observations.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_core::{
        Bias, ConfidenceTier, FamilyScores, KeyLevels, MarketStructure, SignalState, Timeframe,
        TrendLabel, VolatilityTier,
    };

    fn signal() -> SignalState {
        SignalState {
            symbol: "AAPL".to_string(),
            timeframe: Timeframe::D1,
            bias: Bias::Bullish,
            strength: 70,
            trend: TrendLabel::Uptrend,
            volatility: VolatilityTier::Normal,
            family_scores: FamilyScores {
                trend: 1,
                momentum: 1,
                volatility: 0,
                volume: 1,
                levels: 0,
            },
            key_levels: KeyLevels {
                nearest_support: Some(180.0),
                nearest_resistance: Some(195.5),
                pivot: Some(185.0),
            },
            confluences: vec![],
            observations: vec![],
        }
    }

    #[test]
    fn test_pattern_prompt_mentions_levels() {
        let prompt = pattern_user_prompt(&signal());
        assert!(prompt.contains("AAPL"));
        assert!(prompt.contains("support 180.00"));
        assert!(prompt.contains("resistance 195.50"));
    }

    #[test]
    fn test_scenario_prompt_handles_missing_atr() {
        let finding = PatternFinding {
            patterns: vec![],
            market_structure: MarketStructure::Trending,
            confidence: ConfidenceTier::Medium,
            observations: vec![],
            note: None,
        };
        let prompt = scenario_user_prompt(&signal(), &finding, 190.0, None);
        assert!(prompt.contains("ATR: n/a"));
        assert!(prompt.contains("none detected"));
    }

    #[test]
    fn test_system_prompts_state_the_schema() {
        assert!(PATTERN_SYSTEM_PROMPT.contains("market_structure"));
        assert!(SCENARIO_SYSTEM_PROMPT.contains("stop_loss"));
        assert!(REPORT_SYSTEM_PROMPT.contains("\"WATCH\""));
    }
}
