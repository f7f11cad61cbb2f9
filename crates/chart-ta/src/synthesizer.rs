//! Rule-based signal synthesis from an indicator set
//!
//! Every rule here is a fixed threshold comparison over already-computed
//! indicator values. No I/O and no tie-breaking on anything unordered, so
//! the same indicator set always yields the same signal state.

use chart_core::{
    Bias, Confluence, FamilyScores, IndicatorSet, KeyLevels, SignalState, TrendLabel,
    VolatilityTier,
};
use tracing::{debug, instrument};

use crate::momentum::{RSI_OVERBOUGHT, RSI_OVERSOLD};

/// Weighted raw score at or above this magnitude commits to a direction
pub const BIAS_THRESHOLD: i32 = 20;

/// Relative volume below this counts as no participation
const VOLUME_DRY_UP: f64 = 0.5;

/// Bars looked back for the OBV slope
const OBV_LOOKBACK: usize = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalSynthesizer;

impl SignalSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Derive the full signal state for one indicator set
    #[instrument(skip(self, set), fields(symbol = set.symbol))]
    pub fn synthesize(&self, set: &IndicatorSet) -> SignalState {
        let mut observations = Vec::new();

        let (trend_score, trend_label) = score_trend(set, &mut observations);
        let momentum_score = score_momentum(set, &mut observations);
        let (volatility_score, volatility_tier) = score_volatility(set, &mut observations);
        let volume_score = score_volume(set, &mut observations);
        let key_levels = derive_key_levels(set);
        let levels_score = score_levels(set, &key_levels, &mut observations);

        let family_scores = FamilyScores {
            trend: trend_score,
            momentum: momentum_score,
            volatility: volatility_score,
            volume: volume_score,
            levels: levels_score,
        };
        let raw = family_scores.weighted_raw();
        let bias = if raw >= BIAS_THRESHOLD {
            Bias::Bullish
        } else if raw <= -BIAS_THRESHOLD {
            Bias::Bearish
        } else {
            Bias::Neutral
        };
        let strength = raw.unsigned_abs().min(100) as u8;

        let confluences = derive_confluences(set, &family_scores, &key_levels);

        debug!(%bias, strength, raw, "signal state synthesized");
        SignalState {
            symbol: set.symbol.clone(),
            timeframe: set.timeframe,
            bias,
            strength,
            trend: trend_label,
            volatility: volatility_tier,
            family_scores,
            key_levels,
            confluences,
            observations,
        }
    }
}

/// Price position against the available moving averages.
///
/// Majority above votes +1, majority below votes -1. Strong labels need a
/// clean sweep plus a 20-over-50 stack in the same direction.
fn score_trend(set: &IndicatorSet, observations: &mut Vec<String>) -> (i8, TrendLabel) {
    let price = set.last_close;
    let mas = [
        set.trend.sma_20.latest(),
        set.trend.sma_50.latest(),
        set.trend.sma_100.latest(),
        set.trend.sma_200.latest(),
        set.trend.ema_20.latest(),
        set.trend.ema_50.latest(),
        set.trend.ema_100.latest(),
        set.trend.ema_200.latest(),
    ];
    let available: Vec<f64> = mas.into_iter().flatten().collect();
    if available.is_empty() {
        observations.push("Trend: no moving average has enough history".to_string());
        return (0, TrendLabel::Sideways);
    }
    let above = available.iter().filter(|&&ma| price > ma).count();
    let below = available.len() - above;

    let stacked_up = matches!(
        (set.trend.sma_20.latest(), set.trend.sma_50.latest()),
        (Some(fast), Some(slow)) if fast > slow
    );
    let stacked_down = matches!(
        (set.trend.sma_20.latest(), set.trend.sma_50.latest()),
        (Some(fast), Some(slow)) if fast < slow
    );

    let (score, label) = if above == available.len() && stacked_up {
        (1, TrendLabel::StrongUptrend)
    } else if below == available.len() && stacked_down {
        (-1, TrendLabel::StrongDowntrend)
    } else if above > below {
        (1, TrendLabel::Uptrend)
    } else if below > above {
        (-1, TrendLabel::Downtrend)
    } else {
        (0, TrendLabel::Sideways)
    };

    observations.push(format!(
        "Trend: price above {above}/{} moving averages ({label})",
        available.len()
    ));
    (score, label)
}

/// Majority vote across RSI, MACD histogram, and stochastic cross
fn score_momentum(set: &IndicatorSet, observations: &mut Vec<String>) -> i8 {
    let mut votes = 0i32;

    if let Some(rsi) = set.momentum.rsi_14.latest() {
        if rsi > 55.0 {
            votes += 1;
        } else if rsi < 45.0 {
            votes -= 1;
        }
        if rsi > RSI_OVERBOUGHT {
            observations.push(format!("Momentum: RSI {rsi:.1} is overbought"));
        } else if rsi < RSI_OVERSOLD {
            observations.push(format!("Momentum: RSI {rsi:.1} is oversold"));
        } else {
            observations.push(format!("Momentum: RSI {rsi:.1}"));
        }
    }

    if let Some(hist) = set.momentum.macd_histogram.latest() {
        if hist > 0.0 {
            votes += 1;
        } else if hist < 0.0 {
            votes -= 1;
        }
        observations.push(format!("Momentum: MACD histogram {hist:+.3}"));
    }

    if let (Some(k), Some(d)) = (set.momentum.stoch_k.latest(), set.momentum.stoch_d.latest()) {
        if k > d {
            votes += 1;
        } else if k < d {
            votes -= 1;
        }
        observations.push(format!("Momentum: stochastic %K {k:.1} vs %D {d:.1}"));
    }

    votes.signum() as i8
}

/// Band position gives the direction, ATR percent the regime tier
fn score_volatility(set: &IndicatorSet, observations: &mut Vec<String>) -> (i8, VolatilityTier) {
    let score = match (set.volatility.bb_middle.latest(), set.last_close) {
        (Some(mid), price) if price > mid => 1,
        (Some(mid), price) if price < mid => -1,
        _ => 0,
    };

    let tier = match set.volatility.atr_percent {
        Some(p) if p >= 5.0 => VolatilityTier::Extreme,
        Some(p) if p >= 3.0 => VolatilityTier::High,
        Some(p) if p >= 1.5 => VolatilityTier::Normal,
        Some(_) => VolatilityTier::Low,
        None => VolatilityTier::Normal,
    };
    if let Some(p) = set.volatility.atr_percent {
        observations.push(format!("Volatility: ATR {p:.2}% of price ({tier})"));
    }
    (score, tier)
}

/// OBV slope, gated by participation
fn score_volume(set: &IndicatorSet, observations: &mut Vec<String>) -> i8 {
    if let Some(rv) = set.volume.relative_volume {
        observations.push(format!("Volume: {rv:.2}x the 20-bar average"));
        if rv < VOLUME_DRY_UP {
            return 0;
        }
    }
    match (
        set.volume.obv.latest(),
        set.volume.obv.latest_offset(OBV_LOOKBACK),
    ) {
        (Some(now), Some(then)) if now > then => 1,
        (Some(now), Some(then)) if now < then => -1,
        _ => 0,
    }
}

/// Nearest structural levels around the current price
fn derive_key_levels(set: &IndicatorSet) -> KeyLevels {
    let price = set.last_close;
    let mut below: Vec<f64> = Vec::new();
    let mut above: Vec<f64> = Vec::new();

    let mut consider = |level: f64| {
        if level < price {
            below.push(level);
        } else if level > price {
            above.push(level);
        }
    };

    if let Some(p) = &set.levels.pivots {
        for level in [p.pivot, p.r1, p.r2, p.r3, p.s1, p.s2, p.s3] {
            consider(level);
        }
    }
    if let Some(fib) = &set.levels.fibonacci {
        consider(fib.swing_high);
        consider(fib.swing_low);
        for level in &fib.retracements {
            consider(level.price);
        }
    }

    KeyLevels {
        nearest_support: below.into_iter().fold(None, |acc: Option<f64>, l| {
            Some(acc.map_or(l, |a| a.max(l)))
        }),
        nearest_resistance: above.into_iter().fold(None, |acc: Option<f64>, l| {
            Some(acc.map_or(l, |a| a.min(l)))
        }),
        pivot: set.levels.pivots.as_ref().map(|p| p.pivot),
    }
}

/// Position against the pivot, with a note on the closest structure
fn score_levels(set: &IndicatorSet, key_levels: &KeyLevels, observations: &mut Vec<String>) -> i8 {
    let Some(pivot) = key_levels.pivot else {
        return 0;
    };
    let price = set.last_close;
    if let Some(support) = key_levels.nearest_support {
        observations.push(format!("Levels: nearest support {support:.2}"));
    }
    if let Some(resistance) = key_levels.nearest_resistance {
        observations.push(format!("Levels: nearest resistance {resistance:.2}"));
    }
    if price > pivot {
        1
    } else if price < pivot {
        -1
    } else {
        0
    }
}

/// Named agreements between families, with the evidence behind each
fn derive_confluences(
    set: &IndicatorSet,
    scores: &FamilyScores,
    key_levels: &KeyLevels,
) -> Vec<Confluence> {
    let mut confluences = Vec::new();
    let direction = |s: i8| if s > 0 { "bullish" } else { "bearish" };

    if scores.trend != 0 && scores.trend == scores.momentum {
        let mut evidence = vec![format!(
            "Moving-average stack and oscillators both {}",
            direction(scores.trend)
        )];
        if let Some(rsi) = set.momentum.rsi_14.latest() {
            evidence.push(format!("RSI at {rsi:.1}"));
        }
        confluences.push(Confluence {
            name: "Trend-momentum alignment".to_string(),
            evidence,
        });
    }

    if scores.trend != 0 && scores.trend == scores.volume {
        let mut evidence = vec![format!("OBV slope confirms the {} trend", direction(scores.trend))];
        if let Some(rv) = set.volume.relative_volume {
            evidence.push(format!("relative volume {rv:.2}x"));
        }
        confluences.push(Confluence {
            name: "Volume-backed trend".to_string(),
            evidence,
        });
    }

    if scores.momentum != 0 && scores.momentum == scores.levels {
        let mut evidence = vec![format!(
            "Momentum {} on the pivot side that favors it",
            direction(scores.momentum)
        )];
        if let Some(pivot) = key_levels.pivot {
            evidence.push(format!("pivot at {pivot:.2}"));
        }
        confluences.push(Confluence {
            name: "Momentum at key level".to_string(),
            evidence,
        });
    }

    if scores.trend != 0 && scores.trend == scores.volatility {
        confluences.push(Confluence {
            name: "Bands confirm trend".to_string(),
            evidence: vec![format!(
                "Price on the {} side of the Bollinger midline",
                if scores.trend > 0 { "upper" } else { "lower" }
            )],
        });
    }

    confluences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::IndicatorEngine;
    use chart_core::{Candle, CandleSeries, Timeframe};
    use chrono::{TimeZone, Utc};

    fn series(closes: &[f64]) -> CandleSeries {
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: Utc.timestamp_opt(i as i64 * 86_400, 0).single().unwrap(),
                open: close * 0.999,
                high: close * 1.005,
                low: close * 0.995,
                close,
                volume: 1_000.0 + i as f64,
            })
            .collect();
        CandleSeries::new("TEST", Timeframe::D1, candles).unwrap()
    }

    fn synthesize(closes: &[f64]) -> SignalState {
        let set = IndicatorEngine::new().compute(&series(closes)).unwrap();
        SignalSynthesizer::new().synthesize(&set)
    }

    #[test]
    fn test_steady_rise_is_bullish_with_conviction() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + f64::from(i)).collect();
        let state = synthesize(&closes);
        assert_eq!(state.bias, Bias::Bullish);
        assert!(state.strength > 50, "strength was {}", state.strength);
        assert!(matches!(
            state.trend,
            TrendLabel::Uptrend | TrendLabel::StrongUptrend
        ));
        assert!(!state.confluences.is_empty());
    }

    #[test]
    fn test_steady_fall_is_bearish() {
        let closes: Vec<f64> = (0..60).map(|i| 200.0 - f64::from(i)).collect();
        let state = synthesize(&closes);
        assert_eq!(state.bias, Bias::Bearish);
        assert!(state.strength > 50);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + (f64::from(i) * 0.7).sin() * 5.0)
            .collect();
        let set = IndicatorEngine::new().compute(&series(&closes)).unwrap();
        let synthesizer = SignalSynthesizer::new();
        let a = serde_json::to_string(&synthesizer.synthesize(&set)).unwrap();
        let b = serde_json::to_string(&synthesizer.synthesize(&set)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_levels_bracket_price() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + f64::from(i)).collect();
        let state = synthesize(&closes);
        let price = *closes.last().unwrap();
        if let Some(support) = state.key_levels.nearest_support {
            assert!(support < price);
        }
        if let Some(resistance) = state.key_levels.nearest_resistance {
            assert!(resistance > price);
        }
    }

    #[test]
    fn test_strength_bounded() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + (f64::from(i) * 1.3).sin())
            .collect();
        let state = synthesize(&closes);
        assert!(state.strength <= 100);
    }
}
