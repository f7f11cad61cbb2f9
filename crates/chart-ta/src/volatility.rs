//! Range and band family: ATR and Bollinger bands

use chart_core::{AnalysisError, Candle, IndicatorSeries, Result, VolatilityIndicators};
use ta::Next;
use ta::indicators::{AverageTrueRange, BollingerBands};

use crate::engine::to_data_item;

pub const ATR_PERIOD: usize = 14;
pub const BB_PERIOD: usize = 20;
pub const BB_MULTIPLIER: f64 = 2.0;

/// ATR with its smoothing warm-up masked (first valid at index `period`)
pub fn atr_series(candles: &[Candle], period: usize) -> Result<IndicatorSeries> {
    let mut atr =
        AverageTrueRange::new(period).map_err(|e| AnalysisError::IndicatorError(e.to_string()))?;
    let mut values = Vec::with_capacity(candles.len());
    for candle in candles {
        let bar = to_data_item(candle)?;
        values.push(atr.next(&bar));
    }
    Ok(IndicatorSeries::masked(values, period))
}

/// The full volatility family
pub fn compute(candles: &[Candle], closes: &[f64]) -> Result<VolatilityIndicators> {
    let atr_14 = atr_series(candles, ATR_PERIOD)?;
    let last_close = closes.last().copied();
    let atr_percent = match (atr_14.latest(), last_close) {
        (Some(atr), Some(close)) if close > 0.0 => Some(atr / close * 100.0),
        _ => None,
    };

    let mut bb = BollingerBands::new(BB_PERIOD, BB_MULTIPLIER)
        .map_err(|e| AnalysisError::IndicatorError(e.to_string()))?;
    let mut upper = Vec::with_capacity(closes.len());
    let mut middle = Vec::with_capacity(closes.len());
    let mut lower = Vec::with_capacity(closes.len());
    let mut width = Vec::with_capacity(closes.len());
    for &close in closes {
        let out = bb.next(close);
        upper.push(out.upper);
        middle.push(out.average);
        lower.push(out.lower);
        let w = if out.average.abs() > f64::EPSILON {
            (out.upper - out.lower) / out.average
        } else {
            f64::NAN
        };
        width.push(w);
    }
    let first_valid = BB_PERIOD - 1;

    Ok(VolatilityIndicators {
        atr_14,
        atr_percent,
        bb_upper: IndicatorSeries::masked(upper, first_valid),
        bb_middle: IndicatorSeries::masked(middle, first_valid),
        bb_lower: IndicatorSeries::masked(lower, first_valid),
        bb_width: IndicatorSeries::masked(width, first_valid),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn flat_candles(n: usize, price: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: Utc.timestamp_opt(i as i64 * 86_400, 0).single().unwrap(),
                open: price,
                high: price * 1.01,
                low: price * 0.99,
                close: price,
                volume: 1_000.0,
            })
            .collect()
    }

    #[test]
    fn test_atr_warm_up_and_positive() {
        let candles = flat_candles(40, 100.0);
        let atr = atr_series(&candles, ATR_PERIOD).unwrap();
        assert_eq!(atr.get(ATR_PERIOD - 1), None);
        assert!(atr.latest().unwrap() > 0.0);
    }

    #[test]
    fn test_bollinger_bands_ordering() {
        let candles = flat_candles(60, 100.0);
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let vol = compute(&candles, &closes).unwrap();
        let upper = vol.bb_upper.latest().unwrap();
        let middle = vol.bb_middle.latest().unwrap();
        let lower = vol.bb_lower.latest().unwrap();
        assert!(upper >= middle && middle >= lower);
        assert!(vol.atr_percent.unwrap() > 0.0);
    }
}
