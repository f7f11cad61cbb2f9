//! Oscillator family: RSI, MACD, and the slow stochastic

use chart_core::{AnalysisError, Candle, IndicatorSeries, MomentumIndicators, Result};
use ta::Next;
use ta::indicators::{
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage, SlowStochastic,
};

use crate::engine::to_data_item;

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const STOCH_PERIOD: usize = 14;
pub const STOCH_SMOOTH: usize = 3;

/// RSI reference bands used by the signal rules
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const RSI_OVERSOLD: f64 = 30.0;

/// RSI with its smoothing warm-up masked (first valid at index `period`)
pub fn rsi_series(closes: &[f64], period: usize) -> Result<IndicatorSeries> {
    let mut rsi = RelativeStrengthIndex::new(period)
        .map_err(|e| AnalysisError::IndicatorError(e.to_string()))?;
    let mut values = Vec::with_capacity(closes.len());
    for &close in closes {
        values.push(rsi.next(close));
    }
    Ok(IndicatorSeries::masked(values, period))
}

/// MACD line, signal, and histogram.
///
/// The line needs the slow EMA (first valid at `slow - 1`); signal and
/// histogram additionally need the signal EMA over the line (first valid at
/// `slow + signal - 2`).
fn macd_series(
    closes: &[f64],
) -> Result<(IndicatorSeries, IndicatorSeries, IndicatorSeries)> {
    let mut macd = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
        .map_err(|e| AnalysisError::IndicatorError(e.to_string()))?;
    let mut line = Vec::with_capacity(closes.len());
    let mut signal = Vec::with_capacity(closes.len());
    let mut histogram = Vec::with_capacity(closes.len());
    for &close in closes {
        let out = macd.next(close);
        line.push(out.macd);
        signal.push(out.signal);
        histogram.push(out.histogram);
    }
    let line_first = MACD_SLOW - 1;
    let signal_first = MACD_SLOW + MACD_SIGNAL - 2;
    Ok((
        IndicatorSeries::masked(line, line_first),
        IndicatorSeries::masked(signal, signal_first),
        IndicatorSeries::masked(histogram, signal_first),
    ))
}

/// Slow stochastic %K plus an SMA-smoothed %D
fn stochastic_series(candles: &[Candle]) -> Result<(IndicatorSeries, IndicatorSeries)> {
    let mut stoch = SlowStochastic::new(STOCH_PERIOD, STOCH_SMOOTH)
        .map_err(|e| AnalysisError::IndicatorError(e.to_string()))?;
    let mut d_smoother = SimpleMovingAverage::new(STOCH_SMOOTH)
        .map_err(|e| AnalysisError::IndicatorError(e.to_string()))?;
    let mut k_values = Vec::with_capacity(candles.len());
    let mut d_values = Vec::with_capacity(candles.len());
    for candle in candles {
        let bar = to_data_item(candle)?;
        let k = stoch.next(&bar);
        k_values.push(k);
        d_values.push(d_smoother.next(k));
    }
    let k_first = STOCH_PERIOD + STOCH_SMOOTH - 2;
    let d_first = k_first + STOCH_SMOOTH - 1;
    Ok((
        IndicatorSeries::masked(k_values, k_first),
        IndicatorSeries::masked(d_values, d_first),
    ))
}

/// The full oscillator family
pub fn compute(candles: &[Candle], closes: &[f64]) -> Result<MomentumIndicators> {
    let rsi_14 = rsi_series(closes, RSI_PERIOD)?;
    let (macd_line, macd_signal, macd_histogram) = macd_series(closes)?;
    let (stoch_k, stoch_d) = stochastic_series(candles)?;
    Ok(MomentumIndicators {
        rsi_14,
        macd_line,
        macd_signal,
        macd_histogram,
        stoch_k,
        stoch_d,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_warm_up() {
        let closes: Vec<f64> = (1..=30).map(f64::from).collect();
        let rsi = rsi_series(&closes, RSI_PERIOD).unwrap();
        assert_eq!(rsi.get(RSI_PERIOD - 1), None);
        assert!(rsi.get(RSI_PERIOD).is_some());
    }

    #[test]
    fn test_rsi_saturates_on_monotonic_rise() {
        let closes: Vec<f64> = (1..=60).map(f64::from).collect();
        let rsi = rsi_series(&closes, RSI_PERIOD).unwrap();
        // every bar up, RSI should sit deep in overbought territory
        assert!(rsi.latest().unwrap() > RSI_OVERBOUGHT);
    }

    #[test]
    fn test_macd_mask_boundaries() {
        let closes: Vec<f64> = (1..=60).map(|i| 100.0 + f64::from(i)).collect();
        let (line, signal, histogram) = macd_series(&closes).unwrap();
        assert_eq!(line.first_valid_index(), Some(MACD_SLOW - 1));
        assert_eq!(signal.first_valid_index(), Some(MACD_SLOW + MACD_SIGNAL - 2));
        assert_eq!(histogram.first_valid_index(), Some(MACD_SLOW + MACD_SIGNAL - 2));
    }
}
