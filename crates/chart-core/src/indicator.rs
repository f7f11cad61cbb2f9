//! Computed indicator families
//!
//! All windowed indicators are carried as [`IndicatorSeries`], aligned
//! one-to-one with the input candles. Indices inside an indicator's warm-up
//! window hold `None` rather than a padded or extrapolated number.

use serde::{Deserialize, Serialize};

/// A per-candle indicator output with an explicit warm-up mask
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSeries {
    values: Vec<Option<f64>>,
}

impl IndicatorSeries {
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self { values }
    }

    /// Wrap raw values, masking every index before `first_valid` as warm-up
    pub fn masked(raw: Vec<f64>, first_valid: usize) -> Self {
        let values = raw
            .into_iter()
            .enumerate()
            .map(|(i, v)| if i < first_valid || !v.is_finite() { None } else { Some(v) })
            .collect();
        Self { values }
    }

    /// A series of the right length with no valid values at all
    pub fn all_none(len: usize) -> Self {
        Self {
            values: vec![None; len],
        }
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    /// Most recent value, `None` if the series never left warm-up
    pub fn latest(&self) -> Option<f64> {
        self.values.last().copied().flatten()
    }

    /// Value `offset` bars before the most recent one
    pub fn latest_offset(&self, offset: usize) -> Option<f64> {
        let len = self.values.len();
        if offset >= len {
            return None;
        }
        self.values[len - 1 - offset]
    }

    /// Index of the first non-`None` value
    pub fn first_valid_index(&self) -> Option<usize> {
        self.values.iter().position(Option::is_some)
    }
}

/// Moving averages over closing prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendIndicators {
    pub sma_20: IndicatorSeries,
    pub sma_50: IndicatorSeries,
    pub sma_100: IndicatorSeries,
    pub sma_200: IndicatorSeries,
    pub ema_20: IndicatorSeries,
    pub ema_50: IndicatorSeries,
    pub ema_100: IndicatorSeries,
    pub ema_200: IndicatorSeries,
}

/// Oscillators: RSI, MACD, and stochastic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumIndicators {
    pub rsi_14: IndicatorSeries,
    pub macd_line: IndicatorSeries,
    pub macd_signal: IndicatorSeries,
    pub macd_histogram: IndicatorSeries,
    pub stoch_k: IndicatorSeries,
    pub stoch_d: IndicatorSeries,
}

/// Range and band measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityIndicators {
    pub atr_14: IndicatorSeries,
    /// ATR as a percentage of the latest close, once ATR is warm
    pub atr_percent: Option<f64>,
    pub bb_upper: IndicatorSeries,
    pub bb_middle: IndicatorSeries,
    pub bb_lower: IndicatorSeries,
    /// (upper - lower) / middle, per bar
    pub bb_width: IndicatorSeries,
}

/// Volume-derived measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeIndicators {
    pub obv: IndicatorSeries,
    /// Cumulative volume-weighted average price over the series
    pub vwap: IndicatorSeries,
    /// Latest volume relative to its trailing 20-bar average
    pub relative_volume: Option<f64>,
}

/// Classic floor-trader pivots derived from the previous completed candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotPoints {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// One Fibonacci level with its defining ratio
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibLevel {
    pub ratio: f64,
    pub price: f64,
}

/// Fibonacci retracements and extensions from the recent swing range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevels {
    pub swing_high: f64,
    pub swing_low: f64,
    /// True when the swing moved upward (low preceded high)
    pub uptrend: bool,
    pub retracements: Vec<FibLevel>,
    pub extensions: Vec<FibLevel>,
}

/// Horizontal structure: pivots and Fibonacci levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelIndicators {
    pub pivots: Option<PivotPoints>,
    pub fibonacci: Option<FibonacciLevels>,
}

/// Everything the indicator stage computes for one series, grouped by family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub symbol: String,
    pub timeframe: crate::candle::Timeframe,
    /// Close of the most recent candle, for downstream convenience
    pub last_close: f64,
    pub trend: TrendIndicators,
    pub momentum: MomentumIndicators,
    pub volatility: VolatilityIndicators,
    pub volume: VolumeIndicators,
    pub levels: LevelIndicators,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_series() {
        let s = IndicatorSeries::masked(vec![1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(s.get(0), None);
        assert_eq!(s.get(1), None);
        assert_eq!(s.get(2), Some(3.0));
        assert_eq!(s.latest(), Some(4.0));
        assert_eq!(s.first_valid_index(), Some(2));
    }

    #[test]
    fn test_masked_drops_non_finite() {
        let s = IndicatorSeries::masked(vec![f64::NAN, 2.0], 0);
        assert_eq!(s.get(0), None);
        assert_eq!(s.get(1), Some(2.0));
    }

    #[test]
    fn test_latest_offset() {
        let s = IndicatorSeries::masked(vec![1.0, 2.0, 3.0], 0);
        assert_eq!(s.latest_offset(0), Some(3.0));
        assert_eq!(s.latest_offset(2), Some(1.0));
        assert_eq!(s.latest_offset(3), None);
    }

    #[test]
    fn test_all_none() {
        let s = IndicatorSeries::all_none(3);
        assert_eq!(s.len(), 3);
        assert_eq!(s.latest(), None);
        assert_eq!(s.first_valid_index(), None);
    }
}
