//! Moving-average family

use chart_core::{AnalysisError, IndicatorSeries, Result, TrendIndicators};
use ta::Next;
use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};

/// Simple moving average with the warm-up window masked.
///
/// First valid value sits at index `period - 1`, the first bar with a full
/// window behind it.
pub fn sma_series(closes: &[f64], period: usize) -> Result<IndicatorSeries> {
    let mut sma =
        SimpleMovingAverage::new(period).map_err(|e| AnalysisError::IndicatorError(e.to_string()))?;
    let mut values = Vec::with_capacity(closes.len());
    for &close in closes {
        values.push(sma.next(close));
    }
    Ok(IndicatorSeries::masked(values, period - 1))
}

/// Exponential moving average with the warm-up window masked.
///
/// The recursion needs seeding, so the first `period` values are treated as
/// warm-up and the first valid value sits at index `period`.
pub fn ema_series(closes: &[f64], period: usize) -> Result<IndicatorSeries> {
    let mut ema = ExponentialMovingAverage::new(period)
        .map_err(|e| AnalysisError::IndicatorError(e.to_string()))?;
    let mut values = Vec::with_capacity(closes.len());
    for &close in closes {
        values.push(ema.next(close));
    }
    Ok(IndicatorSeries::masked(values, period))
}

/// The full moving-average stack: SMA and EMA at 20/50/100/200
pub fn compute(closes: &[f64]) -> Result<TrendIndicators> {
    Ok(TrendIndicators {
        sma_20: sma_series(closes, 20)?,
        sma_50: sma_series(closes, 50)?,
        sma_100: sma_series(closes, 100)?,
        sma_200: sma_series(closes, 200)?,
        ema_20: ema_series(closes, 20)?,
        ema_50: ema_series(closes, 50)?,
        ema_100: ema_series(closes, 100)?,
        ema_200: ema_series(closes, 200)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_warm_up_and_value() {
        let closes: Vec<f64> = (1..=10).map(f64::from).collect();
        let sma = sma_series(&closes, 5).unwrap();
        for i in 0..4 {
            assert_eq!(sma.get(i), None, "index {i} should be warm-up");
        }
        // mean of 1..=5
        assert!((sma.get(4).unwrap() - 3.0).abs() < 1e-9);
        // mean of 6..=10
        assert!((sma.latest().unwrap() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_warm_up_boundary() {
        let closes: Vec<f64> = (1..=10).map(f64::from).collect();
        let ema = ema_series(&closes, 5).unwrap();
        assert_eq!(ema.get(4), None);
        assert!(ema.get(5).is_some());
    }

    #[test]
    fn test_short_series_is_all_masked() {
        let closes = vec![1.0, 2.0, 3.0];
        let sma = sma_series(&closes, 20).unwrap();
        assert_eq!(sma.len(), 3);
        assert_eq!(sma.first_valid_index(), None);
    }
}
