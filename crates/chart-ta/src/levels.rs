//! Horizontal structure: floor-trader pivots and Fibonacci levels

use chart_core::{Candle, FibLevel, FibonacciLevels, LevelIndicators, PivotPoints};

/// Bars considered when locating the swing for Fibonacci levels
pub const SWING_WINDOW: usize = 100;

const RETRACEMENT_RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];
const EXTENSION_RATIOS: [f64; 4] = [1.272, 1.414, 1.618, 2.0];

/// Classic pivots from the last completed reference candle (the one before
/// the most recent bar). Needs at least two candles.
pub fn pivot_points(candles: &[Candle]) -> Option<PivotPoints> {
    if candles.len() < 2 {
        return None;
    }
    let prev = &candles[candles.len() - 2];
    let pivot = (prev.high + prev.low + prev.close) / 3.0;
    let range = prev.high - prev.low;
    Some(PivotPoints {
        pivot,
        r1: 2.0 * pivot - prev.low,
        r2: pivot + range,
        r3: prev.high + 2.0 * (pivot - prev.low),
        s1: 2.0 * pivot - prev.high,
        s2: pivot - range,
        s3: prev.low - 2.0 * (prev.high - pivot),
    })
}

/// Fibonacci retracements and extensions over the recent swing.
///
/// The swing is the highest high and lowest low of the trailing window;
/// direction comes from which extreme printed later.
pub fn fibonacci_levels(candles: &[Candle]) -> Option<FibonacciLevels> {
    if candles.len() < 2 {
        return None;
    }
    let window = &candles[candles.len().saturating_sub(SWING_WINDOW)..];

    let (high_idx, swing_high) = window
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.high))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
    let (low_idx, swing_low) = window
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.low))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    let range = swing_high - swing_low;
    if range <= 0.0 {
        return None;
    }
    let uptrend = low_idx < high_idx;

    let retracements = RETRACEMENT_RATIOS
        .iter()
        .map(|&ratio| FibLevel {
            ratio,
            price: if uptrend {
                swing_high - ratio * range
            } else {
                swing_low + ratio * range
            },
        })
        .collect();
    let extensions = EXTENSION_RATIOS
        .iter()
        .map(|&ratio| FibLevel {
            ratio,
            price: if uptrend {
                swing_low + ratio * range
            } else {
                swing_high - ratio * range
            },
        })
        .collect();

    Some(FibonacciLevels {
        swing_high,
        swing_low,
        uptrend,
        retracements,
        extensions,
    })
}

/// The full level family
pub fn compute(candles: &[Candle]) -> LevelIndicators {
    LevelIndicators {
        pivots: pivot_points(candles),
        fibonacci: fibonacci_levels(candles),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(i: usize, low: f64, high: f64) -> Candle {
        let mid = (low + high) / 2.0;
        Candle {
            timestamp: Utc.timestamp_opt(i as i64 * 86_400, 0).single().unwrap(),
            open: mid,
            high,
            low,
            close: mid,
            volume: 1_000.0,
        }
    }

    #[test]
    fn test_pivot_points_from_reference_candle() {
        let candles = vec![candle(0, 90.0, 110.0), candle(1, 95.0, 105.0)];
        let p = pivot_points(&candles).unwrap();
        // reference is the first candle: H=110 L=90 C=100 -> pivot 100
        assert!((p.pivot - 100.0).abs() < 1e-9);
        assert!((p.r1 - 110.0).abs() < 1e-9);
        assert!((p.s1 - 90.0).abs() < 1e-9);
        assert!(p.r3 > p.r2 && p.r2 > p.r1);
        assert!(p.s1 > p.s2 && p.s2 > p.s3);
    }

    #[test]
    fn test_fibonacci_uptrend_levels() {
        // low first, high later: an upward swing from 100 to 200
        let candles = vec![candle(0, 100.0, 120.0), candle(1, 150.0, 200.0)];
        let fib = fibonacci_levels(&candles).unwrap();
        assert!(fib.uptrend);
        assert!((fib.swing_high - 200.0).abs() < 1e-9);
        assert!((fib.swing_low - 100.0).abs() < 1e-9);
        // 0.5 retracement of a 100..200 swing
        let half = fib.retracements.iter().find(|l| l.ratio == 0.5).unwrap();
        assert!((half.price - 150.0).abs() < 1e-9);
        // extensions sit beyond the swing high
        assert!(fib.extensions.iter().all(|l| l.price > fib.swing_high));
    }

    #[test]
    fn test_fibonacci_downtrend_levels() {
        let candles = vec![candle(0, 150.0, 200.0), candle(1, 100.0, 120.0)];
        let fib = fibonacci_levels(&candles).unwrap();
        assert!(!fib.uptrend);
        // extensions sit below the swing low
        assert!(fib.extensions.iter().all(|l| l.price < fib.swing_low));
    }

    #[test]
    fn test_single_candle_has_no_levels() {
        let candles = vec![candle(0, 90.0, 110.0)];
        let levels = compute(&candles);
        assert!(levels.pivots.is_none());
        assert!(levels.fibonacci.is_none());
    }
}
