//! OHLCV candles and validated candle series

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AnalysisError, Result};

/// Supported chart timeframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1wk")]
    W1,
}

impl Timeframe {
    /// Canonical string form used in requests and report headers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
            Self::W1 => "1wk",
        }
    }

    /// Whether the timeframe is intraday (shorter than one day)
    pub fn is_intraday(&self) -> bool {
        matches!(self, Self::M1 | Self::M5 | Self::M15 | Self::H1 | Self::H4)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(Self::M1),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "1h" => Ok(Self::H1),
            "4h" => Ok(Self::H4),
            "1d" => Ok(Self::D1),
            "1wk" | "1w" => Ok(Self::W1),
            other => Err(AnalysisError::ConfigError(format!(
                "unsupported timeframe '{other}' (expected one of 1m, 5m, 15m, 1h, 4h, 1d, 1wk)"
            ))),
        }
    }
}

/// Single OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Structural sanity check for one bar
    fn validate(&self, index: usize) -> Result<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(AnalysisError::InvalidSeries(format!(
                "candle {index}: prices must be finite and non-negative"
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(AnalysisError::InvalidSeries(format!(
                "candle {index}: volume must be finite and non-negative"
            )));
        }
        if self.high < self.low {
            return Err(AnalysisError::InvalidSeries(format!(
                "candle {index}: high {} below low {}",
                self.high, self.low
            )));
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Err(AnalysisError::InvalidSeries(format!(
                "candle {index}: open/close outside high-low range"
            )));
        }
        Ok(())
    }

    /// True when the bar closed above its open
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// Immutable, validated series of candles for one symbol and timeframe.
///
/// Construction enforces strictly increasing timestamps and per-bar price
/// sanity, so downstream computation never re-checks structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Build a validated series. Candles must already be in chronological
    /// order with strictly increasing timestamps.
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, candles: Vec<Candle>) -> Result<Self> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(AnalysisError::InvalidSymbol(symbol));
        }
        for (i, candle) in candles.iter().enumerate() {
            candle.validate(i)?;
            if i > 0 && candle.timestamp <= candles[i - 1].timestamp {
                return Err(AnalysisError::InvalidSeries(format!(
                    "candle {i}: timestamp not strictly increasing"
                )));
            }
        }
        Ok(Self {
            symbol,
            timeframe,
            candles,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Most recent candle, if any
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Closing prices in chronological order
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Volumes in chronological order
    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    /// View of the trailing `n` candles (or the whole series if shorter)
    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(ts_secs: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.timestamp_opt(ts_secs, 0).single().unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn test_timeframe_round_trip() {
        for s in ["1m", "5m", "15m", "1h", "4h", "1d", "1wk"] {
            let tf: Timeframe = s.parse().unwrap();
            assert_eq!(tf.as_str(), s);
        }
        assert!("3h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_valid_series() {
        let series = CandleSeries::new(
            "AAPL",
            Timeframe::D1,
            vec![candle(0, 10.0, 11.0, 9.5, 10.5), candle(86_400, 10.5, 11.5, 10.0, 11.0)],
        )
        .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.last().unwrap().close, 11.0);
        assert_eq!(series.closes(), vec![10.5, 11.0]);
    }

    #[test]
    fn test_rejects_out_of_order_timestamps() {
        let err = CandleSeries::new(
            "AAPL",
            Timeframe::D1,
            vec![candle(86_400, 10.0, 11.0, 9.5, 10.5), candle(0, 10.5, 11.5, 10.0, 11.0)],
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidSeries(_)));
    }

    #[test]
    fn test_rejects_bad_ohlc_range() {
        // high below close
        let err = CandleSeries::new(
            "AAPL",
            Timeframe::D1,
            vec![candle(0, 10.0, 10.2, 9.5, 10.5)],
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidSeries(_)));
    }

    #[test]
    fn test_rejects_negative_price() {
        let err = CandleSeries::new(
            "AAPL",
            Timeframe::D1,
            vec![candle(0, 0.5, 1.0, -0.1, 0.5)],
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidSeries(_)));
    }

    #[test]
    fn test_accepts_zero_low() {
        // delisting candles and bad ticks can print a zero low
        let series = CandleSeries::new(
            "AAPL",
            Timeframe::D1,
            vec![candle(0, 0.5, 1.0, 0.0, 0.5)],
        )
        .unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_rejects_blank_symbol() {
        let err = CandleSeries::new("  ", Timeframe::D1, vec![]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidSymbol(_)));
    }

    #[test]
    fn test_tail_clamps_to_length() {
        let series = CandleSeries::new(
            "AAPL",
            Timeframe::D1,
            vec![candle(0, 10.0, 11.0, 9.5, 10.5)],
        )
        .unwrap();
        assert_eq!(series.tail(10).len(), 1);
    }
}
