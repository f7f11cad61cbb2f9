//! Indicator engine: candle series in, indicator set out

use chart_core::{AnalysisError, Candle, CandleSeries, IndicatorSet, Result};
use tracing::{debug, instrument};

use crate::MIN_CANDLES;
use crate::{levels, momentum, trend, volatility, volume};

/// Convert a validated candle into the bar type the `ta` indicators consume
pub(crate) fn to_data_item(candle: &Candle) -> Result<ta::DataItem> {
    ta::DataItem::builder()
        .open(candle.open)
        .high(candle.high)
        .low(candle.low)
        .close(candle.close)
        .volume(candle.volume)
        .build()
        .map_err(|e| AnalysisError::IndicatorError(e.to_string()))
}

/// Pure, deterministic indicator computation.
///
/// Families are independent of one another, so they run on the rayon pool.
/// Determinism holds anyway: each family only reads the input series.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute every indicator family for the series.
    ///
    /// Fails with [`AnalysisError::InsufficientData`] below
    /// [`MIN_CANDLES`]; otherwise individual indicators that lack history
    /// simply stay masked.
    #[instrument(skip(self, series), fields(symbol = series.symbol(), candles = series.len()))]
    pub fn compute(&self, series: &CandleSeries) -> Result<IndicatorSet> {
        if series.len() < MIN_CANDLES {
            return Err(AnalysisError::InsufficientData {
                needed: MIN_CANDLES,
                got: series.len(),
            });
        }

        let candles = series.candles();
        let closes = series.closes();

        let (trend_res, (momentum_res, (volatility_res, (volume_res, level_set)))) = rayon::join(
            || trend::compute(&closes),
            || {
                rayon::join(
                    || momentum::compute(candles, &closes),
                    || {
                        rayon::join(
                            || volatility::compute(candles, &closes),
                            || rayon::join(|| volume::compute(candles), || levels::compute(candles)),
                        )
                    },
                )
            },
        );

        let set = IndicatorSet {
            symbol: series.symbol().to_string(),
            timeframe: series.timeframe(),
            last_close: series.last().map(|c| c.close).unwrap_or_default(),
            trend: trend_res?,
            momentum: momentum_res?,
            volatility: volatility_res?,
            volume: volume_res?,
            levels: level_set,
        };
        debug!(
            symbol = set.symbol,
            atr_percent = set.volatility.atr_percent,
            "indicator families computed"
        );
        Ok(set)
    }
}
