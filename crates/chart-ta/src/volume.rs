//! Volume family: OBV, VWAP, and relative volume

use chart_core::{AnalysisError, Candle, IndicatorSeries, Result, VolumeIndicators};
use ta::Next;
use ta::indicators::OnBalanceVolume;

use crate::engine::to_data_item;

/// Trailing window for the relative-volume baseline
pub const RELATIVE_VOLUME_WINDOW: usize = 20;

/// On-balance volume, valid from the first bar
fn obv_series(candles: &[Candle]) -> Result<IndicatorSeries> {
    let mut obv = OnBalanceVolume::new();
    let mut values = Vec::with_capacity(candles.len());
    for candle in candles {
        let bar = to_data_item(candle)?;
        values.push(obv.next(&bar));
    }
    Ok(IndicatorSeries::masked(values, 0))
}

/// Cumulative VWAP over the series, using the typical price per bar
fn vwap_series(candles: &[Candle]) -> IndicatorSeries {
    let mut pv_sum = 0.0;
    let mut vol_sum = 0.0;
    let values = candles
        .iter()
        .map(|c| {
            let typical = (c.high + c.low + c.close) / 3.0;
            pv_sum += typical * c.volume;
            vol_sum += c.volume;
            if vol_sum > 0.0 { pv_sum / vol_sum } else { f64::NAN }
        })
        .collect();
    IndicatorSeries::masked(values, 0)
}

/// Latest volume relative to the average of the preceding window.
///
/// Needs `RELATIVE_VOLUME_WINDOW` completed bars before the latest one;
/// returns `None` otherwise, or when the baseline is zero.
fn relative_volume(candles: &[Candle]) -> Option<f64> {
    if candles.len() < RELATIVE_VOLUME_WINDOW + 1 {
        return None;
    }
    let latest = candles.last()?.volume;
    let window = &candles[candles.len() - 1 - RELATIVE_VOLUME_WINDOW..candles.len() - 1];
    let baseline = window.iter().map(|c| c.volume).sum::<f64>() / RELATIVE_VOLUME_WINDOW as f64;
    if baseline > 0.0 {
        Some(latest / baseline)
    } else {
        None
    }
}

/// The full volume family
pub fn compute(candles: &[Candle]) -> Result<VolumeIndicators> {
    let obv = obv_series(candles)?;
    if obv.latest().is_none() && !candles.is_empty() {
        return Err(AnalysisError::IndicatorError(
            "on-balance volume produced no values".to_string(),
        ));
    }
    Ok(VolumeIndicators {
        obv,
        vwap: vwap_series(candles),
        relative_volume: relative_volume(candles),
    })
}
