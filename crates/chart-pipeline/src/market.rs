//! Collaborator contracts: market data and chart rendering

use async_trait::async_trait;
use chart_core::{CandleSeries, IndicatorSet, Result, Timeframe};

/// A rendered chart image, carried as base64 for the vision stage.
///
/// The pipeline treats the bytes as opaque; it never decodes or inspects
/// the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartImage {
    /// Media type (e.g., "image/png")
    pub media_type: String,
    /// Base64-encoded image data
    pub data: String,
}

impl ChartImage {
    pub fn png(data: impl Into<String>) -> Self {
        Self {
            media_type: "image/png".to_string(),
            data: data.into(),
        }
    }
}

/// Source of validated candle series
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch up to `limit` most recent candles for the symbol and timeframe
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries>;
}

/// Renderer producing the chart image the vision stage analyzes
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Render the series (optionally with indicator overlays) to an image
    async fn render(&self, series: &CandleSeries, indicators: &IndicatorSet) -> Result<ChartImage>;
}
