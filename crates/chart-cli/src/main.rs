//! Command-line interface for chart-rs
//!
//! Runs one full analysis: candles from a JSON file, an optional
//! pre-rendered chart image for the vision stage, and an OpenAI-compatible
//! endpoint for the reasoning stages.

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chart_core::{AnalysisError, Candle, CandleSeries, IndicatorSet, Result, RunState, Timeframe};
use chart_llm::providers::openai::OpenAIProvider;
use chart_pipeline::{
    logging, AnalysisPipeline, CancelToken, ChartImage, ChartRenderer, MarketDataProvider,
    PipelineConfig,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chart-cli")]
#[command(about = "Technical chart analysis from the terminal", long_about = None)]
struct Args {
    /// Ticker symbol to analyze
    symbol: String,

    /// Timeframe (1m, 5m, 15m, 1h, 4h, 1d, 1wk)
    #[arg(short, long, default_value = "1d")]
    timeframe: String,

    /// JSON file with an array of OHLCV candles
    #[arg(short, long)]
    candles: PathBuf,

    /// Pre-rendered chart image (PNG) for the vision stage
    #[arg(long)]
    chart_image: Option<PathBuf>,

    /// Write the markdown report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the full run record as JSON
    #[arg(long)]
    json: bool,
}

/// Market data read from a local JSON candle file
struct FileMarket {
    path: PathBuf,
}

#[async_trait]
impl MarketDataProvider for FileMarket {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AnalysisError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("cannot read {}: {e}", self.path.display()),
            }
        })?;
        let mut candles: Vec<Candle> = serde_json::from_str(&raw)?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        CandleSeries::new(symbol, timeframe, candles)
    }
}

/// Renderer backed by a pre-rendered image file.
///
/// With no image configured the render fails and the pipeline degrades the
/// pattern stage, which is the intended behavior for data-only runs.
struct FileRenderer {
    path: Option<PathBuf>,
}

#[async_trait]
impl ChartRenderer for FileRenderer {
    async fn render(&self, _series: &CandleSeries, _set: &IndicatorSet) -> Result<ChartImage> {
        let Some(path) = &self.path else {
            return Err(AnalysisError::RenderFailed(
                "no chart image provided".to_string(),
            ));
        };
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AnalysisError::RenderFailed(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(ChartImage::png(STANDARD.encode(bytes)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let args = Args::parse();
    let timeframe: Timeframe = args.timeframe.parse()?;

    let provider =
        OpenAIProvider::from_env().context("reasoning service configuration (OPENAI_API_KEY)")?;
    let config = PipelineConfig::default().with_env_models();

    let pipeline = AnalysisPipeline::builder()
        .config(config)
        .market(Arc::new(FileMarket {
            path: args.candles.clone(),
        }))
        .renderer(Arc::new(FileRenderer {
            path: args.chart_image.clone(),
        }))
        .provider(Arc::new(provider))
        .build()?;

    let cancel = CancelToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && ctrl_c_token.cancel() {
            warn!("cancellation requested, finishing current stage");
        }
    });

    info!(symbol = args.symbol, %timeframe, "starting analysis");
    let run = pipeline.run(&args.symbol, timeframe, &cancel).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    for timing in &run.timings {
        let mark = if timing.degraded { " (degraded)" } else { "" };
        println!(
            "  {:<11} {:>6} ms  {} attempt(s){mark}",
            timing.stage.to_string(),
            timing.duration_ms,
            timing.attempts
        );
    }

    if run.state == RunState::Failed {
        let failure = run
            .failure
            .map(|f| format!("{} stage: {}", f.stage, f.error))
            .unwrap_or_else(|| "unknown failure".to_string());
        anyhow::bail!("analysis failed in {failure}");
    }

    let report = run
        .report
        .context("run finished without a report")?;
    println!("\nRecommendation: {}", report.recommendation);
    println!("{}\n", report.summary);
    for caveat in &report.caveats {
        println!("Caveat: {caveat}");
    }

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &report.markdown)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{}", report.markdown),
    }

    Ok(())
}
