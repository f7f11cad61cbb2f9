//! The analysis pipeline state machine

use chart_core::{
    AnalysisError, AnalysisRun, CandleSeries, IndicatorSet, PatternFinding, Result, RiskAnalysis,
    RunFailure, RunState, SignalState, StageName, StageTiming, Timeframe,
};
use chart_llm::LLMProvider;
use chart_ta::{IndicatorEngine, SignalSynthesizer};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::market::{ChartImage, ChartRenderer, MarketDataProvider};
use crate::stages::{
    assemble_report, PatternRecognizer, ReportDraft, ReportSynthesizer, ScenarioAnalyst,
};

/// Drives one symbol/timeframe analysis from fetch to finished report.
///
/// Owns the per-stage timeout and retry policy, the bounded-concurrency
/// gate toward the reasoning service, cooperative cancellation, and the
/// degradation rules: pattern and report failures degrade, fetch and
/// scenario failures (past their fallbacks) end the run.
pub struct AnalysisPipeline {
    config: PipelineConfig,
    market: Arc<dyn MarketDataProvider>,
    renderer: Arc<dyn ChartRenderer>,
    provider: Arc<dyn LLMProvider>,
    engine: IndicatorEngine,
    synthesizer: SignalSynthesizer,
    llm_gate: Arc<Semaphore>,
}

impl AnalysisPipeline {
    /// Create a builder for the pipeline
    pub fn builder() -> AnalysisPipelineBuilder {
        AnalysisPipelineBuilder::default()
    }

    /// Run one full analysis.
    ///
    /// Always returns a terminal [`AnalysisRun`]: a failure is recorded on
    /// the run rather than surfaced as `Err`, so callers get timings and
    /// any partial artifacts either way.
    #[instrument(skip(self, cancel), fields(%timeframe))]
    pub async fn run(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        cancel: &CancelToken,
    ) -> AnalysisRun {
        let mut run = AnalysisRun::new(symbol, timeframe);
        info!(run_id = %run.id, "analysis run started");

        match self.execute(&mut run, cancel).await {
            Ok(()) => {
                self.transition(&mut run, RunState::Done);
                info!(
                    run_id = %run.id,
                    total_ms = run.total_duration_ms(),
                    degraded = ?run.degraded_stages(),
                    "analysis run complete"
                );
            }
            Err(error) => {
                let stage = failing_stage(run.state);
                warn!(run_id = %run.id, %stage, %error, "analysis run failed");
                run.failure = Some(RunFailure {
                    stage,
                    error: error.to_string(),
                });
                self.transition(&mut run, RunState::Failed);
            }
        }
        run.finished_at = Some(Utc::now());
        run
    }

    async fn execute(&self, run: &mut AnalysisRun, cancel: &CancelToken) -> Result<()> {
        // Each stage transitions first and checks the token second, so a
        // cancellation observed at a boundary is charged to the stage that
        // was about to run. Timings are pushed before `?` propagates, so a
        // failed stage still leaves its elapsed-time record on the run.

        // fetch
        self.transition(run, RunState::Fetching);
        cancel.check()?;
        let mut attempts = 0;
        let timer = StageTimer::start();
        let result = self
            .with_retry(
                self.config.fetch_retries,
                self.config.fetch_timeout,
                "fetch",
                &mut attempts,
                || {
                    self.market
                        .fetch_candles(&run.symbol, run.timeframe, self.config.candle_limit)
                },
            )
            .await;
        run.timings
            .push(timer.finish(StageName::Fetch, attempts.max(1), false));
        let series = result?;
        if series.is_empty() {
            return Err(AnalysisError::InsufficientData {
                needed: chart_ta::MIN_CANDLES,
                got: 0,
            });
        }
        run.candles_analyzed = series.len();
        debug!(candles = series.len(), "market data fetched");

        // indicators, off the async runtime
        self.transition(run, RunState::Indicators);
        cancel.check()?;
        let timer = StageTimer::start();
        let result = self.compute_indicators(series.clone()).await;
        run.timings.push(timer.finish(StageName::Indicators, 1, false));
        let set = result?;

        // signals
        self.transition(run, RunState::Signals);
        cancel.check()?;
        let timer = StageTimer::start();
        let signal = self.synthesizer.synthesize(&set);
        run.timings.push(timer.finish(StageName::Signals, 1, false));
        run.signal = Some(signal.clone());
        info!(bias = %signal.bias, strength = signal.strength, "signal synthesized");

        // patterns, degradable
        self.transition(run, RunState::Patterns);
        cancel.check()?;
        let timer = StageTimer::start();
        let mut attempts = 0;
        let result = self
            .run_patterns(&series, &set, &signal, &mut attempts)
            .await;
        let degraded = result.as_ref().is_ok_and(|p| p.is_degraded());
        run.timings
            .push(timer.finish(StageName::Patterns, attempts.max(1), degraded));
        let patterns = result?;
        run.patterns = Some(patterns.clone());

        // scenarios, deterministic fallback
        self.transition(run, RunState::Scenarios);
        cancel.check()?;
        let timer = StageTimer::start();
        let mut attempts = 0;
        let last_close = set.last_close;
        let atr = set.volatility.atr_14.latest();
        let result = self
            .run_scenarios(&signal, &patterns, last_close, atr, &mut attempts)
            .await;
        let degraded = result.as_ref().is_ok_and(|r| r.degraded);
        run.timings
            .push(timer.finish(StageName::Scenarios, attempts.max(1), degraded));
        let risk = result?;
        run.risk = Some(risk.clone());

        // report, deterministic fallback
        self.transition(run, RunState::Report);
        cancel.check()?;
        let timer = StageTimer::start();
        let mut attempts = 0;
        let result = self
            .run_report(&signal, &patterns, &risk, &mut attempts)
            .await;
        let report_degraded = result.as_ref().is_ok_and(|(_, d)| *d);
        run.timings
            .push(timer.finish(StageName::Report, attempts.max(1), report_degraded));
        let (draft, _) = result?;

        // assembly, never touches the reasoning service
        self.transition(run, RunState::Assembling);
        cancel.check()?;
        let timer = StageTimer::start();
        let caveats = build_caveats(&patterns, &risk, report_degraded);
        run.report = Some(assemble_report(&signal, &patterns, &risk, draft, caveats));
        run.timings.push(timer.finish(StageName::Assembly, 1, false));

        Ok(())
    }

    async fn compute_indicators(&self, series: CandleSeries) -> Result<IndicatorSet> {
        let engine = self.engine;
        tokio::task::spawn_blocking(move || engine.compute(&series))
            .await
            .map_err(|e| AnalysisError::Other(format!("indicator task failed: {e}")))?
    }

    /// Vision stage. Renderer or reasoning failures yield a degraded
    /// finding; only cancellation propagates.
    async fn run_patterns(
        &self,
        series: &CandleSeries,
        set: &IndicatorSet,
        signal: &SignalState,
        attempts: &mut u32,
    ) -> Result<PatternFinding> {
        let image = match self.renderer.render(series, set).await {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "chart rendering failed, degrading pattern stage");
                return Ok(PatternFinding::unavailable(&e.to_string()));
            }
        };

        let recognizer = PatternRecognizer::new(self.provider.clone(), self.config.patterns.clone());
        let result = self
            .with_retry(
                self.config.patterns.max_retries,
                self.config.patterns.timeout,
                "patterns",
                attempts,
                || self.gated_patterns(&recognizer, &image, signal),
            )
            .await;
        match result {
            Ok(finding) => Ok(finding),
            Err(AnalysisError::Cancelled) => Err(AnalysisError::Cancelled),
            Err(e) => {
                warn!(error = %e, "pattern stage degraded");
                Ok(PatternFinding::unavailable(&e.to_string()))
            }
        }
    }

    async fn gated_patterns(
        &self,
        recognizer: &PatternRecognizer,
        image: &ChartImage,
        signal: &SignalState,
    ) -> Result<PatternFinding> {
        let _permit = self.acquire_llm_slot().await?;
        recognizer.analyze(image, signal).await
    }

    /// Scenario stage. Recoverable exhaustion falls back to rule-derived
    /// scenarios; `NoValidScenarios` and cancellation end the run.
    async fn run_scenarios(
        &self,
        signal: &SignalState,
        patterns: &PatternFinding,
        last_close: f64,
        atr: Option<f64>,
        attempts: &mut u32,
    ) -> Result<RiskAnalysis> {
        let analyst = ScenarioAnalyst::new(self.provider.clone(), self.config.scenarios.clone());
        let result = self
            .with_retry(
                self.config.scenarios.max_retries,
                self.config.scenarios.timeout,
                "scenarios",
                attempts,
                || self.gated_scenarios(&analyst, signal, patterns, last_close, atr),
            )
            .await;
        match result {
            Ok(risk) => Ok(risk),
            Err(e @ (AnalysisError::NoValidScenarios | AnalysisError::Cancelled)) => Err(e),
            Err(e) => {
                warn!(error = %e, "scenario stage falling back to rule-derived setups");
                analyst.fallback(signal, last_close, atr)
            }
        }
    }

    async fn gated_scenarios(
        &self,
        analyst: &ScenarioAnalyst,
        signal: &SignalState,
        patterns: &PatternFinding,
        last_close: f64,
        atr: Option<f64>,
    ) -> Result<RiskAnalysis> {
        let _permit = self.acquire_llm_slot().await?;
        analyst.analyze(signal, patterns, last_close, atr).await
    }

    /// Report stage. The synthesizer handles the in-band corrective retry;
    /// here we retry transport failures and otherwise fall back.
    async fn run_report(
        &self,
        signal: &SignalState,
        patterns: &PatternFinding,
        risk: &RiskAnalysis,
        attempts: &mut u32,
    ) -> Result<(ReportDraft, bool)> {
        let synthesizer = ReportSynthesizer::new(self.provider.clone(), self.config.report.clone());
        let result = self
            .with_retry(
                self.config.report.max_retries,
                self.config.report.timeout,
                "report",
                attempts,
                || self.gated_report(&synthesizer, signal, patterns, risk),
            )
            .await;
        match result {
            Ok(draft) => Ok((draft, false)),
            Err(AnalysisError::Cancelled) => Err(AnalysisError::Cancelled),
            Err(e) => {
                warn!(error = %e, "report stage falling back to rule-derived draft");
                Ok((synthesizer.fallback(signal, risk), true))
            }
        }
    }

    async fn gated_report(
        &self,
        synthesizer: &ReportSynthesizer,
        signal: &SignalState,
        patterns: &PatternFinding,
        risk: &RiskAnalysis,
    ) -> Result<ReportDraft> {
        let _permit = self.acquire_llm_slot().await?;
        synthesizer.synthesize(signal, patterns, risk).await
    }

    async fn acquire_llm_slot(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.llm_gate
            .acquire()
            .await
            .map_err(|_| AnalysisError::Other("llm gate closed".to_string()))
    }

    /// Run `op` under a per-attempt timeout with bounded retries.
    ///
    /// Only availability and rate-limit failures retry; a malformed reply
    /// will not improve with a resend, so it returns straight away. A
    /// timed-out attempt counts as an availability failure.
    async fn with_retry<T, F, Fut>(
        &self,
        max_retries: u32,
        timeout: Duration,
        stage: &str,
        attempts: &mut u32,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            *attempts = attempt + 1;
            let outcome = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::UpstreamUnavailable {
                    stage: stage.to_string(),
                    reason: format!("attempt timed out after {}s", timeout.as_secs()),
                }),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if should_retry(&e) && attempt < max_retries => {
                    let backoff = self.config.retry_backoff(attempt);
                    warn!(stage, attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "retrying stage");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn transition(&self, run: &mut AnalysisRun, next: RunState) {
        debug_assert!(
            run.state.can_transition_to(next),
            "illegal transition {} -> {}",
            run.state,
            next
        );
        debug!(from = %run.state, to = %next, "state transition");
        run.state = next;
    }
}

fn should_retry(error: &AnalysisError) -> bool {
    matches!(
        error,
        AnalysisError::UpstreamUnavailable { .. } | AnalysisError::RateLimited { .. }
    )
}

/// The stage to blame for a failure, from the state the run died in
fn failing_stage(state: RunState) -> StageName {
    match state {
        RunState::Pending | RunState::Fetching => StageName::Fetch,
        RunState::Indicators => StageName::Indicators,
        RunState::Signals => StageName::Signals,
        RunState::Patterns => StageName::Patterns,
        RunState::Scenarios => StageName::Scenarios,
        RunState::Report => StageName::Report,
        RunState::Assembling | RunState::Done | RunState::Failed => StageName::Assembly,
    }
}

/// Degradation disclosures for the report, in pipeline order
fn build_caveats(patterns: &PatternFinding, risk: &RiskAnalysis, report_degraded: bool) -> Vec<String> {
    let mut caveats = Vec::new();
    if let Some(note) = &patterns.note {
        caveats.push(note.clone());
    }
    if risk.degraded {
        caveats.push(
            "Trade scenarios are rule-derived from key levels and ATR, not analyst-proposed."
                .to_string(),
        );
    }
    if report_degraded {
        caveats.push(
            "Narrative synthesis was unavailable; summary and recommendation are rule-derived."
                .to_string(),
        );
    }
    caveats
}

struct StageTimer {
    started_at: chrono::DateTime<Utc>,
    instant: Instant,
}

impl StageTimer {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            instant: Instant::now(),
        }
    }

    fn finish(self, stage: StageName, attempts: u32, degraded: bool) -> StageTiming {
        StageTiming {
            stage,
            started_at: self.started_at,
            duration_ms: self.instant.elapsed().as_millis() as u64,
            attempts,
            degraded,
        }
    }
}

/// Builder for [`AnalysisPipeline`]
#[derive(Default)]
pub struct AnalysisPipelineBuilder {
    config: Option<PipelineConfig>,
    market: Option<Arc<dyn MarketDataProvider>>,
    renderer: Option<Arc<dyn ChartRenderer>>,
    provider: Option<Arc<dyn LLMProvider>>,
}

impl AnalysisPipelineBuilder {
    /// Set the pipeline configuration (defaults otherwise)
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the market data provider
    pub fn market(mut self, market: Arc<dyn MarketDataProvider>) -> Self {
        self.market = Some(market);
        self
    }

    /// Set the chart renderer
    pub fn renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Set the reasoning-service provider
    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build the pipeline, validating the configuration
    pub fn build(self) -> Result<AnalysisPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let market = self
            .market
            .ok_or_else(|| AnalysisError::ConfigError("market data provider not set".to_string()))?;
        let renderer = self
            .renderer
            .ok_or_else(|| AnalysisError::ConfigError("chart renderer not set".to_string()))?;
        let provider = self
            .provider
            .ok_or_else(|| AnalysisError::ConfigError("llm provider not set".to_string()))?;
        let llm_gate = Arc::new(Semaphore::new(config.max_concurrent_llm));
        Ok(AnalysisPipeline {
            config,
            market,
            renderer,
            provider,
            engine: IndicatorEngine::new(),
            synthesizer: SignalSynthesizer::new(),
            llm_gate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_stage_mapping() {
        assert_eq!(failing_stage(RunState::Pending), StageName::Fetch);
        assert_eq!(failing_stage(RunState::Fetching), StageName::Fetch);
        assert_eq!(failing_stage(RunState::Patterns), StageName::Patterns);
        assert_eq!(failing_stage(RunState::Assembling), StageName::Assembly);
    }

    #[test]
    fn test_retry_policy() {
        assert!(should_retry(&AnalysisError::UpstreamUnavailable {
            stage: "patterns".to_string(),
            reason: "down".to_string(),
        }));
        assert!(should_retry(&AnalysisError::RateLimited {
            provider: "scenarios".to_string(),
        }));
        assert!(!should_retry(&AnalysisError::MalformedUpstreamResponse {
            stage: "patterns".to_string(),
            reason: "not json".to_string(),
        }));
        assert!(!should_retry(&AnalysisError::NoValidScenarios));
        assert!(!should_retry(&AnalysisError::Cancelled));
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let result = AnalysisPipeline::builder().build();
        assert!(matches!(result, Err(AnalysisError::ConfigError(_))));
    }

    #[test]
    fn test_caveats_in_pipeline_order() {
        let patterns = PatternFinding::unavailable("vision down");
        let risk = RiskAnalysis {
            scenarios: vec![],
            best_rr: 0.0,
            average_rr: 0.0,
            grade: chart_core::RiskGrade::D,
            position_sizing: chart_core::PositionSizing::Standard,
            degraded: true,
        };
        let caveats = build_caveats(&patterns, &risk, true);
        assert_eq!(caveats.len(), 3);
        assert!(caveats[0].contains("Pattern analysis unavailable"));
        assert!(caveats[1].contains("rule-derived"));
    }
}
