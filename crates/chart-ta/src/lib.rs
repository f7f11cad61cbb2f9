//! Deterministic technical analysis for chart-rs
//!
//! Two pure components:
//!
//! - [`IndicatorEngine`] turns a validated candle series into an
//!   [`chart_core::IndicatorSet`], computing independent families in
//!   parallel and masking warm-up windows with `None`.
//! - [`SignalSynthesizer`] turns an indicator set into a
//!   [`chart_core::SignalState`] with fixed, documented rules. No I/O, no
//!   randomness: equal inputs give byte-equal serialized output.

pub mod engine;
pub mod levels;
pub mod momentum;
pub mod synthesizer;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use engine::IndicatorEngine;
pub use synthesizer::SignalSynthesizer;

/// Minimum candles required before the engine will run at all
pub const MIN_CANDLES: usize = 50;
