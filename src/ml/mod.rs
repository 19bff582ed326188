//! Predictors
//!
//! A predictor maps a window of candles to a directional signal. Inference
//! and training are CPU-only and synchronous; callers move training onto a
//! blocking thread.

pub mod linear_trend;

use std::sync::Arc;

use crate::config::PredictorConfig;
use crate::domain::{Candle, PredictionSignal};
use crate::error::Result;

pub use linear_trend::LinearTrendPredictor;

/// Outcome of one training run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub samples: usize,
    /// Typical relative prediction error seen while fitting
    pub noise_band: f64,
}

pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;

    /// Candles a prediction looks at
    fn window(&self) -> usize;

    /// Predict from `window`, oldest candle first
    fn predict(&self, window: &[Candle]) -> Result<PredictionSignal>;

    /// Refit on the full persisted history
    fn train(&self, history: &[Candle]) -> Result<TrainingReport>;
}

pub fn build_predictors(configs: &[PredictorConfig]) -> Vec<Arc<dyn Predictor>> {
    configs
        .iter()
        .map(|c| Arc::new(LinearTrendPredictor::new(&c.name, c.window, c.horizon)) as Arc<dyn Predictor>)
        .collect()
}
