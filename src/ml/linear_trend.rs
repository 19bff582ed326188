//! Least-squares trend predictor.
//!
//! Fits a line through the last `window` closes and extrapolates it
//! `horizon` candles ahead. The classifier calls a move only when it is
//! larger than the noise band fitted at training time.

use chrono::Utc;
use std::sync::RwLock;
use tracing::debug;

use super::{Predictor, TrainingReport};
use crate::domain::{Candle, PredictionSignal, TradeCommand};
use crate::error::{Result, SwapdError};

pub struct LinearTrendPredictor {
    name: String,
    window: usize,
    horizon: u32,
    noise_band: RwLock<Option<f64>>,
}

impl LinearTrendPredictor {
    pub fn new(name: &str, window: usize, horizon: u32) -> Self {
        Self {
            name: name.to_string(),
            window: window.max(2),
            horizon: horizon.max(1),
            noise_band: RwLock::new(None),
        }
    }

    pub fn noise_band(&self) -> Option<f64> {
        *self.noise_band.read().unwrap_or_else(|p| p.into_inner())
    }

    fn extrapolate(&self, closes: &[f64]) -> f64 {
        let n = closes.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = closes.iter().sum::<f64>() / n;

        let (mut cov, mut var) = (0.0, 0.0);
        for (i, y) in closes.iter().enumerate() {
            let dx = i as f64 - mean_x;
            cov += dx * (y - mean_y);
            var += dx * dx;
        }
        let slope = if var > 0.0 { cov / var } else { 0.0 };
        let target_x = n - 1.0 + self.horizon as f64;
        mean_y + slope * (target_x - mean_x)
    }

    fn classify(&self, last_close: f64, predicted: f64, band: f64) -> TradeCommand {
        let change = (predicted - last_close) / last_close;
        if change > band {
            TradeCommand::Buy
        } else if change < -band {
            TradeCommand::Sell
        } else {
            TradeCommand::Hold
        }
    }
}

fn closes(candles: &[Candle]) -> Result<Vec<f64>> {
    candles
        .iter()
        .map(|c| {
            if c.close.is_finite() && c.close > 0.0 {
                Ok(c.close)
            } else {
                Err(SwapdError::Prediction(format!(
                    "invalid close {} at {}",
                    c.close, c.time
                )))
            }
        })
        .collect()
}

/// Seconds between consecutive candles, one minute when unknown
fn step_seconds(candles: &[Candle]) -> i64 {
    match candles {
        [.., a, b] if b.time > a.time => b.time - a.time,
        _ => 60,
    }
}

impl Predictor for LinearTrendPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    fn window(&self) -> usize {
        self.window
    }

    fn predict(&self, window: &[Candle]) -> Result<PredictionSignal> {
        let band = self
            .noise_band()
            .ok_or_else(|| SwapdError::Prediction(format!("{} is not trained", self.name)))?;

        if window.len() < self.window {
            return Err(SwapdError::Prediction(format!(
                "{} needs {} candles, got {}",
                self.name,
                self.window,
                window.len()
            )));
        }

        let recent = &window[window.len() - self.window..];
        let closes = closes(recent)?;
        let predicted = self.extrapolate(&closes);
        if !predicted.is_finite() {
            return Err(SwapdError::Prediction(format!("{} produced {}", self.name, predicted)));
        }

        let last = &recent[recent.len() - 1];
        let command = self.classify(last.close, predicted, band);
        debug!(
            predictor = %self.name,
            last = last.close,
            predicted,
            %command,
            "Prediction"
        );

        Ok(PredictionSignal {
            predictor: self.name.clone(),
            produced_at: Utc::now(),
            target_time: last.time + step_seconds(recent) * self.horizon as i64,
            predicted_value: predicted,
            command,
        })
    }

    fn train(&self, history: &[Candle]) -> Result<TrainingReport> {
        let closes = closes(history)?;
        let horizon = self.horizon as usize;
        if closes.len() < self.window + horizon {
            return Err(SwapdError::Prediction(format!(
                "{} needs at least {} candles to train, got {}",
                self.name,
                self.window + horizon,
                closes.len()
            )));
        }

        let mut total_error = 0.0;
        let mut samples = 0;
        for end in self.window..=closes.len() - horizon {
            let predicted = self.extrapolate(&closes[end - self.window..end]);
            let actual = closes[end + horizon - 1];
            total_error += ((predicted - actual) / actual).abs();
            samples += 1;
        }

        let noise_band = total_error / samples as f64;
        if !noise_band.is_finite() {
            return Err(SwapdError::Prediction(format!("{} fitted a non-finite band", self.name)));
        }

        *self.noise_band.write().unwrap_or_else(|p| p.into_inner()) = Some(noise_band);
        Ok(TrainingReport { samples, noise_band })
    }
}
