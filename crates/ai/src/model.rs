//! Sequence models: one window of values in, the next value out.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::result::AiError;

/// A next-value predictor over a fixed-length window.
///
/// Implementations must be deterministic for a given set of weights.
pub trait SequenceModel: Send + Sync {
    /// Number of values `predict` expects.
    fn window(&self) -> usize;

    /// Short identifier used in logs and predictions.
    fn name(&self) -> &'static str;

    /// Predict the value following `input` (oldest first).
    fn predict(&self, input: &[f64]) -> Result<f64, AiError>;

    /// Structural sanity check (weights present and finite).
    fn check(&self) -> Result<(), AiError> {
        Ok(())
    }
}

pub(crate) fn check_input(window: usize, input: &[f64]) -> Result<(), AiError> {
    if input.len() != window {
        return Err(AiError::InvalidInput(format!(
            "expected a window of {window} values, got {}",
            input.len()
        )));
    }
    if let Some(pos) = input.iter().position(|v| !v.is_finite()) {
        return Err(AiError::InvalidInput(format!(
            "non-finite value at window position {pos}"
        )));
    }
    Ok(())
}

/// Baseline model: the next value equals the last observed one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persistence {
    window: usize,
}

impl Persistence {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl SequenceModel for Persistence {
    fn window(&self) -> usize {
        self.window
    }

    fn name(&self) -> &'static str {
        "persistence"
    }

    fn predict(&self, input: &[f64]) -> Result<f64, AiError> {
        check_input(self.window, input)?;
        input
            .last()
            .copied()
            .ok_or_else(|| AiError::InvalidInput("empty window".to_string()))
    }

    fn check(&self) -> Result<(), AiError> {
        if self.window == 0 {
            return Err(AiError::InvalidInput("window must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Affine scaling fitted on training values (zero mean, unit variance).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: f64,
    pub std: f64,
}

impl Standardizer {
    pub fn identity() -> Self {
        Self {
            mean: 0.0,
            std: 1.0,
        }
    }

    /// Population mean/std of `values`; a constant series gets `std = 1`.
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::identity();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let std = var.sqrt();
        Self {
            mean,
            std: if std > f64::EPSILON { std } else { 1.0 },
        }
    }

    pub fn scale(&self, v: f64) -> f64 {
        (v - self.mean) / self.std
    }

    pub fn unscale(&self, v: f64) -> f64 {
        v * self.std + self.mean
    }
}

/// Small feed-forward regressor: `window -> hidden (ReLU) -> 1`.
///
/// Weights live in row-major vectors so the trainer can step them with Adam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpRegressor {
    pub(crate) window: usize,
    pub(crate) hidden: usize,
    /// `hidden x window`, row-major.
    pub(crate) w1: Vec<f64>,
    pub(crate) b1: Vec<f64>,
    pub(crate) w2: Vec<f64>,
    pub(crate) b2: f64,
    pub(crate) scaler: Standardizer,
}

impl MlpRegressor {
    /// Fresh weights: He-uniform for both layers, zero biases.
    pub fn initialise<R: Rng>(window: usize, hidden: usize, scaler: Standardizer, rng: &mut R) -> Self {
        let limit1 = (6.0 / window as f64).sqrt();
        let limit2 = (6.0 / hidden as f64).sqrt();
        let w1 = (0..hidden * window)
            .map(|_| rng.gen_range(-limit1..limit1))
            .collect();
        let w2 = (0..hidden).map(|_| rng.gen_range(-limit2..limit2)).collect();
        Self {
            window,
            hidden,
            w1,
            b1: vec![0.0; hidden],
            w2,
            b2: 0.0,
            scaler,
        }
    }

    /// Forward pass in scaled space; fills `pre_activation` with the hidden
    /// layer's inputs (needed for backprop).
    pub(crate) fn forward_scaled(&self, x: &[f64], pre_activation: &mut Vec<f64>) -> f64 {
        pre_activation.clear();
        let mut out = self.b2;
        for j in 0..self.hidden {
            let row = &self.w1[j * self.window..(j + 1) * self.window];
            let z = self.b1[j] + row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>();
            pre_activation.push(z);
            out += self.w2[j] * z.max(0.0);
        }
        out
    }
}

impl SequenceModel for MlpRegressor {
    fn window(&self) -> usize {
        self.window
    }

    fn name(&self) -> &'static str {
        "mlp"
    }

    fn predict(&self, input: &[f64]) -> Result<f64, AiError> {
        check_input(self.window, input)?;
        let x: Vec<f64> = input.iter().map(|v| self.scaler.scale(*v)).collect();
        let mut buf = Vec::with_capacity(self.hidden);
        let y = self.scaler.unscale(self.forward_scaled(&x, &mut buf));
        if !y.is_finite() {
            return Err(AiError::InferenceFailed(format!(
                "model produced a non-finite value ({y})"
            )));
        }
        Ok(y)
    }

    fn check(&self) -> Result<(), AiError> {
        if self.window == 0 || self.hidden == 0 {
            return Err(AiError::InvalidInput(
                "window and hidden units must be >= 1".to_string(),
            ));
        }
        if self.w1.len() != self.hidden * self.window
            || self.b1.len() != self.hidden
            || self.w2.len() != self.hidden
        {
            return Err(AiError::InvalidInput(format!(
                "weight shapes do not match window={} hidden={}",
                self.window, self.hidden
            )));
        }
        let finite = self
            .w1
            .iter()
            .chain(&self.b1)
            .chain(&self.w2)
            .chain([&self.b2, &self.scaler.mean, &self.scaler.std])
            .all(|v| v.is_finite());
        if !finite || self.scaler.std <= 0.0 {
            return Err(AiError::InvalidInput(
                "weights or scaling contain non-finite values".to_string(),
            ));
        }
        Ok(())
    }
}
