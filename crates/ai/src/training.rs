//! Mini-batch training for [`MlpRegressor`].
//!
//! Model:
//! - Standardise values with statistics from the training series.
//! - Minimise mean squared error with Adam over shuffled mini-batches.
//! - Hold out the chronologically last pairs for validation and stop early
//!   once validation loss stops improving for `patience` epochs.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use meterflow_core::TrainingSet;

use crate::model::{MlpRegressor, Standardizer};
use crate::result::AiError;

/// Fewer pairs than this and the whole set is used for training.
const MIN_PAIRS_FOR_VALIDATION: usize = 5;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub hidden_units: usize,
    /// Fraction of pairs (taken from the end) held out for validation.
    pub validation_split: f64,
    /// Epochs without improvement before stopping.
    pub patience: usize,
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 32,
            learning_rate: 0.001,
            hidden_units: 50,
            validation_split: 0.2,
            patience: 10,
            seed: 42,
        }
    }
}

/// Summary of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub pairs: usize,
    pub epochs_run: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
    pub stopped_early: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train a fresh model on `set`.
    ///
    /// An empty set fails fast with [`AiError::InsufficientHistory`].
    pub fn fit(&self, set: &TrainingSet) -> Result<(MlpRegressor, TrainingReport), AiError> {
        self.validate(set)?;
        let cfg = &self.config;

        let scaler = Standardizer::fit(&series_values(set));
        let (train, validation) = if set.len() >= MIN_PAIRS_FOR_VALIDATION && cfg.validation_split > 0.0 {
            set.split_tail(cfg.validation_split)
        } else {
            (set.clone(), TrainingSet::default())
        };
        let train = scaled(&train, &scaler);
        let validation = scaled(&validation, &scaler);

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut model = MlpRegressor::initialise(set.window, cfg.hidden_units, scaler, &mut rng);
        let mut adam = Adam::new(&model);
        let mut grads = Gradients::zeros(&model);
        let mut pre = Vec::with_capacity(cfg.hidden_units);

        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut best = f64::INFINITY;
        let mut stale = 0usize;
        let mut report = TrainingReport {
            pairs: set.len(),
            epochs_run: 0,
            train_loss: f64::NAN,
            validation_loss: None,
            stopped_early: false,
        };

        info!(
            pairs = set.len(),
            train = train.len(),
            validation = validation.len(),
            window = set.window,
            "training new model"
        );

        for epoch in 0..cfg.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(cfg.batch_size) {
                grads.clear();
                let scale = 1.0 / batch.len() as f64;
                for &i in batch {
                    let x = &train.inputs[i];
                    let y = model.forward_scaled(x, &mut pre);
                    let err = y - train.targets[i];
                    epoch_loss += err * err;
                    grads.accumulate(&model, x, &pre, 2.0 * err * scale);
                }
                adam.step(&mut model, &grads, cfg.learning_rate);
            }

            let train_loss = epoch_loss / train.len() as f64;
            if !train_loss.is_finite() {
                return Err(AiError::Training(format!(
                    "loss diverged at epoch {}",
                    epoch + 1
                )));
            }
            let validation_loss = (!validation.is_empty()).then(|| mse(&model, &validation, &mut pre));

            report.epochs_run = epoch + 1;
            report.train_loss = train_loss;
            report.validation_loss = validation_loss;
            debug!(epoch = epoch + 1, train_loss, validation_loss = ?validation_loss, "epoch finished");

            let monitored = validation_loss.unwrap_or(train_loss);
            if monitored < best {
                best = monitored;
                stale = 0;
            } else {
                stale += 1;
                if stale >= cfg.patience {
                    report.stopped_early = true;
                    break;
                }
            }
        }

        info!(
            epochs = report.epochs_run,
            train_loss = report.train_loss,
            validation_loss = ?report.validation_loss,
            stopped_early = report.stopped_early,
            "training finished"
        );

        Ok((model, report))
    }

    fn validate(&self, set: &TrainingSet) -> Result<(), AiError> {
        let cfg = &self.config;
        if set.window == 0 {
            return Err(AiError::InvalidInput("window must be >= 1".to_string()));
        }
        if set.is_empty() {
            return Err(AiError::InsufficientHistory {
                required: set.window + 1,
                available: set.points,
            });
        }
        if cfg.epochs == 0 || cfg.batch_size == 0 || cfg.hidden_units == 0 {
            return Err(AiError::InvalidInput(
                "epochs, batch_size and hidden_units must be >= 1".to_string(),
            ));
        }
        if !(cfg.learning_rate.is_finite() && cfg.learning_rate > 0.0) {
            return Err(AiError::InvalidInput(
                "learning_rate must be a finite positive number".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&cfg.validation_split) {
            return Err(AiError::InvalidInput(
                "validation_split must be in [0, 1)".to_string(),
            ));
        }
        let finite = set
            .inputs
            .iter()
            .flatten()
            .chain(&set.targets)
            .all(|v| v.is_finite());
        if !finite {
            return Err(AiError::InvalidInput(
                "training data contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }
}

/// The series the pairs were cut from: first window plus every target.
fn series_values(set: &TrainingSet) -> Vec<f64> {
    let mut values = set.inputs.first().cloned().unwrap_or_default();
    values.extend_from_slice(&set.targets);
    values
}

fn scaled(set: &TrainingSet, scaler: &Standardizer) -> TrainingSet {
    TrainingSet {
        window: set.window,
        points: set.points,
        inputs: set
            .inputs
            .iter()
            .map(|row| row.iter().map(|v| scaler.scale(*v)).collect())
            .collect(),
        targets: set.targets.iter().map(|v| scaler.scale(*v)).collect(),
    }
}

fn mse(model: &MlpRegressor, set: &TrainingSet, pre: &mut Vec<f64>) -> f64 {
    let total: f64 = set
        .inputs
        .iter()
        .zip(&set.targets)
        .map(|(x, t)| {
            let e = model.forward_scaled(x, pre) - t;
            e * e
        })
        .sum();
    total / set.len() as f64
}

/// Gradient buffers shaped like the model's weights.
#[derive(Debug, Clone)]
struct Gradients {
    w1: Vec<f64>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: f64,
}

impl Gradients {
    fn zeros(model: &MlpRegressor) -> Self {
        Self {
            w1: vec![0.0; model.w1.len()],
            b1: vec![0.0; model.b1.len()],
            w2: vec![0.0; model.w2.len()],
            b2: 0.0,
        }
    }

    fn clear(&mut self) {
        self.w1.fill(0.0);
        self.b1.fill(0.0);
        self.w2.fill(0.0);
        self.b2 = 0.0;
    }

    /// Backprop one sample given `d_out = dLoss/dOutput`.
    fn accumulate(&mut self, model: &MlpRegressor, x: &[f64], pre: &[f64], d_out: f64) {
        self.b2 += d_out;
        for (j, &z) in pre.iter().enumerate() {
            self.w2[j] += d_out * z.max(0.0);
            if z <= 0.0 {
                continue;
            }
            let dz = d_out * model.w2[j];
            self.b1[j] += dz;
            let row = &mut self.w1[j * model.window..(j + 1) * model.window];
            for (g, xi) in row.iter_mut().zip(x) {
                *g += dz * xi;
            }
        }
    }
}

/// Adam optimiser state (first/second moment per weight).
#[derive(Debug, Clone)]
struct Adam {
    m: Gradients,
    v: Gradients,
    t: i32,
}

impl Adam {
    fn new(model: &MlpRegressor) -> Self {
        Self {
            m: Gradients::zeros(model),
            v: Gradients::zeros(model),
            t: 0,
        }
    }

    fn step(&mut self, model: &mut MlpRegressor, g: &Gradients, lr: f64) {
        self.t += 1;
        let c1 = 1.0 - ADAM_BETA1.powi(self.t);
        let c2 = 1.0 - ADAM_BETA2.powi(self.t);
        update(&mut model.w1, &g.w1, &mut self.m.w1, &mut self.v.w1, lr, c1, c2);
        update(&mut model.b1, &g.b1, &mut self.m.b1, &mut self.v.b1, lr, c1, c2);
        update(&mut model.w2, &g.w2, &mut self.m.w2, &mut self.v.w2, lr, c1, c2);
        update(
            std::slice::from_mut(&mut model.b2),
            std::slice::from_ref(&g.b2),
            std::slice::from_mut(&mut self.m.b2),
            std::slice::from_mut(&mut self.v.b2),
            lr,
            c1,
            c2,
        );
    }
}

fn update(params: &mut [f64], grads: &[f64], m: &mut [f64], v: &mut [f64], lr: f64, c1: f64, c2: f64) {
    for i in 0..params.len() {
        let g = grads[i];
        m[i] = ADAM_BETA1 * m[i] + (1.0 - ADAM_BETA1) * g;
        v[i] = ADAM_BETA2 * v[i] + (1.0 - ADAM_BETA2) * g * g;
        let m_hat = m[i] / c1;
        let v_hat = v[i] / c2;
        params[i] -= lr * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SequenceModel;
    use meterflow_core::Window;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| 10.0 + (i % 8) as f64).collect()
    }

    #[test]
    fn empty_training_set_fails_fast() {
        let set = Window::new(24).unwrap().training_pairs(&[1.0, 2.0, 3.0]);
        let err = Trainer::default().fit(&set).unwrap_err();
        match err {
            AiError::InsufficientHistory {
                required,
                available,
            } => {
                assert_eq!(required, 25);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_hyperparameters_are_rejected() {
        let set = Window::new(2).unwrap().training_pairs(&ramp(10));
        let trainer = Trainer::new(TrainerConfig {
            learning_rate: 0.0,
            ..TrainerConfig::default()
        });
        assert!(matches!(trainer.fit(&set), Err(AiError::InvalidInput(_))));
    }

    #[test]
    fn training_reduces_loss_on_a_periodic_series() {
        let set = Window::new(8).unwrap().training_pairs(&ramp(200));
        let trainer = Trainer::new(TrainerConfig {
            epochs: 150,
            learning_rate: 0.01,
            patience: 150,
            ..TrainerConfig::default()
        });
        let (model, report) = trainer.fit(&set).unwrap();
        model.check().unwrap();
        assert_eq!(report.epochs_run, 150);
        assert!(report.validation_loss.is_some());
        // Standardised MSE of predicting the mean is ~1.0.
        assert!(report.train_loss < 0.5, "train loss {}", report.train_loss);

        let y = model.predict(&set.inputs[0]).unwrap();
        assert!(y.is_finite());
    }

    #[test]
    fn same_seed_same_model() {
        let set = Window::new(4).unwrap().training_pairs(&ramp(40));
        let trainer = Trainer::new(TrainerConfig {
            epochs: 3,
            ..TrainerConfig::default()
        });
        let (a, _) = trainer.fit(&set).unwrap();
        let (b, _) = trainer.fit(&set).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tiny_sets_train_without_validation() {
        let set = Window::new(2).unwrap().training_pairs(&[1.0, 2.0, 3.0, 4.0]);
        let (_, report) = Trainer::default().fit(&set).unwrap();
        assert_eq!(report.pairs, 2);
        assert_eq!(report.validation_loss, None);
    }
}
