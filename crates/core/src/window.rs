//! Sliding windows over a value series.
//!
//! One window length is used for both training pairs and inference input, so a
//! model trained on `Window::new(n)` always receives `n` values at predict time.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Fixed-length window of consecutive values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    length: usize,
}

impl Window {
    pub fn new(length: usize) -> DomainResult<Self> {
        if length == 0 {
            return Err(DomainError::validation("window length must be >= 1"));
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Build `(window, next value)` pairs: `values.len() - length` of them.
    ///
    /// Empty when the series is not longer than the window.
    pub fn training_pairs(&self, values: &[f64]) -> TrainingSet {
        let count = values.len().saturating_sub(self.length);
        let mut inputs = Vec::with_capacity(count);
        let mut targets = Vec::with_capacity(count);
        for i in 0..count {
            inputs.push(values[i..i + self.length].to_vec());
            targets.push(values[i + self.length]);
        }
        TrainingSet {
            window: self.length,
            points: values.len(),
            inputs,
            targets,
        }
    }

    /// Input window ending just before `cursor` (`values[cursor - length..cursor]`).
    ///
    /// `None` unless `length <= cursor <= values.len()`.
    pub fn input_at<'a>(&self, values: &'a [f64], cursor: usize) -> Option<&'a [f64]> {
        if cursor < self.length || cursor > values.len() {
            return None;
        }
        Some(&values[cursor - self.length..cursor])
    }
}

/// Supervised training data derived from one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    pub window: usize,
    /// Length of the series the pairs were cut from.
    pub points: usize,
    pub inputs: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Split off the trailing `fraction` of pairs (chronological, not shuffled).
    pub fn split_tail(&self, fraction: f64) -> (TrainingSet, TrainingSet) {
        let held = ((self.len() as f64) * fraction.clamp(0.0, 1.0)).floor() as usize;
        let cut = self.len() - held;
        let head = TrainingSet {
            window: self.window,
            points: self.points,
            inputs: self.inputs[..cut].to_vec(),
            targets: self.targets[..cut].to_vec(),
        };
        let tail = TrainingSet {
            window: self.window,
            points: self.points,
            inputs: self.inputs[cut..].to_vec(),
            targets: self.targets[cut..].to_vec(),
        };
        (head, tail)
    }
}
