use serde::{Deserialize, Serialize};
use thiserror::Error;

use meterflow_core::DeviceId;

/// Result of one forecast inference.
///
/// This is not a stored sample yet: the forecaster decides the timestamp and
/// appends it to the device's forecast series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub device: DeviceId,

    /// Predicted next value, in the units of the raw series.
    pub value: f64,

    /// Name of the model that produced the value.
    pub model: String,

    /// Optional human-readable explanation.
    pub explanation: Option<String>,
}

impl Prediction {
    pub fn new(device: DeviceId, value: f64, model: impl Into<String>) -> Self {
        Self {
            device,
            value,
            model: model.into(),
            explanation: None,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("invalid model input: {0}")]
    InvalidInput(String),

    #[error("insufficient history: need at least {required} points to train, got {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("training failed: {0}")]
    Training(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model artifact error: {0}")]
    Artifact(String),
}
