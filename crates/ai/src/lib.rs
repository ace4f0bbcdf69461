//! `meterflow-ai`
//!
//! **Responsibility:** the sequence-model runtime used by the forecaster.
//!
//! - Models consume a fixed-length window of values and predict the next one.
//! - This crate stays storage-agnostic: windows and training sets are provided
//!   by callers (infra), and only the model artifact touches the filesystem.

pub mod artifact;
pub mod job;
pub mod model;
pub mod result;
pub mod source;
pub mod training;

pub use job::{AiJob, ForecastJob};
pub use model::{MlpRegressor, Persistence, SequenceModel, Standardizer};
pub use result::{AiError, Prediction};
pub use source::{FileModelSource, ModelSource, StaticModelSource};
pub use training::{Trainer, TrainerConfig, TrainingReport};
