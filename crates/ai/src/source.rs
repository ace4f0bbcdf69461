//! Where the forecaster gets its model from.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use meterflow_core::TrainingSet;

use crate::artifact;
use crate::model::{MlpRegressor, SequenceModel};
use crate::result::AiError;
use crate::training::Trainer;

/// Provider of the process-wide sequence model.
pub trait ModelSource: Send + Sync {
    type Model: SequenceModel;

    /// Obtain a model for `training.window`: reuse a persisted one when
    /// possible, otherwise build one from `training`.
    fn obtain(&self, training: &TrainingSet) -> Result<Self::Model, AiError>;

    /// Re-acquisition check run before every forecast.
    fn validate(&self, model: &Self::Model, window: usize) -> Result<(), AiError> {
        if model.window() != window {
            return Err(AiError::InvalidInput(format!(
                "model expects a window of {}, forecaster uses {window}",
                model.window()
            )));
        }
        model.check()
    }
}

/// Loads the artifact at `path` or trains and persists a new model there.
#[derive(Debug, Clone)]
pub struct FileModelSource {
    path: PathBuf,
    trainer: Trainer,
}

impl FileModelSource {
    pub fn new(path: impl Into<PathBuf>, trainer: Trainer) -> Self {
        Self {
            path: path.into(),
            trainer,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelSource for FileModelSource {
    type Model = MlpRegressor;

    fn obtain(&self, training: &TrainingSet) -> Result<MlpRegressor, AiError> {
        match artifact::load(&self.path) {
            Ok(Some(model)) => match self.validate(&model, training.window) {
                Ok(()) => {
                    info!(path = %self.path.display(), window = model.window(), "loaded existing model");
                    return Ok(model);
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "persisted model is incompatible; retraining");
                }
            },
            Ok(None) => {
                info!(path = %self.path.display(), "no persisted model; training a new one");
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "persisted model is unreadable; retraining");
            }
        }

        let (model, report) = self.trainer.fit(training)?;
        artifact::save(&self.path, &model)?;
        info!(
            path = %self.path.display(),
            epochs = report.epochs_run,
            train_loss = report.train_loss,
            "trained and saved new model"
        );
        Ok(model)
    }
}

/// Hands out a fixed model (baseline runs, tests).
#[derive(Debug, Clone)]
pub struct StaticModelSource<M> {
    model: M,
}

impl<M> StaticModelSource<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M> ModelSource for StaticModelSource<M>
where
    M: SequenceModel + Clone,
{
    type Model = M;

    fn obtain(&self, training: &TrainingSet) -> Result<M, AiError> {
        self.validate(&self.model, training.window)?;
        Ok(self.model.clone())
    }
}
