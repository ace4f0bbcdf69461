use meterflow_core::DeviceId;

use crate::model::SequenceModel;
use crate::result::{AiError, Prediction};

/// A device-scoped inference unit.
///
/// Jobs receive their input from callers (infra) and never touch the store.
pub trait AiJob {
    type Input;

    /// The device this job forecasts for.
    fn device(&self) -> &DeviceId;

    /// The input the job will run inference on.
    fn input(&self) -> &Self::Input;

    /// Execute inference.
    fn run(&self) -> Result<Prediction, AiError>;
}

/// Predict the value that follows one input window.
#[derive(Debug)]
pub struct ForecastJob<'m, M: ?Sized> {
    device: DeviceId,
    window: Vec<f64>,
    model: &'m M,
}

impl<'m, M: SequenceModel + ?Sized> ForecastJob<'m, M> {
    pub fn new(device: DeviceId, window: Vec<f64>, model: &'m M) -> Self {
        Self {
            device,
            window,
            model,
        }
    }
}

impl<M: SequenceModel + ?Sized> AiJob for ForecastJob<'_, M> {
    type Input = Vec<f64>;

    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn input(&self) -> &Self::Input {
        &self.window
    }

    fn run(&self) -> Result<Prediction, AiError> {
        let value = self.model.predict(&self.window)?;
        let last = self.window.last().copied().unwrap_or(f64::NAN);
        Ok(Prediction::new(self.device.clone(), value, self.model.name()).with_explanation(format!(
            "next value after a window of {} (last observed {last:.3}) using {}",
            self.window.len(),
            self.model.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Persistence;

    #[test]
    fn forecast_job_wraps_the_model_output() {
        let dev = DeviceId::parse("devA").unwrap();
        let model = Persistence::new(2);
        let job = ForecastJob::new(dev.clone(), vec![4.0, 5.0], &model);

        assert_eq!(job.device(), &dev);
        assert_eq!(job.input(), &vec![4.0, 5.0]);
        let p = job.run().unwrap();
        assert_eq!(p.value, 5.0);
        assert_eq!(p.model, "persistence");
        assert!(p.explanation.is_some());
    }

    #[test]
    fn wrong_window_length_is_surfaced() {
        let dev = DeviceId::parse("devA").unwrap();
        let model = Persistence::new(3);
        let job = ForecastJob::new(dev, vec![1.0], &model);
        assert!(matches!(job.run(), Err(AiError::InvalidInput(_))));
    }
}
