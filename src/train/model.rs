use ndarray::{Array1, ArrayD};
use serde::{Deserialize, Serialize};

use crate::checkpoint::ParamDict;

/// Loss and metric of one validation batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f32,
    /// Accuracy for classifiers; whatever quantity early stopping should watch otherwise.
    pub metric: f32,
}

/// The network being trained.
///
/// Layers, gradients and optimizer updates live behind this trait; the training loop only feeds batches and moves parameters in and out.
pub trait Model {
    /// Runs one optimizer step on a batch and returns its training loss.
    fn train_batch(&mut self, inputs: &ArrayD<f32>, targets: &Array1<f32>) -> anyhow::Result<f32>;

    /// Evaluates a batch without updating parameters.
    fn validate_batch(
        &mut self,
        inputs: &ArrayD<f32>,
        targets: &Array1<f32>,
    ) -> anyhow::Result<Evaluation>;

    fn parameters(&self) -> ParamDict;

    fn load_parameters(&mut self, parameters: ParamDict) -> anyhow::Result<()>;

    /// Called at the start of every epoch when a learning rate schedule is configured.
    fn set_learning_rate(&mut self, _learning_rate: f64) {}
}
