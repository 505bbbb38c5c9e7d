use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// How the controller decides that training stopped improving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppingPolicy {
    /// Stop once `patience` epochs passed without matching or beating the best value.
    #[default]
    RollingBest,
    /// Stop once the value recorded `patience` epochs ago is strictly better than the current one.
    FixedLookback,
}

/// Whether larger (accuracy) or smaller (loss) metric values are better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricGoal {
    #[default]
    Maximize,
    Minimize,
}

impl MetricGoal {
    /// Ties count as an improvement.
    pub fn improves(self, candidate: f32, best: f32) -> bool {
        match self {
            MetricGoal::Maximize => candidate >= best,
            MetricGoal::Minimize => candidate <= best,
        }
    }

    pub fn strictly_better(self, a: f32, b: f32) -> bool {
        match self {
            MetricGoal::Maximize => a > b,
            MetricGoal::Minimize => a < b,
        }
    }
}

#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(pattern = "owned")]
#[serde(default)]
pub struct EarlyStoppingConfig {
    #[builder(default = "200")]
    pub patience: usize,
    /// Epochs that are multiples of this are always checkpointed.
    #[builder(default = "100")]
    pub checkpoint_interval: usize,
    #[builder(default)]
    pub policy: StoppingPolicy,
    #[builder(default)]
    pub goal: MetricGoal,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            patience: 200,
            checkpoint_interval: 100,
            policy: StoppingPolicy::RollingBest,
            goal: MetricGoal::Maximize,
        }
    }
}

/// What the training loop should do after an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub epoch: usize,
    pub is_best: bool,
    pub should_checkpoint: bool,
    pub should_stop: bool,
    pub epochs_since_improvement: usize,
    pub best_epoch: usize,
    pub best_value: f32,
}

/// Early-stopping and checkpoint controller fed with one validation metric per epoch.
///
/// Because the best epoch is always checkpointed, every `best_epoch` it reports has a persisted snapshot as long as the caller follows `should_checkpoint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStopping {
    config: EarlyStoppingConfig,
    history: Vec<f32>,
    best_epoch: Option<usize>,
    best_value: Option<f32>,
    epochs_since_improvement: usize,
}

impl EarlyStopping {
    pub fn new(config: EarlyStoppingConfig) -> Result<Self> {
        if config.patience == 0 {
            return Err(TrainError::invalid_configuration(
                "early stopping patience must be positive",
            ));
        }
        if config.checkpoint_interval == 0 {
            return Err(TrainError::invalid_configuration(
                "checkpoint interval must be positive",
            ));
        }
        Ok(Self {
            config,
            history: Vec::new(),
            best_epoch: None,
            best_value: None,
            epochs_since_improvement: 0,
        })
    }

    pub fn config(&self) -> &EarlyStoppingConfig {
        &self.config
    }

    pub fn history(&self) -> &[f32] {
        &self.history
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn best_value(&self) -> Option<f32> {
        self.best_value
    }

    pub fn epochs_since_improvement(&self) -> usize {
        self.epochs_since_improvement
    }

    /// Forgets all recorded epochs, keeping the configuration.
    pub fn reset(&mut self) {
        self.history.clear();
        self.best_epoch = None;
        self.best_value = None;
        self.epochs_since_improvement = 0;
    }

    /// Records the validation metric of a finished epoch. Call once per epoch, in epoch order.
    pub fn record(&mut self, epoch: usize, value: f32) -> Decision {
        let EarlyStoppingConfig {
            patience,
            checkpoint_interval,
            policy,
            goal,
        } = self.config;

        let recorded = self.history.len();
        let anchor = match policy {
            StoppingPolicy::FixedLookback if recorded >= patience => {
                Some(self.history[recorded - patience])
            }
            _ => None,
        };
        self.history.push(value);

        let is_best = match self.best_value {
            None => true,
            Some(best) => goal.improves(value, best),
        };
        if is_best {
            self.best_value = Some(value);
            self.best_epoch = Some(epoch);
            self.epochs_since_improvement = 0;
        } else {
            self.epochs_since_improvement += 1;
        }

        let should_checkpoint = epoch % checkpoint_interval == 0 || is_best;
        let should_stop = match policy {
            StoppingPolicy::RollingBest => self.epochs_since_improvement >= patience,
            StoppingPolicy::FixedLookback => {
                anchor.map_or(false, |anchor| goal.strictly_better(anchor, value))
            }
        };

        let best_epoch = self.best_epoch.unwrap_or(epoch);
        let best_value = self.best_value.unwrap_or(value);
        if should_stop {
            tracing::info!(epoch, best_epoch, best_value, "early stopping");
        }
        Decision {
            epoch,
            is_best,
            should_checkpoint,
            should_stop,
            epochs_since_improvement: self.epochs_since_improvement,
            best_epoch,
            best_value,
        }
    }
}
