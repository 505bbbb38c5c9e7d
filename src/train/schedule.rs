use derive_builder::Builder;

/// A per-epoch learning rate schedule.
pub trait SchedulerAlgorithm {
    /// Called once before the first epoch with the epoch budget of the run.
    fn init(&mut self, max_epochs: usize);
    /// Learning rate to use for `epoch` (counted from 0).
    fn update(&mut self, epoch: usize) -> f64;
}

/// Moves the learning rate linearly from `start` at the first epoch to `stop` at the last one.
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(pattern = "owned")]
pub struct LinearDecay {
    #[builder(default = "0.03")]
    start: f64,
    #[builder(default = "0.001")]
    stop: f64,
    #[builder(setter(skip), default = "0")]
    max_epochs: usize,
}

impl LinearDecay {
    pub fn new(start: f64, stop: f64) -> Self {
        Self {
            start,
            stop,
            max_epochs: 0,
        }
    }
}

impl SchedulerAlgorithm for LinearDecay {
    fn init(&mut self, max_epochs: usize) {
        self.max_epochs = max_epochs;
    }

    fn update(&mut self, epoch: usize) -> f64 {
        if self.max_epochs <= 1 {
            return self.start;
        }
        let last = self.max_epochs - 1;
        let progress = epoch.min(last) as f64 / last as f64;
        self.start + (self.stop - self.start) * progress
    }
}

/// Multiplies the learning rate by `gamma` every `step_size` epochs.
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(pattern = "owned")]
pub struct StepDecay {
    #[builder(default = "0.001")]
    initial: f64,
    #[builder(default = "500")]
    step_size: usize,
    #[builder(default = "0.99")]
    gamma: f64,
}

impl SchedulerAlgorithm for StepDecay {
    fn init(&mut self, _max_epochs: usize) {}

    fn update(&mut self, epoch: usize) -> f64 {
        if self.step_size == 0 {
            return self.initial;
        }
        let steps = (epoch / self.step_size) as i32;
        self.initial * self.gamma.powi(steps)
    }
}
