use std::{fs::File, io::BufReader, path::{Path, PathBuf}};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::{checkpoint::EarlyStoppingConfig, dataset::BatchLoaderConfig, error::Result};

#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(pattern = "owned")]
#[serde(default)]
pub struct TrainingConfig {
    /// Upper bound on epochs; early stopping usually ends the run sooner.
    #[builder(default = "8000")]
    pub max_epochs: usize,

    #[builder(default = "16")]
    pub batch_size: usize,

    #[builder(default = "true")]
    pub shuffle: bool,

    #[builder(default = "0.75")]
    pub distort_fraction: f64,

    #[builder(default)]
    pub early_stopping: EarlyStoppingConfig,

    /// Where the best snapshot is moved once training halts.
    #[builder(default, setter(into, strip_option))]
    pub selected_model: Option<PathBuf>,

    /// Load the best snapshot back into the model once training halts.
    #[builder(default = "true")]
    pub restore_best: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_epochs: 8000,
            batch_size: 16,
            shuffle: true,
            distort_fraction: 0.75,
            early_stopping: EarlyStoppingConfig::default(),
            selected_model: None,
            restore_best: true,
        }
    }
}

impl TrainingConfig {
    /// Reads a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Shuffled, augmented batches for the training pass.
    pub fn train_loader_config(&self) -> BatchLoaderConfig {
        BatchLoaderConfig {
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            augment: true,
            distort_fraction: self.distort_fraction,
        }
    }

    /// Plain batches in dataset order for the validation pass, shrunk to fit small validation sets.
    pub fn validation_loader_config(&self, num_samples: usize) -> BatchLoaderConfig {
        BatchLoaderConfig {
            batch_size: self.batch_size.min(num_samples),
            shuffle: false,
            augment: false,
            distort_fraction: self.distort_fraction,
        }
    }
}
