use derive_builder::Builder;
use itertools::Itertools;
use ndarray::{Array1, ArrayD, ArrayView1, ArrayViewD, Axis};
use rand::{seq::SliceRandom, Rng};

use crate::{
    augment::{apply_distortion, distortion_counts, Distortion, Perturbation, RandomAffine},
    error::{Result, TrainError},
};

#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(pattern = "owned")]
pub struct BatchLoaderConfig {
    pub batch_size: usize,

    /// Draw a fresh permutation of the samples every time iteration starts.
    #[builder(default = "false")]
    pub shuffle: bool,

    /// Flip and perturb part of every batch. Turn off for validation passes.
    #[builder(default = "true")]
    pub augment: bool,

    /// Share of every batch that is drawn for distortion.
    #[builder(default = "0.75")]
    pub distort_fraction: f64,
}

/// One minibatch, owned by the caller for a single training step.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: ArrayD<f32>,
    pub targets: Array1<f32>,
    /// Source index of every batch row.
    pub indices: Vec<usize>,
    /// Batch rows that were mirrored.
    pub flipped: Vec<usize>,
    /// Batch rows that went through the perturbation.
    pub perturbed: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Produces augmented minibatches from borrowed samples and labels.
///
/// Only whole batches are produced: when the sample count is not a multiple of the batch size, the trailing samples of the (possibly shuffled) order are left out of that pass.
pub struct BatchLoader<'a, P = RandomAffine> {
    samples: ArrayViewD<'a, f32>,
    labels: ArrayView1<'a, f32>,
    config: BatchLoaderConfig,
    perturbation: P,
}

impl<'a, P: Perturbation> BatchLoader<'a, P> {
    pub fn new(
        samples: ArrayViewD<'a, f32>,
        labels: ArrayView1<'a, f32>,
        config: BatchLoaderConfig,
        perturbation: P,
    ) -> Result<Self> {
        check_inputs(&samples, &labels, &config)?;
        Ok(Self {
            samples,
            labels,
            config,
            perturbation,
        })
    }

    pub fn config(&self) -> &BatchLoaderConfig {
        &self.config
    }

    /// Number of batches every pass yields.
    pub fn num_batches(&self) -> usize {
        self.labels.len() / self.config.batch_size
    }

    /// Starts a new pass over the data. Shuffling, if enabled, happens here.
    pub fn iter<'l, R: Rng>(&'l self, rng: &'l mut R) -> Batches<'l, &'l P, R> {
        Batches::start(
            self.samples.view(),
            self.labels.view(),
            self.config.clone(),
            &self.perturbation,
            rng,
        )
    }
}

/// Lazy, finite sequence of batches for one pass. The sample order is fixed when the pass starts, so a new pass needs a new iterator.
pub struct Batches<'a, P, R> {
    samples: ArrayViewD<'a, f32>,
    labels: ArrayView1<'a, f32>,
    order: Vec<usize>,
    cursor: usize,
    config: BatchLoaderConfig,
    num_changes: usize,
    per_kind: usize,
    perturbation: P,
    rng: &'a mut R,
}

impl<'a, P: Perturbation, R: Rng> Batches<'a, P, R> {
    pub fn new(
        samples: ArrayViewD<'a, f32>,
        labels: ArrayView1<'a, f32>,
        config: BatchLoaderConfig,
        perturbation: P,
        rng: &'a mut R,
    ) -> Result<Self> {
        check_inputs(&samples, &labels, &config)?;
        Ok(Self::start(samples, labels, config, perturbation, rng))
    }

    fn start(
        samples: ArrayViewD<'a, f32>,
        labels: ArrayView1<'a, f32>,
        config: BatchLoaderConfig,
        perturbation: P,
        rng: &'a mut R,
    ) -> Self {
        let mut order = (0..labels.len()).collect_vec();
        if config.shuffle {
            order.shuffle(&mut *rng);
        }
        let (num_changes, per_kind) = if config.augment {
            distortion_counts(config.batch_size, config.distort_fraction).unwrap_or((0, 0))
        } else {
            (0, 0)
        };
        tracing::debug!(
            samples = labels.len(),
            batch_size = config.batch_size,
            shuffle = config.shuffle,
            augment = config.augment,
            "starting batch pass"
        );
        Self {
            samples,
            labels,
            order,
            cursor: 0,
            config,
            num_changes,
            per_kind,
            perturbation,
            rng,
        }
    }
}

impl<'a, P: Perturbation, R: Rng> Iterator for Batches<'a, P, R> {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        let batch_size = self.config.batch_size;
        if self.cursor + batch_size > self.order.len() {
            return None;
        }
        let indices = self.order[self.cursor..self.cursor + batch_size].to_vec();
        self.cursor += batch_size;

        let mut inputs = self.samples.select(Axis(0), &indices);
        let targets = self.labels.select(Axis(0), &indices);
        let Distortion { flipped, perturbed } = if self.config.augment {
            apply_distortion(
                &mut inputs,
                self.num_changes,
                self.per_kind,
                &self.perturbation,
                &mut *self.rng,
            )
        } else {
            Distortion::default()
        };
        Some(Batch {
            inputs,
            targets,
            indices,
            flipped,
            perturbed,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor) / self.config.batch_size;
        (remaining, Some(remaining))
    }
}

impl<'a, P: Perturbation, R: Rng> ExactSizeIterator for Batches<'a, P, R> {}

/// Iterates augmented minibatches of `batch_size` samples, distorting with the default [`RandomAffine`].
pub fn iterate_batches<'a, R: Rng>(
    samples: &'a ArrayD<f32>,
    labels: &'a Array1<f32>,
    batch_size: usize,
    shuffle: bool,
    rng: &'a mut R,
) -> Result<Batches<'a, RandomAffine, R>> {
    let config = BatchLoaderConfig {
        batch_size,
        shuffle,
        augment: true,
        distort_fraction: 0.75,
    };
    Batches::new(
        samples.view(),
        labels.view(),
        config,
        RandomAffine::default(),
        rng,
    )
}

fn check_inputs(
    samples: &ArrayViewD<'_, f32>,
    labels: &ArrayView1<'_, f32>,
    config: &BatchLoaderConfig,
) -> Result<()> {
    if samples.ndim() < 2 {
        return Err(TrainError::dimension_mismatch(format!(
            "samples need a sample axis and at least one data axis, got shape {:?}",
            samples.shape()
        )));
    }
    let num_samples = samples.len_of(Axis(0));
    if num_samples != labels.len() {
        return Err(TrainError::dimension_mismatch(format!(
            "{} samples but {} labels",
            num_samples,
            labels.len()
        )));
    }
    if config.batch_size == 0 {
        return Err(TrainError::invalid_configuration(
            "batch size must be positive",
        ));
    }
    if config.batch_size > num_samples {
        return Err(TrainError::invalid_configuration(format!(
            "batch size {} exceeds the {} available samples",
            config.batch_size, num_samples
        )));
    }
    if config.augment {
        distortion_counts(config.batch_size, config.distort_fraction)?;
    }
    Ok(())
}
