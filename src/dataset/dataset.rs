use itertools::Itertools;
use ndarray::{Array1, ArrayD, Axis, IxDyn};
use rand::{seq::SliceRandom, Rng};

use crate::{
    augment::RandomAffine,
    error::{Result, TrainError},
};

use super::{BatchLoader, BatchLoaderConfig};

/// A labeled set of equally shaped samples.
///
/// Samples are stacked along axis 0, so a set of frames has shape `N×C×H×W` and a set of clips `N×C×T×H×W`. Labels are either continuous targets (steering angle) or `±1` classes.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    samples: ArrayD<f32>,
    labels: Array1<f32>,
}

impl Dataset {
    pub fn new(samples: ArrayD<f32>, labels: Array1<f32>) -> Result<Self> {
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
        Ok(Self { samples, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn samples(&self) -> &ArrayD<f32> {
        &self.samples
    }

    pub fn labels(&self) -> &Array1<f32> {
        &self.labels
    }

    /// The shape of a single sample, without the leading sample axis.
    pub fn sample_shape(&self) -> &[usize] {
        &self.samples.shape()[1..]
    }

    pub fn into_parts(self) -> (ArrayD<f32>, Array1<f32>) {
        (self.samples, self.labels)
    }

    /// Gathers the samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            samples: self.samples.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        }
    }

    /// Shuffles once and cuts the set into a training part of `floor(len * train_fraction)` samples and a validation part holding the rest.
    pub fn split<R: Rng>(&self, train_fraction: f64, rng: &mut R) -> Result<(Dataset, Dataset)> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(TrainError::invalid_configuration(format!(
                "train fraction must lie in (0, 1), got {train_fraction}"
            )));
        }
        let mut order = (0..self.len()).collect_vec();
        order.shuffle(rng);
        let num_train = (self.len() as f64 * train_fraction).floor() as usize;
        let (train, validation) = order.split_at(num_train);
        Ok((self.select(train), self.select(validation)))
    }

    /// Reinterprets every sample with a new shape holding the same number of elements.
    pub fn reshape_samples(self, sample_shape: &[usize]) -> Result<Self> {
        let num_samples = self.len();
        let shape = std::iter::once(num_samples)
            .chain(sample_shape.iter().copied())
            .collect_vec();
        if shape.iter().product::<usize>() != self.samples.len() {
            return Err(TrainError::dimension_mismatch(format!(
                "cannot reshape samples of shape {:?} into [{}]",
                self.sample_shape(),
                sample_shape.iter().join(", ")
            )));
        }
        let samples = self
            .samples
            .as_standard_layout()
            .into_owned()
            .into_shape(IxDyn(&shape))
            .map_err(|e| TrainError::dimension_mismatch(e.to_string()))?;
        Self::new(samples, self.labels)
    }

    /// Keeps a single frame of every clip. `axis` counts from the first axis of a sample, e.g. `1` for the time axis of `C×T×H×W` clips.
    pub fn select_frame(&self, axis: usize, frame: usize) -> Result<Self> {
        let sample_ndim = self.samples.ndim() - 1;
        if axis >= sample_ndim || sample_ndim < 2 {
            return Err(TrainError::dimension_mismatch(format!(
                "cannot take axis {axis} of samples shaped {:?}",
                self.sample_shape()
            )));
        }
        let frames = self.samples.len_of(Axis(axis + 1));
        if frame >= frames {
            return Err(TrainError::dimension_mismatch(format!(
                "frame {frame} out of range for {frames} frames"
            )));
        }
        Self::new(
            self.samples.index_axis(Axis(axis + 1), frame).to_owned(),
            self.labels.clone(),
        )
    }

    /// Multiplies all intensities by `factor`, e.g. `1.0 / 255.0` to map raw pixels into `[0, 1]`.
    pub fn scale(mut self, factor: f32) -> Self {
        self.samples.mapv_inplace(|x| x * factor);
        self
    }

    /// Maps labels found in `positive` to `+1` and every other label to `-1`.
    pub fn binarize_labels(mut self, positive: &[f32]) -> Self {
        self.labels
            .mapv_inplace(|label| if positive.contains(&label) { 1.0 } else { -1.0 });
        self
    }

    /// Starts a batch loader over this set, distorting samples with the default [`RandomAffine`].
    pub fn loader(&self, config: BatchLoaderConfig) -> Result<BatchLoader<'_, RandomAffine>> {
        BatchLoader::new(
            self.samples.view(),
            self.labels.view(),
            config,
            RandomAffine::default(),
        )
    }
}
