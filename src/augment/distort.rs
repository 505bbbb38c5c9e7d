use ndarray::{ArrayD, Axis};
use rand::{seq::index, Rng};

use crate::error::{Result, TrainError};

use super::{flip_horizontal, Perturbation};

/// Batch positions that were changed by [`distort_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Distortion {
    pub flipped: Vec<usize>,
    pub perturbed: Vec<usize>,
}

/// Returns `(k, h)`: how many samples of a batch are drawn for distortion, and how many of those are flipped.
///
/// The next `h` drawn samples are perturbed, so when `k` is odd one drawn sample stays untouched.
pub fn distortion_counts(batch_size: usize, fraction: f64) -> Result<(usize, usize)> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(TrainError::invalid_configuration(format!(
            "distort fraction must lie in [0, 1], got {fraction}"
        )));
    }
    let num_changes = (batch_size as f64 * fraction).floor() as usize;
    if num_changes > batch_size {
        return Err(TrainError::invalid_configuration(format!(
            "cannot distort {num_changes} samples of a batch of {batch_size}"
        )));
    }
    Ok((num_changes, num_changes / 2))
}

/// Flips and perturbs a random subset of the samples stacked along axis 0 of `inputs`, in place.
pub fn distort_batch<P, R>(
    inputs: &mut ArrayD<f32>,
    fraction: f64,
    perturbation: &P,
    rng: &mut R,
) -> Result<Distortion>
where
    P: Perturbation + ?Sized,
    R: Rng,
{
    if inputs.ndim() < 2 {
        return Err(TrainError::dimension_mismatch(format!(
            "a batch needs a sample axis and at least one data axis, got shape {:?}",
            inputs.shape()
        )));
    }
    let batch_size = inputs.len_of(Axis(0));
    let (num_changes, per_kind) = distortion_counts(batch_size, fraction)?;
    Ok(apply_distortion(inputs, num_changes, per_kind, perturbation, rng))
}

/// Distorts a batch whose counts were already validated by [`distortion_counts`].
pub(crate) fn apply_distortion<P, R>(
    inputs: &mut ArrayD<f32>,
    num_changes: usize,
    per_kind: usize,
    perturbation: &P,
    rng: &mut R,
) -> Distortion
where
    P: Perturbation + ?Sized,
    R: Rng,
{
    let batch_size = inputs.len_of(Axis(0));
    let drawn = index::sample(&mut *rng, batch_size, num_changes).into_vec();
    let flipped = drawn[..per_kind].to_vec();
    let perturbed = drawn[per_kind..2 * per_kind].to_vec();

    for &position in &flipped {
        let mirrored = flip_horizontal(inputs.index_axis(Axis(0), position));
        inputs.index_axis_mut(Axis(0), position).assign(&mirrored);
    }
    for &position in &perturbed {
        let moved = perturbation.perturb(inputs.index_axis(Axis(0), position), rng);
        inputs.index_axis_mut(Axis(0), position).assign(&moved);
    }

    Distortion { flipped, perturbed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distortion_counts_test() {
        assert_eq!(distortion_counts(16, 0.75).unwrap(), (12, 6));
        assert_eq!(distortion_counts(10, 0.75).unwrap(), (7, 3));
        assert_eq!(distortion_counts(1, 0.75).unwrap(), (0, 0));
        assert_eq!(distortion_counts(4, 1.0).unwrap(), (4, 2));
        assert!(distortion_counts(4, 1.5).is_err());
        assert!(distortion_counts(4, -0.1).is_err());
    }
}
