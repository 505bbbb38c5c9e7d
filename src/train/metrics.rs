//! Objectives used by the steering and texting models, evaluated on plain arrays.

use ndarray::ArrayView1;

fn mean_of(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0f32, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Mean squared error, the regression loss for steering angles.
pub fn squared_error(predictions: ArrayView1<'_, f32>, targets: ArrayView1<'_, f32>) -> f32 {
    mean_of(
        predictions
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| (p - t) * (p - t)),
    )
}

/// Mean binary hinge loss `max(0, 1 - t * p)` for `±1` targets.
pub fn binary_hinge_loss(predictions: ArrayView1<'_, f32>, targets: ArrayView1<'_, f32>) -> f32 {
    mean_of(
        predictions
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| (1.0 - t * p).max(0.0)),
    )
}

/// Share of predictions whose sign matches the `±1` target. A prediction of exactly zero never matches.
pub fn sign_accuracy(predictions: ArrayView1<'_, f32>, targets: ArrayView1<'_, f32>) -> f32 {
    mean_of(predictions.iter().zip(targets.iter()).map(|(&p, &t)| {
        let sign = if p > 0.0 {
            1.0
        } else if p < 0.0 {
            -1.0
        } else {
            0.0
        };
        if sign == t {
            1.0
        } else {
            0.0
        }
    }))
}
