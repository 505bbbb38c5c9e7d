use derive_builder::Builder;
use ndarray::{ArrayD, ArrayViewD};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// A random, shape-preserving distortion applied to a single sample.
///
/// The batch sampler only relies on the output having the same shape as the input. Implementations draw any randomness they need from the provided generator so that a seeded run is reproducible.
pub trait Perturbation {
    fn perturb(&self, sample: ArrayViewD<'_, f32>, rng: &mut dyn RngCore) -> ArrayD<f32>;
}

impl<P: Perturbation + ?Sized> Perturbation for &P {
    fn perturb(&self, sample: ArrayViewD<'_, f32>, rng: &mut dyn RngCore) -> ArrayD<f32> {
        (**self).perturb(sample, rng)
    }
}

impl<P: Perturbation + ?Sized> Perturbation for Box<P> {
    fn perturb(&self, sample: ArrayViewD<'_, f32>, rng: &mut dyn RngCore) -> ArrayD<f32> {
        (**self).perturb(sample, rng)
    }
}

/// A [`Perturbation`] backed by a closure. Build one with [`perturbation_fn`].
pub struct FnPerturbation<F>(F);

impl<F> Perturbation for FnPerturbation<F>
where
    F: Fn(ArrayViewD<'_, f32>, &mut dyn RngCore) -> ArrayD<f32>,
{
    fn perturb(&self, sample: ArrayViewD<'_, f32>, rng: &mut dyn RngCore) -> ArrayD<f32> {
        (self.0)(sample, rng)
    }
}

pub fn perturbation_fn<F>(f: F) -> FnPerturbation<F>
where
    F: Fn(ArrayViewD<'_, f32>, &mut dyn RngCore) -> ArrayD<f32>,
{
    FnPerturbation(f)
}

/// Random rotation (and optional translation) of every `H×W` plane of a sample.
///
/// One angle is drawn uniformly from `[-max_degrees, max_degrees]` per sample, so all channels and frames of a clip move together. `max_shift` is a fraction of the plane width/height. Pixels that map outside the source plane are set to `fill`.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct RandomAffine {
    #[builder(default = "15.0")]
    pub max_degrees: f32,
    #[builder(default = "0.0")]
    pub max_shift: f32,
    #[builder(default = "0.0")]
    pub fill: f32,
}

impl Default for RandomAffine {
    fn default() -> Self {
        Self {
            max_degrees: 15.0,
            max_shift: 0.0,
            fill: 0.0,
        }
    }
}

impl RandomAffine {
    /// Rotates by `angle` radians about the plane centre, then translates by `(shift_x, shift_y)` pixels.
    ///
    /// Nearest-neighbour sampling; samples with fewer than two axes are returned unchanged.
    pub fn warp(
        &self,
        sample: ArrayViewD<'_, f32>,
        angle: f32,
        shift_x: f32,
        shift_y: f32,
    ) -> ArrayD<f32> {
        let ndim = sample.ndim();
        if ndim < 2 {
            return sample.to_owned();
        }
        let (height, width) = (sample.shape()[ndim - 2], sample.shape()[ndim - 1]);
        let (center_y, center_x) = ((height as f32 - 1.0) / 2.0, (width as f32 - 1.0) / 2.0);
        let (sin, cos) = angle.sin_cos();

        let mut output = ArrayD::from_elem(sample.raw_dim(), self.fill);
        for (index, value) in output.indexed_iter_mut() {
            let dy = index[ndim - 2] as f32 - center_y - shift_y;
            let dx = index[ndim - 1] as f32 - center_x - shift_x;
            let source_x = (cos * dx + sin * dy + center_x).round();
            let source_y = (-sin * dx + cos * dy + center_y).round();
            if source_x < 0.0
                || source_y < 0.0
                || source_x >= width as f32
                || source_y >= height as f32
            {
                continue;
            }
            let mut source = index.clone();
            source[ndim - 2] = source_y as usize;
            source[ndim - 1] = source_x as usize;
            *value = sample[&source];
        }
        output
    }
}

impl Perturbation for RandomAffine {
    fn perturb(&self, sample: ArrayViewD<'_, f32>, rng: &mut dyn RngCore) -> ArrayD<f32> {
        let ndim = sample.ndim();
        if ndim < 2 {
            return sample.to_owned();
        }
        let (height, width) = (sample.shape()[ndim - 2], sample.shape()[ndim - 1]);
        let angle = symmetric_uniform(rng, self.max_degrees).to_radians();
        let shift_x = symmetric_uniform(rng, self.max_shift) * width as f32;
        let shift_y = symmetric_uniform(rng, self.max_shift) * height as f32;
        self.warp(sample, angle, shift_x, shift_y)
    }
}

fn symmetric_uniform(rng: &mut dyn RngCore, bound: f32) -> f32 {
    if bound > 0.0 {
        rng.gen_range(-bound..=bound)
    } else {
        0.0
    }
}
