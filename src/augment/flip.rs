use ndarray::{ArrayD, ArrayViewD, Axis};

/// Mirrors a sample left to right, i.e. reverses its last (width) axis.
///
/// Works for frames (`C×H×W`) and clips (`C×T×H×W`) alike. Flipping twice gives back the original sample.
pub fn flip_horizontal(sample: ArrayViewD<'_, f32>) -> ArrayD<f32> {
    let mut view = sample;
    if view.ndim() == 0 {
        return view.to_owned();
    }
    let width_axis = Axis(view.ndim() - 1);
    view.invert_axis(width_axis);
    view.as_standard_layout().into_owned()
}
