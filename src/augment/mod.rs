pub use distort::*;
pub use flip::*;
pub use perturb::*;

pub mod distort;
pub mod flip;
pub mod perturb;
