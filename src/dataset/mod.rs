pub use dataset::*;
pub use image_dataset::*;
pub use load_external::*;
pub use loader::*;

pub mod dataset;
pub mod image_dataset;
pub mod load_external;
pub mod loader;
