//! Training-loop plumbing for end-to-end driving networks: dataset preparation, augmented minibatch sampling, early stopping and weight snapshots.
//!
//! The network itself is supplied through the [`train::Model`] trait.

pub mod augment;
pub mod checkpoint;
pub mod dataset;
pub mod error;
pub mod train;
pub mod util;

pub use error::{Result, TrainError};
