use std::{fs::File, io::BufReader, path::Path};

use derive_builder::Builder;
use ndarray::{Array1, ArrayD, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, ReadNpyExt, ReadableElement};

use crate::error::{Result, TrainError};

use super::Dataset;

/// Loads a dataset stored as numpy arrays. Integer and double precision arrays are converted to `f32`.
pub trait LoadFromNpy: Sized {
    /// Loads samples and labels from two `.npy` files.
    fn from_npy<P: AsRef<Path>, Q: AsRef<Path>>(samples_path: P, labels_path: Q) -> Result<Self>;

    /// Loads samples and labels from two named arrays of one `.npz` archive.
    fn from_npz<P: AsRef<Path>>(path: P, config: &NpzDatasetConfig) -> Result<Self>;
}

#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(pattern = "owned")]
pub struct NpzDatasetConfig {
    #[builder(default = "\"samples\".to_owned()")]
    pub samples_key: String,
    #[builder(default = "\"labels\".to_owned()")]
    pub labels_key: String,
}

impl Default for NpzDatasetConfig {
    fn default() -> Self {
        Self {
            samples_key: "samples".to_owned(),
            labels_key: "labels".to_owned(),
        }
    }
}

impl LoadFromNpy for Dataset {
    fn from_npy<P: AsRef<Path>, Q: AsRef<Path>>(samples_path: P, labels_path: Q) -> Result<Self> {
        let samples = read_npy_f32(samples_path.as_ref())?;
        let labels = read_npy_f32(labels_path.as_ref())?;
        let dataset = Dataset::new(samples, flatten(labels))?;
        tracing::info!(
            path = %samples_path.as_ref().display(),
            samples = dataset.len(),
            shape = ?dataset.sample_shape(),
            "loaded dataset"
        );
        Ok(dataset)
    }

    fn from_npz<P: AsRef<Path>>(path: P, config: &NpzDatasetConfig) -> Result<Self> {
        let path = path.as_ref();
        let samples = read_npz_f32(path, &config.samples_key)?;
        let labels = read_npz_f32(path, &config.labels_key)?;
        let dataset = Dataset::new(samples, flatten(labels))?;
        tracing::info!(
            path = %path.display(),
            samples = dataset.len(),
            shape = ?dataset.sample_shape(),
            "loaded dataset"
        );
        Ok(dataset)
    }
}

fn flatten(labels: ArrayD<f32>) -> Array1<f32> {
    labels.iter().copied().collect()
}

fn read_npy_f32(path: &Path) -> Result<ArrayD<f32>> {
    read_npy_converted::<f32>(path, |x| x)
        .or_else(|_| read_npy_converted::<f64>(path, |x| x as f32))
        .or_else(|_| read_npy_converted::<i64>(path, |x| x as f32))
        .or_else(|_| read_npy_converted::<i32>(path, |x| x as f32))
        .or_else(|_| read_npy_converted::<u8>(path, f32::from))
        .map_err(|message| TrainError::dataset_load(path, message))
}

fn read_npy_converted<T>(
    path: &Path,
    convert: impl Fn(T) -> f32,
) -> std::result::Result<ArrayD<f32>, String>
where
    T: ReadableElement + Clone,
{
    let file = File::open(path).map_err(|e| e.to_string())?;
    let array = ArrayD::<T>::read_npy(BufReader::new(file)).map_err(|e| e.to_string())?;
    Ok(array.mapv(convert))
}

fn read_npz_f32(path: &Path, name: &str) -> Result<ArrayD<f32>> {
    read_npz_converted::<f32>(path, name, |x| x)
        .or_else(|_| read_npz_converted::<f64>(path, name, |x| x as f32))
        .or_else(|_| read_npz_converted::<i64>(path, name, |x| x as f32))
        .or_else(|_| read_npz_converted::<i32>(path, name, |x| x as f32))
        .or_else(|_| read_npz_converted::<u8>(path, name, f32::from))
        .map_err(|message| TrainError::dataset_load(path, format!("array {name}: {message}")))
}

fn read_npz_converted<T>(
    path: &Path,
    name: &str,
    convert: impl Fn(T) -> f32,
) -> std::result::Result<ArrayD<f32>, String>
where
    T: ReadableElement + Clone,
{
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut npz = NpzReader::new(BufReader::new(file)).map_err(|e| e.to_string())?;
    // archives written by numpy store `name.npy`
    let array = npz
        .by_name::<OwnedRepr<T>, IxDyn>(name)
        .or_else(|_| npz.by_name::<OwnedRepr<T>, IxDyn>(&format!("{name}.npy")))
        .map_err(|e| e.to_string())?;
    Ok(array.mapv(convert))
}
