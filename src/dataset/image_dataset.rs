use std::{collections::HashMap, fs::File, io::BufReader, path::{Path, PathBuf}};

use derive_builder::Builder;
use image::{imageops::FilterType, ImageFormat};
use ndarray::{Array1, ArrayD, IxDyn};
use walkdir::WalkDir;

use crate::error::{Result, TrainError};

use super::Dataset;

#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(pattern = "owned")]
pub struct ImageFolderConfig {
    pub width: u32,
    pub height: u32,
    /// JSON object mapping frame file names to labels.
    pub labels_path: PathBuf,
}

/// Loads single-frame samples from a directory of images.
pub trait LoadFromImageFolder: Sized {
    fn from_image_folder<P: AsRef<Path>>(path: P, config: &ImageFolderConfig) -> Result<Self>;
}

impl LoadFromImageFolder for Dataset {
    /// Frames are read in file name order, converted to grayscale and resized, giving `1×height×width` samples with raw `0..=255` intensities. Frames without a label are skipped.
    fn from_image_folder<P: AsRef<Path>>(path: P, config: &ImageFolderConfig) -> Result<Self> {
        let labels_file = File::open(&config.labels_path)
            .map_err(|e| TrainError::dataset_load(&config.labels_path, e))?;
        let labels: HashMap<String, f32> = serde_json::from_reader(BufReader::new(labels_file))?;

        let mut pixels = Vec::new();
        let mut targets = Vec::new();
        for entry in WalkDir::new(path.as_ref())
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| ImageFormat::from_path(e.path()).is_ok())
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let label = match labels.get(&file_name) {
                Some(&label) => label,
                None => {
                    tracing::warn!(frame = %entry.path().display(), "skipping unlabeled frame");
                    continue;
                }
            };
            let frame = image::open(entry.path())
                .map_err(|e| TrainError::dataset_load(entry.path(), e))?
                .resize_exact(config.width, config.height, FilterType::Triangle)
                .into_luma8();
            pixels.extend(frame.into_raw().into_iter().map(f32::from));
            targets.push(label);
        }

        let shape = [
            targets.len(),
            1,
            config.height as usize,
            config.width as usize,
        ];
        let samples = ArrayD::from_shape_vec(IxDyn(&shape), pixels)
            .map_err(|e| TrainError::dimension_mismatch(e.to_string()))?;
        tracing::info!(
            path = %path.as_ref().display(),
            frames = targets.len(),
            "loaded image folder"
        );
        Dataset::new(samples, Array1::from(targets))
    }
}
