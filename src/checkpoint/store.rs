use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use linked_hash_map::LinkedHashMap;
use ndarray::{ArrayD, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};

use crate::error::{Result, TrainError};

/// Named per-layer parameter arrays of a model.
///
/// It uses [LinkedHashMap] to preserve the insertion order of the arrays, so that a snapshot is written and read back layer by layer in the order the model reports them.
pub type ParamDict = LinkedHashMap<String, ArrayD<f32>>;

/// Names positional parameter arrays `arr_0`, `arr_1`, ... as numpy's `savez` does.
pub fn param_dict_from_arrays<I>(arrays: I) -> ParamDict
where
    I: IntoIterator<Item = ArrayD<f32>>,
{
    arrays
        .into_iter()
        .enumerate()
        .map(|(i, array)| (format!("arr_{i}"), array))
        .collect()
}

/// Persists weight snapshots keyed by epoch.
pub trait SnapshotStore {
    /// Writes the parameters of `epoch` and returns where they went.
    fn save(&mut self, epoch: usize, parameters: &ParamDict) -> Result<PathBuf>;

    fn load(&self, path: &Path) -> Result<ParamDict>;

    /// Where the snapshot of `epoch` lives once saved.
    fn snapshot_path(&self, epoch: usize) -> PathBuf;

    /// Whether a snapshot of `epoch` is available.
    fn contains(&self, epoch: usize) -> bool {
        self.snapshot_path(epoch).is_file()
    }

    /// Moves the snapshot of `epoch` to `destination`, the final selected model.
    fn promote(&mut self, epoch: usize, destination: &Path) -> Result<PathBuf>;
}

/// Stores snapshots as compressed `.npz` archives named `<prefix><epoch>.npz` inside one directory.
#[derive(Debug, Clone)]
pub struct NpzSnapshotStore {
    dir: PathBuf,
    prefix: String,
}

impl NpzSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotStore for NpzSnapshotStore {
    fn save(&mut self, epoch: usize, parameters: &ParamDict) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| TrainError::persistence(&self.dir, e))?;
        let path = self.snapshot_path(epoch);
        let file = File::create(&path).map_err(|e| TrainError::persistence(&path, e))?;

        let mut npz = NpzWriter::new_compressed(BufWriter::new(file));
        for (name, array) in parameters {
            npz.add_array(name.as_str(), array)
                .map_err(|e| TrainError::persistence(&path, e.to_string()))?;
        }
        let mut writer = npz
            .finish()
            .map_err(|e| TrainError::persistence(&path, e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TrainError::persistence(&path, e))?;

        tracing::debug!(epoch, path = %path.display(), arrays = parameters.len(), "saved snapshot");
        Ok(path)
    }

    fn load(&self, path: &Path) -> Result<ParamDict> {
        let file = File::open(path).map_err(|e| TrainError::persistence(path, e))?;
        let mut npz = NpzReader::new(BufReader::new(file))
            .map_err(|e| TrainError::persistence(path, e.to_string()))?;
        let names = npz
            .names()
            .map_err(|e| TrainError::persistence(path, e.to_string()))?;

        let mut parameters = ParamDict::new();
        for name in names {
            let key = name.strip_suffix(".npy").unwrap_or(&name).to_owned();
            let array = npz
                .by_name::<OwnedRepr<f32>, IxDyn>(&name)
                .or_else(|_| npz.by_name::<OwnedRepr<f32>, IxDyn>(&format!("{key}.npy")))
                .map_err(|e| TrainError::persistence(path, format!("array {key}: {e}")))?;
            parameters.insert(key, array);
        }
        Ok(parameters)
    }

    fn snapshot_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("{}{}.npz", self.prefix, epoch))
    }

    fn promote(&mut self, epoch: usize, destination: &Path) -> Result<PathBuf> {
        let source = self.snapshot_path(epoch);
        if !source.is_file() {
            return Err(TrainError::consistency(format!(
                "no snapshot of epoch {epoch} at {}",
                source.display()
            )));
        }
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TrainError::persistence(parent, e))?;
        }
        if fs::rename(&source, destination).is_err() {
            // rename fails across file systems
            fs::copy(&source, destination).map_err(|e| TrainError::persistence(destination, e))?;
            fs::remove_file(&source).map_err(|e| TrainError::persistence(&source, e))?;
        }
        tracing::info!(
            epoch,
            from = %source.display(),
            to = %destination.display(),
            "promoted snapshot"
        );
        Ok(destination.to_path_buf())
    }
}
