use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing data, sampling batches, or persisting weights.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to persist {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An invariant between the early-stopping controller and the snapshot store was broken.
    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("failed to load dataset from {}: {message}", .path.display())]
    DatasetLoad { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("model error: {0}")]
    Model(#[source] anyhow::Error),
}

impl TrainError {
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    pub fn persistence<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn dataset_load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::DatasetLoad {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainError>;
