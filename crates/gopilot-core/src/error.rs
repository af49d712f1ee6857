use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read model config {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed model config {path:?}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    #[error("failed to read checkpoint {path:?}: {source}")]
    CheckpointIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode checkpoint {path:?}: {source}")]
    CheckpointFormat {
        path: PathBuf,
        source: safetensors::SafeTensorError,
    },

    #[error("unsupported dtype {dtype} for tensor {name} in checkpoint")]
    UnsupportedDtype { name: String, dtype: String },

    /// The checkpoint does not describe the same parameters as the model.
    #[error(
        "checkpoint {path:?} is incompatible with the model architecture: \
         missing {missing:?}, unexpected {unexpected:?}, shape mismatches {mismatched:?}"
    )]
    CheckpointIncompatible {
        path: PathBuf,
        missing: Vec<String>,
        unexpected: Vec<String>,
        mismatched: Vec<ShapeMismatch>,
    },

    #[error("model compilation requires a CUDA device, got {0}")]
    CompileRequiresCuda(String),

    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub name: String,
    pub expected: Vec<i64>,
    pub found: Vec<i64>,
}

pub type Result<T> = std::result::Result<T, ModelError>;
