use std::path::PathBuf;

use gopilot_core::ModelError;
use thiserror::Error;
use tokenizer::TokenizerError;

#[derive(Error, Debug)]
pub enum FinetuneError {
    /// Bad command line; carries clap's formatted usage message.
    #[error(transparent)]
    Usage(#[from] clap::Error),

    #[error("missing required argument {0}")]
    MissingArgument(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("S3 is not available, set the relevant environment variables (missing: {})", .missing.join(", "))]
    StorageUnavailable { missing: Vec<&'static str> },

    #[error("model compilation only runs on CUDA devices, resolved device is {0}")]
    CompileRequiresCuda(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("failed to load tokenizer: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("tokenizer vocabulary ({tokenizer}) does not fit the model vocabulary ({model})")]
    VocabMismatch { tokenizer: usize, model: i64 },

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),
}

impl FinetuneError {
    /// Environment preconditions that must abort the run before any model
    /// or dataset work.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            FinetuneError::StorageUnavailable { .. } | FinetuneError::CompileRequiresCuda(_)
        ) || matches!(self, FinetuneError::Model(ModelError::CompileRequiresCuda(_)))
    }

    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            FinetuneError::Usage(_) | FinetuneError::MissingArgument(_) | FinetuneError::InvalidParameter { .. }
        )
    }

    /// Process exit status: 2 for usage errors, as clap uses, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_usage() {
            2
        } else {
            1
        }
    }
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to open dataset {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("record index {index} out of range for dataset of {len} records")]
    OutOfRange { index: usize, len: usize },

    #[error("malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("failed to tokenize record on line {line}: {source}")]
    Tokenize {
        line: usize,
        source: TokenizerError,
    },
}

pub type Result<T> = std::result::Result<T, FinetuneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(FinetuneError::MissingArgument("--dataset-filepath").exit_code(), 2);
        let invalid = FinetuneError::InvalidParameter {
            name: "--lr",
            reason: "0 is not positive".to_string(),
        };
        assert!(invalid.is_usage());
        assert_eq!(invalid.exit_code(), 2);

        let unavailable = FinetuneError::StorageUnavailable {
            missing: vec!["AWS_ACCESS_KEY_ID"],
        };
        assert!(unavailable.is_precondition() && !unavailable.is_usage());
        assert_eq!(unavailable.exit_code(), 1);
        assert_eq!(FinetuneError::CompileRequiresCuda("Cpu".to_string()).exit_code(), 1);
    }
}
