use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("failed to load tokenizer config {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("Vocabulary mismatch: {0}")]
    VocabMismatch(String),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Hugging Face tokenizer error: {0}")]
    HuggingFace(String),
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
