use std::path::Path;

use crate::error::{Result, TokenizerError};

const EOS_CANDIDATES: &[&str] = &["<|endoftext|>", "</s>", "<EOS>", "[EOS]", "<eos>"];
const PAD_CANDIDATES: &[&str] = &["<pad>", "<PAD>", "[PAD]", "<|pad|>"];

/// Tokenizer backed by a Hugging Face `tokenizer.json`.
pub struct HuggingFaceTokenizer {
    inner: tokenizers::Tokenizer,
}

impl std::fmt::Debug for HuggingFaceTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceTokenizer")
            .field("vocab_size", &self.vocab_size())
            .finish()
    }
}

impl HuggingFaceTokenizer {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| TokenizerError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self { inner })
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TokenizerError::HuggingFace(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| TokenizerError::HuggingFace(e.to_string()))
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    pub fn eos_id(&self) -> Option<u32> {
        EOS_CANDIDATES.iter().find_map(|t| self.token_to_id(t))
    }

    pub fn pad_id(&self) -> Option<u32> {
        PAD_CANDIDATES.iter().find_map(|t| self.token_to_id(t))
    }
}
