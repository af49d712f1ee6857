pub mod bpe;
pub mod error;
pub mod gopilot;
pub mod gotok;
pub mod huggingface;
pub mod trainer;
pub mod vocab;

use std::fmt;
use std::path::Path;

pub use bpe::Bpe;
pub use error::TokenizerError;
pub use gopilot::GopilotTokenizer;
pub use huggingface::HuggingFaceTokenizer;
pub use trainer::Trainer;
pub use vocab::Vocab;

use error::Result;

/// The tokenizer implementations a run can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    Gopilot,
    HuggingFace,
}

impl TokenizerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenizerKind::Gopilot => "gopilot",
            TokenizerKind::HuggingFace => "hugging-face",
        }
    }

    /// Loads a tokenizer of this kind from its configuration file. Only the
    /// loader of the selected kind touches `path`.
    pub fn load<P: AsRef<Path>>(self, path: P) -> Result<Tokenizer> {
        match self {
            TokenizerKind::Gopilot => GopilotTokenizer::from_file(path).map(Tokenizer::Gopilot),
            TokenizerKind::HuggingFace => HuggingFaceTokenizer::from_file(path).map(Tokenizer::HuggingFace),
        }
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded tokenizer. Immutable once loaded; share it behind an `Arc`.
#[derive(Debug)]
pub enum Tokenizer {
    Gopilot(GopilotTokenizer),
    HuggingFace(HuggingFaceTokenizer),
}

impl Tokenizer {
    pub fn kind(&self) -> TokenizerKind {
        match self {
            Tokenizer::Gopilot(_) => TokenizerKind::Gopilot,
            Tokenizer::HuggingFace(_) => TokenizerKind::HuggingFace,
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        match self {
            Tokenizer::Gopilot(t) => Ok(t.encode(text)),
            Tokenizer::HuggingFace(t) => t.encode(text),
        }
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        match self {
            Tokenizer::Gopilot(t) => Ok(t.decode(ids)),
            Tokenizer::HuggingFace(t) => t.decode(ids),
        }
    }

    pub fn vocab_size(&self) -> usize {
        match self {
            Tokenizer::Gopilot(t) => t.vocab_size(),
            Tokenizer::HuggingFace(t) => t.vocab_size(),
        }
    }

    pub fn eos_id(&self) -> Option<u32> {
        match self {
            Tokenizer::Gopilot(t) => t.eos_id(),
            Tokenizer::HuggingFace(t) => t.eos_id(),
        }
    }

    /// Padding id, falling back to end-of-sequence when the vocabulary has
    /// no dedicated padding token.
    pub fn pad_id(&self) -> Option<u32> {
        match self {
            Tokenizer::Gopilot(t) => t.pad_id(),
            Tokenizer::HuggingFace(t) => t.pad_id(),
        }
        .or_else(|| self.eos_id())
    }
}
