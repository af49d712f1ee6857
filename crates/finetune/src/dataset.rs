use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use memmap2::Mmap;
use serde::Deserialize;
use tokenizer::Tokenizer;

use crate::error::DatasetError;

/// Target id ignored by the loss.
pub const IGNORE_INDEX: i64 = -100;

#[derive(Debug, Deserialize)]
struct Record {
    prompt: String,
    completion: String,
}

/// One tokenized training pair, already shifted: `targets[i]` is the token
/// that follows `input_ids[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub input_ids: Vec<i64>,
    pub targets: Vec<i64>,
}

impl Example {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Prompt/completion pairs read from a JSONL file.
///
/// Construction only records where each non-blank line starts and ends.
/// Records are parsed and tokenized on access, so a malformed line fails
/// only when it is read.
pub struct FineTuningDataset {
    path: PathBuf,
    // `None` for an empty file, which cannot be mapped.
    mmap: Option<Mmap>,
    lines: Vec<(usize, Range<usize>)>,
    tokenizer: Arc<Tokenizer>,
    max_length: Option<usize>,
}

impl FineTuningDataset {
    pub fn new<P: AsRef<Path>>(path: P, tokenizer: Arc<Tokenizer>) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| DatasetError::Open {
            path: path.clone(),
            source,
        };
        let file = File::open(&path).map_err(open_err)?;
        let len = file.metadata().map_err(open_err)?.len();
        let mmap = if len == 0 {
            None
        } else {
            // The file is treated as read-only for the lifetime of the run.
            Some(unsafe { Mmap::map(&file) }.map_err(open_err)?)
        };

        let lines = mmap.as_deref().map(index_lines).unwrap_or_default();
        info!("Indexed {} records in {:?}", lines.len(), path);

        Ok(Self {
            path,
            mmap,
            lines,
            tokenizer,
            max_length: None,
        })
    }

    /// Truncates every example to at most `max_length` input positions.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn tokenizer(&self) -> &Arc<Tokenizer> {
        &self.tokenizer
    }

    pub fn get(&self, index: usize) -> Result<Example, DatasetError> {
        let (line, range) = self.lines.get(index).cloned().ok_or(DatasetError::OutOfRange {
            index,
            len: self.lines.len(),
        })?;
        let bytes = self.mmap.as_deref().map(|m| &m[range]).unwrap_or_default();

        let record: Record = serde_json::from_slice(bytes).map_err(|e| DatasetError::MalformedRecord {
            line,
            reason: e.to_string(),
        })?;

        let encode = |text: &str| {
            self.tokenizer
                .encode(text)
                .map_err(|source| DatasetError::Tokenize { line, source })
        };
        let prompt = encode(&record.prompt)?;
        let completion = encode(&record.completion)?;

        let mut tokens: Vec<i64> = prompt.iter().chain(&completion).map(|&id| id as i64).collect();
        if let Some(eos) = self.tokenizer.eos_id() {
            tokens.push(eos as i64);
        }
        if let Some(max_length) = self.max_length {
            tokens.truncate(max_length + 1);
        }
        if tokens.len() < 2 {
            return Err(DatasetError::MalformedRecord {
                line,
                reason: "record tokenizes to fewer than two tokens".to_string(),
            });
        }

        let input_ids = tokens[..tokens.len() - 1].to_vec();
        let mut targets = tokens[1..].to_vec();
        // Targets at positions predicting the prompt are not trained on.
        let masked = prompt.len().saturating_sub(1).min(targets.len());
        targets[..masked].fill(IGNORE_INDEX);
        if targets.iter().all(|&t| t == IGNORE_INDEX) {
            return Err(DatasetError::MalformedRecord {
                line,
                reason: "no completion tokens left after truncation".to_string(),
            });
        }

        Ok(Example { input_ids, targets })
    }
}

impl std::fmt::Debug for FineTuningDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FineTuningDataset")
            .field("path", &self.path)
            .field("records", &self.lines.len())
            .field("tokenizer", &self.tokenizer.kind())
            .field("max_length", &self.max_length)
            .finish()
    }
}

/// 1-based line numbers and byte ranges of the non-blank lines.
fn index_lines(bytes: &[u8]) -> Vec<(usize, Range<usize>)> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (number, chunk) in bytes.split(|&b| b == b'\n').enumerate() {
        let end = start + chunk.len();
        if !chunk.iter().all(u8::is_ascii_whitespace) {
            lines.push((number + 1, start..end));
        }
        start = end + 1;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use tokenizer::HuggingFaceTokenizer;

    const WORD_LEVEL: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[UNK]": 0, "</s>": 1, "<pad>": 2, "func": 3, "main": 4, "return": 5, "nil": 6},
            "unk_token": "[UNK]"
        }
    }"#;

    fn tokenizer(dir: &tempfile::TempDir) -> Arc<Tokenizer> {
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, WORD_LEVEL).unwrap();
        Arc::new(Tokenizer::HuggingFace(HuggingFaceTokenizer::from_file(&path).unwrap()))
    }

    fn dataset(contents: &str) -> (tempfile::TempDir, FineTuningDataset) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        std::fs::write(&path, contents).unwrap();
        let tok = tokenizer(&dir);
        let ds = FineTuningDataset::new(&path, tok).unwrap();
        (dir, ds)
    }

    #[test]
    fn test_index_skips_blank_lines() {
        let (_dir, ds) = dataset(indoc! {r#"
            {"prompt": "func main", "completion": "return nil"}

            {"prompt": "func", "completion": "main"}
        "#});
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn test_example_masks_prompt() {
        let (_dir, ds) = dataset("{\"prompt\": \"func main\", \"completion\": \"return nil\"}\n");
        let example = ds.get(0).unwrap();
        // func main return nil </s>
        assert_eq!(example.input_ids, vec![3, 4, 5, 6]);
        assert_eq!(example.targets, vec![IGNORE_INDEX, 5, 6, 1]);
    }

    #[test]
    fn test_truncation() {
        let (_dir, ds) = dataset("{\"prompt\": \"func\", \"completion\": \"main return nil\"}\n");
        let ds = ds.with_max_length(2);
        let example = ds.get(0).unwrap();
        assert_eq!(example.input_ids, vec![3, 4]);
        assert_eq!(example.targets, vec![4, 5]);
    }

    #[test]
    fn test_malformed_record_fails_alone() {
        let (_dir, ds) = dataset(indoc! {r#"
            {"prompt": "func", "completion": "main"}
            {"prompt": "func"
            {"prompt": "return", "completion": "nil"}
        "#});
        assert_eq!(ds.len(), 3);
        assert!(ds.get(0).is_ok());
        match ds.get(1) {
            Err(DatasetError::MalformedRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
        assert!(ds.get(2).is_ok());
    }

    #[test]
    fn test_out_of_range() {
        let (_dir, ds) = dataset("");
        assert!(ds.is_empty());
        assert!(matches!(ds.get(0), Err(DatasetError::OutOfRange { index: 0, len: 0 })));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FineTuningDataset::new(dir.path().join("nope.jsonl"), tokenizer(&dir)).unwrap_err();
        assert!(matches!(err, DatasetError::Open { .. }));
    }
}
