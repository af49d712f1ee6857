use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::bpe::Bpe;
use crate::error::{Result, TokenizerError};
use crate::gotok::{self, TokenKind};
use crate::vocab::Vocab;

pub const PAD_TOKEN: &str = "<PAD>";
pub const EOS_TOKEN: &str = "<EOS>";
pub const UNK_TOKEN: &str = "<UNK>";

/// Vocabulary entry reserved for a fixed-text Go token kind.
pub fn reserved_entry(kind: TokenKind) -> String {
    format!("<go:{}>", kind.name())
}

pub fn byte_entry(byte: u8) -> String {
    format!("<0x{byte:02X}>")
}

/// On-disk form of a Gopilot tokenizer.
#[derive(Debug, Serialize, Deserialize)]
struct TokenizerFile {
    special_tokens: Vec<String>,
    vocab: Vocab,
    merges: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Special,
    Reserved(TokenKind),
    Byte(u8),
}

/// Go-aware tokenizer.
///
/// Source text is first split with the Go scanner. Keywords, operators and
/// whitespace each map to one reserved id; identifiers, literals and comments
/// are broken into BPE pieces, with a byte fallback for pieces missing from
/// the vocabulary.
#[derive(Debug, Clone)]
pub struct GopilotTokenizer {
    vocab: Vocab,
    bpe: Bpe,
    special_tokens: Vec<String>,
    reserved: HashMap<TokenKind, u32>,
    entries: HashMap<u32, Entry>,
}

impl GopilotTokenizer {
    pub fn new(vocab: Vocab, merges: Vec<(String, String)>, special_tokens: Vec<String>) -> Result<Self> {
        let mut reserved = HashMap::new();
        let mut entries = HashMap::with_capacity(vocab.len());

        for kind in TokenKind::ALL.iter().copied().filter(|k| k.fixed_text().is_some()) {
            let entry = reserved_entry(kind);
            let id = vocab
                .get_id(&entry)
                .ok_or_else(|| TokenizerError::VocabMismatch(format!("missing reserved entry {entry}")))?;
            reserved.insert(kind, id);
            entries.insert(id, Entry::Reserved(kind));
        }
        for token in &special_tokens {
            let id = vocab
                .get_id(token)
                .ok_or_else(|| TokenizerError::TokenNotFound(token.clone()))?;
            entries.insert(id, Entry::Special);
        }
        for byte in 0..=u8::MAX {
            if let Some(id) = vocab.get_id(&byte_entry(byte)) {
                entries.insert(id, Entry::Byte(byte));
            }
        }

        Ok(Self {
            vocab,
            bpe: Bpe::new(merges),
            special_tokens,
            reserved,
            entries,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path).map_err(|source| TokenizerError::Io {
            path: path.to_path_buf(),
            source,
        })?);
        let file: TokenizerFile = serde_json::from_reader(reader).map_err(|e| TokenizerError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::new(file.vocab, file.merges, file.special_tokens).map_err(|e| TokenizerError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path).map_err(|source| TokenizerError::Io {
            path: path.to_path_buf(),
            source,
        })?);
        let file = TokenizerFile {
            special_tokens: self.special_tokens.clone(),
            vocab: self.vocab.clone(),
            merges: self.bpe.merges().to_vec(),
        };
        serde_json::to_writer_pretty(writer, &file)?;
        Ok(())
    }

    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut ids = Vec::new();
        for token in gotok::scan(text) {
            // An inserted semicolon stands for the line break it replaced.
            let kind = if token.is_implicit_semicolon() {
                TokenKind::Newline
            } else {
                token.kind
            };
            match self.reserved.get(&kind) {
                Some(&id) => ids.push(id),
                None => self.encode_text(&token.literal, &mut ids),
            }
        }
        ids
    }

    fn encode_text(&self, text: &str, ids: &mut Vec<u32>) {
        for piece in self.bpe.split(text) {
            if let Some(id) = self.vocab.get_id(&piece) {
                ids.push(id);
                continue;
            }
            for byte in piece.bytes() {
                if let Some(id) = self.vocab.get_id(&byte_entry(byte)) {
                    ids.push(id);
                } else if let Some(id) = self.unk_id() {
                    ids.push(id);
                }
            }
        }
    }

    pub fn decode(&self, ids: &[u32]) -> String {
        let mut bytes = Vec::new();
        for id in ids {
            match self.entries.get(id) {
                Some(Entry::Special) => {}
                Some(Entry::Reserved(kind)) => {
                    if let Some(text) = kind.fixed_text() {
                        bytes.extend_from_slice(text.as_bytes());
                    }
                }
                Some(Entry::Byte(byte)) => bytes.push(*byte),
                None => {
                    if let Some(token) = self.vocab.get_token(*id) {
                        bytes.extend_from_slice(token.as_bytes());
                    }
                }
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.vocab.get_id(token)
    }

    pub fn eos_id(&self) -> Option<u32> {
        self.special_id(EOS_TOKEN)
    }

    pub fn pad_id(&self) -> Option<u32> {
        self.special_id(PAD_TOKEN)
    }

    pub fn unk_id(&self) -> Option<u32> {
        self.special_id(UNK_TOKEN)
    }

    fn special_id(&self, token: &str) -> Option<u32> {
        if self.special_tokens.iter().any(|t| t == token) {
            self.vocab.get_id(token)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::Trainer;

    const SOURCE: &str = "package main\n\nfunc add(a, b int) int {\n\treturn a + b\n}\n";

    fn trained() -> GopilotTokenizer {
        Trainer::new(400, 1, Trainer::default_special_tokens())
            .train_sources(&[SOURCE.to_string()])
            .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let tok = trained();
        let ids = tok.encode(SOURCE);
        assert_eq!(tok.decode(&ids), SOURCE);
    }

    #[test]
    fn test_keywords_use_reserved_ids() {
        let tok = trained();
        let ids = tok.encode("func");
        assert_eq!(ids, vec![tok.token_to_id("<go:func>").unwrap()]);
    }

    #[test]
    fn test_unseen_text_falls_back_to_bytes() {
        let tok = trained();
        let text = "x := \"héllo☃\"";
        let ids = tok.encode(text);
        assert_eq!(tok.decode(&ids), text);
        assert!(ids.iter().any(|id| matches!(tok.entries.get(id), Some(Entry::Byte(_)))));
    }

    #[test]
    fn test_special_tokens_skipped_on_decode() {
        let tok = trained();
        let mut ids = tok.encode("return");
        ids.push(tok.eos_id().unwrap());
        assert_eq!(tok.decode(&ids), "return");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gopilot.json");
        let tok = trained();
        tok.save(&path).unwrap();

        let loaded = GopilotTokenizer::from_file(&path).unwrap();
        assert_eq!(loaded.vocab_size(), tok.vocab_size());
        assert_eq!(loaded.encode(SOURCE), tok.encode(SOURCE));
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = GopilotTokenizer::from_file("/nonexistent/gopilot-tok.json").unwrap_err();
        assert!(matches!(err, TokenizerError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/gopilot-tok.json"), "{err}");
    }

    #[test]
    fn test_missing_reserved_entry_rejected() {
        let mut vocab = Vocab::new();
        vocab.push(EOS_TOKEN);
        let err = GopilotTokenizer::new(vocab, Vec::new(), vec![EOS_TOKEN.to_string()]).unwrap_err();
        assert!(matches!(err, TokenizerError::VocabMismatch(_)));
    }
}
