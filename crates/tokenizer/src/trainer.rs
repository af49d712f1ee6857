use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

use crate::bpe::{merge_pair, word_regex};
use crate::error::{Result, TokenizerError};
use crate::gopilot::{byte_entry, reserved_entry, GopilotTokenizer, EOS_TOKEN, PAD_TOKEN, UNK_TOKEN};
use crate::gotok::{self, TokenKind};
use crate::vocab::Vocab;

/// Learns a [`GopilotTokenizer`] from Go sources.
///
/// Only the text of identifiers, literals and comments feeds the BPE
/// statistics; every fixed-text Go token already has a reserved entry.
pub struct Trainer {
    vocab_size: usize,
    min_frequency: u32,
    special_tokens: Vec<String>,
}

impl Trainer {
    pub fn new(vocab_size: usize, min_frequency: u32, special_tokens: Vec<String>) -> Self {
        Self {
            vocab_size,
            min_frequency,
            special_tokens,
        }
    }

    pub fn default_special_tokens() -> Vec<String> {
        vec![PAD_TOKEN.to_string(), EOS_TOKEN.to_string(), UNK_TOKEN.to_string()]
    }

    pub fn train_files(&self, files: &[PathBuf]) -> Result<GopilotTokenizer> {
        let sources = files
            .par_iter()
            .map(|path| {
                fs::read_to_string(path).map_err(|source| TokenizerError::Io {
                    path: path.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<String>>>()?;
        self.train_sources(&sources)
    }

    pub fn train_sources(&self, sources: &[String]) -> Result<GopilotTokenizer> {
        let word_counts = count_words(sources);

        let mut vocab = Vocab::new();
        for token in &self.special_tokens {
            vocab.push(token);
        }
        for kind in TokenKind::ALL.iter().copied().filter(|k| k.fixed_text().is_some()) {
            vocab.push(&reserved_entry(kind));
        }
        for byte in 0..=u8::MAX {
            vocab.push(&byte_entry(byte));
        }

        // Sorted so that training is reproducible.
        let mut words: Vec<(Vec<String>, u32)> = word_counts
            .into_iter()
            .map(|(word, count)| (word.chars().map(|c| c.to_string()).collect(), count))
            .collect();
        words.sort();

        let base_chars: BTreeSet<&String> = words.iter().flat_map(|(parts, _)| parts.iter()).collect();
        for c in base_chars {
            vocab.push(c);
        }

        let mut merges = Vec::new();
        while vocab.len() < self.vocab_size {
            let mut pair_counts: HashMap<(&str, &str), u32> = HashMap::new();
            for (parts, count) in &words {
                for w in parts.windows(2) {
                    *pair_counts.entry((w[0].as_str(), w[1].as_str())).or_insert(0) += count;
                }
            }

            // Highest count wins; ties go to the lexicographically smallest pair.
            let best = pair_counts
                .into_iter()
                .filter(|(_, count)| *count >= self.min_frequency)
                .max_by(|(pa, ca), (pb, cb)| ca.cmp(cb).then_with(|| pb.cmp(pa)))
                .map(|((a, b), _)| (a.to_string(), b.to_string()));

            let Some((first, second)) = best else {
                break;
            };

            vocab.push(&format!("{first}{second}"));
            for (parts, _) in words.iter_mut() {
                *parts = merge_pair(parts, &first, &second);
            }
            merges.push((first, second));
        }

        GopilotTokenizer::new(vocab, merges, self.special_tokens.clone())
    }
}

fn count_words(sources: &[String]) -> HashMap<String, u32> {
    sources
        .par_iter()
        .map(|src| {
            let regex = word_regex();
            let mut counts: HashMap<String, u32> = HashMap::new();
            for token in gotok::scan(src) {
                if token.kind.fixed_text().is_some() || token.is_implicit_semicolon() {
                    continue;
                }
                for m in regex.find_iter(&token.literal) {
                    *counts.entry(m.as_str().to_string()).or_insert(0) += 1;
                }
            }
            counts
        })
        .reduce(HashMap::new, |mut acc, counts| {
            for (word, count) in counts {
                *acc.entry(word).or_insert(0) += count;
            }
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab_respects_budget() {
        let src = "func f() { fmt.Println(\"hello hello hello\") }\n".to_string();
        let tok = Trainer::new(400, 1, Trainer::default_special_tokens())
            .train_sources(&[src])
            .unwrap();
        assert!(tok.vocab_size() <= 400);
        assert!(tok.token_to_id("hello").is_some() || tok.token_to_id(" hello").is_some());
    }

    #[test]
    fn test_training_is_deterministic() {
        let src = vec!["var abcabc = abab + cdcd\n".to_string()];
        let trainer = Trainer::new(420, 1, Trainer::default_special_tokens());
        let a = trainer.train_sources(&src).unwrap();
        let b = trainer.train_sources(&src).unwrap();
        assert_eq!(a.vocab(), b.vocab());
    }

    #[test]
    fn test_unreadable_corpus_file_names_the_path() {
        let files = vec![PathBuf::from("/nonexistent/corpus.go")];
        let err = Trainer::new(400, 1, Trainer::default_special_tokens())
            .train_files(&files)
            .unwrap_err();
        assert!(matches!(err, TokenizerError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/corpus.go"), "{err}");
    }

    #[test]
    fn test_min_frequency_stops_merging() {
        let src = vec!["x := yz\n".to_string()];
        let tok = Trainer::new(10_000, 5, Trainer::default_special_tokens())
            .train_sources(&src)
            .unwrap();
        assert!(tok.token_to_id("yz").is_none());
    }
}
