use regex::Regex;
use std::collections::HashMap;

/// Pre-tokenization pattern: words, numbers, punctuation runs and whitespace.
pub const WORD_PATTERN: &str = r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+";

pub fn word_regex() -> Regex {
    // The pattern is a constant known to compile.
    Regex::new(WORD_PATTERN).expect("word pattern is valid")
}

/// Byte-pair merge table.
///
/// Turns text into subword pieces by applying the learned merges in rank
/// order. Mapping pieces to ids is the job of the owning tokenizer.
#[derive(Clone)]
pub struct Bpe {
    ranks: HashMap<(String, String), usize>,
    merges: Vec<(String, String)>,
    regex: Regex,
}

impl std::fmt::Debug for Bpe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bpe")
            .field("merges_count", &self.merges.len())
            .finish()
    }
}

impl Bpe {
    /// `merges` are ordered by priority, highest first.
    pub fn new(merges: Vec<(String, String)>) -> Self {
        let ranks = merges
            .iter()
            .enumerate()
            .map(|(rank, pair)| (pair.clone(), rank))
            .collect();
        Self {
            ranks,
            merges,
            regex: word_regex(),
        }
    }

    pub fn merges(&self) -> &[(String, String)] {
        &self.merges
    }

    /// Applies the merges to a single pre-tokenized word.
    pub fn merge_word(&self, word: &str) -> Vec<String> {
        let mut parts: Vec<String> = word.chars().map(|c| c.to_string()).collect();

        while parts.len() > 1 {
            let best = parts
                .windows(2)
                .filter_map(|w| {
                    self.ranks
                        .get(&(w[0].clone(), w[1].clone()))
                        .map(|&rank| (rank, w[0].clone(), w[1].clone()))
                })
                .min();
            let Some((_, first, second)) = best else {
                break;
            };
            parts = merge_pair(&parts, &first, &second);
        }

        parts
    }

    /// Splits free text into pieces.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.regex
            .find_iter(text)
            .flat_map(|m| self.merge_word(m.as_str()))
            .collect()
    }
}

/// Replaces every adjacent `(first, second)` in `parts` with their concatenation.
pub(crate) fn merge_pair(parts: &[String], first: &str, second: &str) -> Vec<String> {
    let mut merged = Vec::with_capacity(parts.len());
    let mut i = 0;
    while i < parts.len() {
        if i + 1 < parts.len() && parts[i] == first && parts[i + 1] == second {
            merged.push(format!("{first}{second}"));
            i += 2;
        } else {
            merged.push(parts[i].clone());
            i += 1;
        }
    }
    merged
}
