use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, TokenizerError};

/// Bidirectional token <-> id table.
///
/// Serialized as the plain `token -> id` map; the reverse table is rebuilt on
/// load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HashMap<String, u32>", into = "HashMap<String, u32>")]
pub struct Vocab {
    token_to_id: HashMap<String, u32>,
    id_to_token: HashMap<u32, String>,
}

impl Vocab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `token` with the next free id, returning its id. Existing
    /// tokens keep their id.
    pub fn push(&mut self, token: &str) -> u32 {
        if let Some(id) = self.get_id(token) {
            return id;
        }
        let id = self.next_id();
        self.token_to_id.insert(token.to_string(), id);
        self.id_to_token.insert(id, token.to_string());
        id
    }

    pub fn get_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn get_token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    fn next_id(&self) -> u32 {
        self.id_to_token.keys().max().map_or(0, |max| max + 1)
    }
}

impl TryFrom<HashMap<String, u32>> for Vocab {
    type Error = TokenizerError;

    fn try_from(token_to_id: HashMap<String, u32>) -> Result<Self> {
        let mut id_to_token = HashMap::with_capacity(token_to_id.len());
        for (token, id) in &token_to_id {
            if let Some(previous) = id_to_token.insert(*id, token.clone()) {
                return Err(TokenizerError::VocabMismatch(format!(
                    "id {id} is assigned to both {previous:?} and {token:?}"
                )));
            }
        }
        Ok(Self {
            token_to_id,
            id_to_token,
        })
    }
}

impl From<Vocab> for HashMap<String, u32> {
    fn from(vocab: Vocab) -> Self {
        vocab.token_to_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_sequential_ids() {
        let mut vocab = Vocab::new();
        assert_eq!(vocab.push("a"), 0);
        assert_eq!(vocab.push("b"), 1);
        assert_eq!(vocab.push("a"), 0);
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.get_token(1), Some("b"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"a": 0, "b": 0}"#;
        let err = serde_json::from_str::<Vocab>(json).unwrap_err();
        assert!(err.to_string().contains("assigned to both"));
    }
}
