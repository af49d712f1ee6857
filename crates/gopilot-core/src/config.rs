use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ModelError, Result};

/// Architecture of a Gopilot model.
///
/// Dropout is deliberately absent: it is a training hyperparameter and is
/// supplied separately when the model is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GopilotConfig {
    /// Size of the vocabulary (must match the tokenizer).
    pub vocab_size: i64,
    /// Maximum number of tokens in one sequence.
    pub context_length: i64,
    /// Width of token embeddings and of the residual stream.
    pub embedding_dim: i64,
    /// Number of transformer blocks.
    pub num_layers: i64,
    /// Number of attention heads per block.
    pub num_heads: i64,
    /// Hidden width of the feed-forward layers.
    pub feedforward_dim: i64,
    /// RMSNorm epsilon.
    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f64,
    /// Whether attention projections carry a bias.
    #[serde(default)]
    pub use_bias: bool,
}

fn default_layer_norm_epsilon() -> f64 {
    1e-5
}

impl Default for GopilotConfig {
    fn default() -> Self {
        Self {
            vocab_size: 2048,
            context_length: 512,
            embedding_dim: 512,
            num_layers: 8,
            num_heads: 8,
            feedforward_dim: 2048,
            layer_norm_epsilon: default_layer_norm_epsilon(),
            use_bias: false,
        }
    }
}

impl GopilotConfig {
    /// Reads a config from a `.json` file or, for any other extension, YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ModelError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        let config: GopilotConfig = if is_json {
            serde_json::from_str(&content).map_err(|e| ModelError::ConfigParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| ModelError::ConfigParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("vocab_size", self.vocab_size),
            ("context_length", self.context_length),
            ("embedding_dim", self.embedding_dim),
            ("num_layers", self.num_layers),
            ("num_heads", self.num_heads),
            ("feedforward_dim", self.feedforward_dim),
        ];
        for (name, value) in sizes {
            if value <= 0 {
                return Err(ModelError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.embedding_dim % self.num_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "embedding_dim ({}) is not divisible by num_heads ({})",
                self.embedding_dim, self.num_heads
            )));
        }
        // Rotary embeddings rotate pairs of channels.
        if self.head_size() % 2 != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "head size {} must be even",
                self.head_size()
            )));
        }
        if self.layer_norm_epsilon <= 0.0 {
            return Err(ModelError::InvalidConfig(
                "layer_norm_epsilon must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn head_size(&self) -> i64 {
        self.embedding_dim / self.num_heads
    }
}
