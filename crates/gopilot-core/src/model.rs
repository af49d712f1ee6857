use std::path::Path;

use log::info;
use tch::{nn, Device, Tensor};

use crate::attention::CausalSelfAttention;
use crate::checkpoint;
use crate::config::GopilotConfig;
use crate::error::Result;
use crate::layer_norm::RmsNorm;

/// Feed-forward block.
#[derive(Debug)]
struct FeedForward {
    up: nn::Linear,
    down: nn::Linear,
    dropout: f64,
}

impl FeedForward {
    fn new(vs: &nn::Path, config: &GopilotConfig, dropout: f64) -> Self {
        let up = nn::linear(vs / "up", config.embedding_dim, config.feedforward_dim, Default::default());
        let down = nn::linear(vs / "down", config.feedforward_dim, config.embedding_dim, Default::default());
        Self { up, down, dropout }
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        x.apply(&self.up)
            .gelu("none")
            .apply(&self.down)
            .dropout(self.dropout, train)
    }
}

/// Pre-norm transformer block.
#[derive(Debug)]
struct Block {
    attn_norm: RmsNorm,
    attn: CausalSelfAttention,
    ff_norm: RmsNorm,
    ff: FeedForward,
}

impl Block {
    fn new(vs: &nn::Path, config: &GopilotConfig, dropout: f64) -> Self {
        let eps = config.layer_norm_epsilon;
        Self {
            attn_norm: RmsNorm::new(&(vs / "attn_norm"), config.embedding_dim, eps),
            attn: CausalSelfAttention::new(&(vs / "attn"), config, dropout),
            ff_norm: RmsNorm::new(&(vs / "ff_norm"), config.embedding_dim, eps),
            ff: FeedForward::new(&(vs / "ff"), config, dropout),
        }
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        let x = x + self.attn.forward_t(&self.attn_norm.forward(x), train);
        let ff_out = self.ff.forward_t(&self.ff_norm.forward(&x), train);
        x + ff_out
    }
}

/// Decoder-only language model.
///
/// The model owns the [`nn::VarStore`] holding its parameters: it is the only
/// owner of its weights for the lifetime of a run.
#[derive(Debug)]
pub struct GopilotModel {
    vs: nn::VarStore,
    embedding: nn::Embedding,
    blocks: Vec<Block>,
    final_norm: RmsNorm,
    lm_head: nn::Linear,
    dropout: f64,
    config: GopilotConfig,
}

impl GopilotModel {
    /// Builds a randomly initialised model on `device`.
    pub fn new(config: GopilotConfig, dropout: f64, device: Device) -> Result<Self> {
        config.validate()?;
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let embedding = nn::embedding(&root / "embedding", config.vocab_size, config.embedding_dim, Default::default());
        let blocks = (0..config.num_layers)
            .map(|i| Block::new(&(&root / "blocks" / i), &config, dropout))
            .collect();
        let final_norm = RmsNorm::new(&(&root / "final_norm"), config.embedding_dim, config.layer_norm_epsilon);
        let lm_head = nn::linear(
            &root / "lm_head",
            config.embedding_dim,
            config.vocab_size,
            nn::LinearConfig { bias: false, ..Default::default() },
        );

        Ok(Self {
            vs,
            embedding,
            blocks,
            final_norm,
            lm_head,
            dropout,
            config,
        })
    }

    /// Reads the architecture from `path` and builds the model with the given
    /// dropout probability.
    pub fn from_config_file<P: AsRef<Path>>(path: P, dropout: f64, device: Device) -> Result<Self> {
        let config = GopilotConfig::from_file(path.as_ref())?;
        let model = Self::new(config, dropout, device)?;
        info!(
            "Built model from {:?} ({} parameters, dropout {})",
            path.as_ref(),
            model.num_parameters(),
            dropout
        );
        Ok(model)
    }

    /// Overwrites every parameter with the tensors stored in a safetensors
    /// checkpoint. Fails without modifying the model if the checkpoint does not
    /// match the architecture.
    pub fn load_checkpoint<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        checkpoint::load_strict(&mut self.vs, path.as_ref())?;
        info!("Restored weights from {:?}", path.as_ref());
        Ok(())
    }

    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        checkpoint::save(&self.vs, path.as_ref())
    }

    /// input_ids: [batch, seq_len] int64. Returns logits [batch, seq_len, vocab].
    pub fn forward_t(&self, input_ids: &Tensor, train: bool) -> Tensor {
        let mut x = input_ids.apply(&self.embedding).dropout(self.dropout, train);
        for block in &self.blocks {
            x = block.forward_t(&x, train);
        }
        self.final_norm.forward(&x).apply(&self.lm_head)
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    pub fn config(&self) -> &GopilotConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    pub fn num_parameters(&self) -> i64 {
        self.vs
            .trainable_variables()
            .iter()
            .map(|t| t.numel() as i64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn tiny() -> GopilotConfig {
        GopilotConfig {
            vocab_size: 11,
            context_length: 8,
            embedding_dim: 8,
            num_layers: 2,
            num_heads: 2,
            feedforward_dim: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_forward_shape() {
        let model = GopilotModel::new(tiny(), 0.1, Device::Cpu).unwrap();
        let input = Tensor::from_slice(&[1i64, 2, 3, 4, 5, 6]).view([2, 3]);
        let logits = model.forward_t(&input, false);
        assert_eq!(logits.size(), vec![2, 3, 11]);
    }

    #[test]
    fn test_eval_forward_is_deterministic() {
        let model = GopilotModel::new(tiny(), 0.5, Device::Cpu).unwrap();
        let input = Tensor::from_slice(&[3i64, 1, 4, 1]).view([1, 4]);
        let a = model.forward_t(&input, false);
        let b = model.forward_t(&input, false);
        assert!(a.allclose(&b, 1e-6, 1e-6, false));
    }

    #[test]
    fn test_parameter_names() {
        let model = GopilotModel::new(tiny(), 0.0, Device::Cpu).unwrap();
        let vars = model.var_store().variables();
        assert!(vars.contains_key("embedding.weight"));
        assert!(vars.contains_key("blocks.1.attn.qkv.weight"));
        assert!(vars.contains_key("lm_head.weight"));
        assert!(!vars.contains_key("lm_head.bias"));
        assert_eq!(vars["embedding.weight"].kind(), Kind::Float);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GopilotConfig { num_heads: 3, ..tiny() };
        assert!(GopilotModel::new(config, 0.0, Device::Cpu).is_err());
    }
}
