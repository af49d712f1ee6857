use tch::{nn, IndexOp, Kind, Tensor};

use crate::config::GopilotConfig;
use crate::rotary::RotaryEmbedding;

#[derive(Debug)]
pub struct CausalSelfAttention {
    qkv: nn::Linear,
    out: nn::Linear,
    n_head: i64,
    dropout: f64,
    mask: Tensor,
    rotary: RotaryEmbedding,
}

impl CausalSelfAttention {
    pub fn new(vs: &nn::Path, config: &GopilotConfig, dropout: f64) -> Self {
        let dim = config.embedding_dim;
        let linear_config = nn::LinearConfig {
            bias: config.use_bias,
            ..Default::default()
        };

        let qkv = nn::linear(vs / "qkv", dim, 3 * dim, linear_config);
        let out = nn::linear(vs / "out", dim, dim, linear_config);
        let rotary = RotaryEmbedding::new(config.head_size(), config.context_length, vs.device());

        // Lower-triangular mask; not a parameter, so it never appears in checkpoints.
        let n = config.context_length;
        let mask = Tensor::ones(&[n, n], (Kind::Bool, vs.device()))
            .tril(0)
            .reshape(&[1, 1, n, n]);

        Self {
            qkv,
            out,
            n_head: config.num_heads,
            dropout,
            mask,
            rotary,
        }
    }

    /// x: [batch, seq_len, dim]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        let size = x.size();
        let (b, t, c) = (size[0], size[1], size[2]);
        let head_size = c / self.n_head;

        let chunks = x.apply(&self.qkv).chunk(3, -1);
        let split = |z: &Tensor| z.view([b, t, self.n_head, head_size]).transpose(1, 2);
        let q = self.rotary.forward(&split(&chunks[0]));
        let k = self.rotary.forward(&split(&chunks[1]));
        let v = split(&chunks[2]);

        let att = q.matmul(&k.transpose(-2, -1)) * (1.0 / (head_size as f64).sqrt());
        let mask = self.mask.i((.., .., ..t, ..t));
        let att = att
            .masked_fill(&mask.logical_not(), f64::NEG_INFINITY)
            .softmax(-1, Kind::Float)
            .to_kind(v.kind())
            .dropout(self.dropout, train);

        att.matmul(&v)
            .transpose(1, 2)
            .contiguous()
            .view([b, t, c])
            .apply(&self.out)
    }
}
