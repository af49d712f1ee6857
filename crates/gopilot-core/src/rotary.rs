use tch::{Device, Kind, Tensor};

#[derive(Debug)]
pub struct RotaryEmbedding {
    cos: Tensor,
    sin: Tensor,
}

impl RotaryEmbedding {
    /// Precomputes the rotation tables for every position up to `max_len`.
    pub fn new(head_dim: i64, max_len: i64, device: Device) -> Self {
        let inv_freq: Vec<f32> = (0..head_dim)
            .step_by(2)
            .map(|i| 1.0 / 10000.0f32.powf(i as f32 / head_dim as f32))
            .collect();
        let inv_freq = Tensor::from_slice(&inv_freq).to(device);

        let t = Tensor::arange(max_len, (Kind::Float, device));
        let freqs = t.outer(&inv_freq);
        // [1, 1, max_len, head_dim]
        let emb = Tensor::cat(&[&freqs, &freqs], -1).unsqueeze(0).unsqueeze(0);

        Self {
            cos: emb.cos(),
            sin: emb.sin(),
        }
    }

    /// x: [batch, n_head, seq_len, head_dim]
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let seq_len = x.size()[2];
        let cos = self.cos.narrow(2, 0, seq_len);
        let sin = self.sin.narrow(2, 0, seq_len);
        (x * &cos) + (Self::rotate_half(x) * &sin)
    }

    fn rotate_half(x: &Tensor) -> Tensor {
        let half = x.size()[x.dim() - 1] / 2;
        let x1 = x.narrow(-1, 0, half);
        let x2 = x.narrow(-1, half, half);
        Tensor::cat(&[&-x2, &x1], -1)
    }
}
