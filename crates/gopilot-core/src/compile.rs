use std::time::Instant;

use log::info;
use tch::{nn, Device, Kind, Tensor};

use crate::config::GopilotConfig;
use crate::error::{ModelError, Result};
use crate::model::GopilotModel;

/// A model prepared for fast repeated execution on a CUDA device.
///
/// Compilation turns on cuDNN autotuning and runs one warm-up pass over a full
/// context window, so kernel selection happens up front instead of during the
/// first training steps. The numerical contract of `forward_t` is unchanged.
#[derive(Debug)]
pub struct CompiledModel {
    inner: GopilotModel,
}

impl CompiledModel {
    pub fn compile(model: GopilotModel) -> Result<Self> {
        let device = model.device();
        if !device.is_cuda() {
            return Err(ModelError::CompileRequiresCuda(format!("{device:?}")));
        }

        let start = Instant::now();
        tch::Cuda::cudnn_set_benchmark(true);
        let context = model.config().context_length;
        let warmup = Tensor::zeros(&[1, context], (Kind::Int64, device));
        tch::no_grad(|| {
            let _ = model.forward_t(&warmup, false);
        });
        if let Device::Cuda(ordinal) = device {
            tch::Cuda::synchronize(ordinal as i64);
        }
        info!("Compiled model in {:.2?}", start.elapsed());

        Ok(Self { inner: model })
    }
}

/// Either form of the model; both expose the same execution contract.
#[derive(Debug)]
pub enum ExecutableModel {
    Eager(GopilotModel),
    Compiled(CompiledModel),
}

impl ExecutableModel {
    fn model(&self) -> &GopilotModel {
        match self {
            ExecutableModel::Eager(m) => m,
            ExecutableModel::Compiled(c) => &c.inner,
        }
    }

    pub fn forward_t(&self, input_ids: &Tensor, train: bool) -> Tensor {
        self.model().forward_t(input_ids, train)
    }

    pub fn var_store(&self) -> &nn::VarStore {
        self.model().var_store()
    }

    pub fn config(&self) -> &GopilotConfig {
        self.model().config()
    }

    pub fn device(&self) -> Device {
        self.model().device()
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, ExecutableModel::Compiled(_))
    }

    pub fn save_checkpoint<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        self.model().save_checkpoint(path)
    }
}

impl From<GopilotModel> for ExecutableModel {
    fn from(model: GopilotModel) -> Self {
        ExecutableModel::Eager(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> GopilotModel {
        let config = GopilotConfig {
            vocab_size: 5,
            context_length: 4,
            embedding_dim: 4,
            num_layers: 1,
            num_heads: 1,
            feedforward_dim: 8,
            ..Default::default()
        };
        GopilotModel::new(config, 0.0, Device::Cpu).unwrap()
    }

    #[test]
    fn test_compile_on_cpu_is_rejected() {
        let err = CompiledModel::compile(tiny_model()).unwrap_err();
        assert!(matches!(err, ModelError::CompileRequiresCuda(_)));
        assert!(err.to_string().contains("CUDA"));
    }

    #[test]
    fn test_eager_wrapper_matches_model() {
        let model = tiny_model();
        let input = Tensor::from_slice(&[1i64, 2, 3]).view([1, 3]);
        let expected = model.forward_t(&input, false);
        let wrapped = ExecutableModel::from(model);
        assert!(!wrapped.is_compiled());
        assert!(wrapped.forward_t(&input, false).allclose(&expected, 1e-6, 1e-6, false));
    }
}
