use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use gopilot_core::ExecutableModel;
use log::{debug, info, warn};
use serde_json::json;
use tch::nn::{self, OptimizerConfig};
use tch::{Kind, Reduction, Tensor};

use crate::batch::{Batch, Batcher};
use crate::config::{Precision, ResolvedConfig};
use crate::dataset::{FineTuningDataset, IGNORE_INDEX};
use crate::error::{FinetuneError, Result};
use crate::storage::CheckpointStager;

const LOG_EVERY: usize = 10;

/// What a finished run did.
#[derive(Debug, Clone, Default)]
pub struct TrainSummary {
    pub epochs: usize,
    pub optimizer_steps: usize,
    pub skipped_batches: usize,
    pub last_epoch_loss: Option<f64>,
    pub checkpoints: Vec<PathBuf>,
}

pub struct FineTuner<'a> {
    model: &'a ExecutableModel,
    optimizer: nn::Optimizer,
    config: &'a ResolvedConfig,
    autocast: bool,
    stager: Option<CheckpointStager>,
}

impl<'a> FineTuner<'a> {
    pub fn new(model: &'a ExecutableModel, config: &'a ResolvedConfig) -> Result<Self> {
        let params = &config.training;
        let optimizer = nn::AdamW {
            beta1: 0.9,
            beta2: 0.999,
            wd: params.weight_decay,
            eps: params.epsilon,
            amsgrad: false,
        }
        .build(model.var_store(), params.lr)?;

        let autocast = match params.precision {
            Precision::Fp32 => false,
            Precision::Fp16 if model.device().is_cuda() => true,
            Precision::Fp16 => {
                warn!("Half precision needs a CUDA device, training in fp32 on {:?}", model.device());
                false
            }
        };

        let stager = match (&config.storage.cache_dir, &config.storage.bucket) {
            (Some(cache_dir), Some(bucket)) if config.storage.checkpoints => {
                Some(CheckpointStager::new(cache_dir, bucket))
            }
            _ => None,
        };

        Ok(Self {
            model,
            optimizer,
            config,
            autocast,
            stager,
        })
    }

    pub fn fit(&mut self, dataset: &FineTuningDataset) -> Result<TrainSummary> {
        let config = self.config;
        let params = &config.training;
        let pad_id = dataset.tokenizer().pad_id().map_or(0, i64::from);
        let batcher = Batcher::new(params.batch_size, pad_id, self.model.device());
        let accumulation = params.gradient_accumulation_steps;

        info!(
            "Fine-tuning on {} records for {} epochs (batch size {}, accumulation {}, compiled: {})",
            dataset.len(),
            params.num_epochs,
            params.batch_size,
            accumulation,
            self.model.is_compiled()
        );

        let mut summary = TrainSummary::default();
        for epoch in 1..=params.num_epochs {
            let start = Instant::now();
            let mut epoch_loss = 0.0;
            let mut epoch_batches = 0usize;
            let mut pending = 0usize;

            self.optimizer.zero_grad();
            for (batch_idx, indices) in batcher.epoch_indices(dataset.len()).iter().enumerate() {
                let Some(batch) = batcher.collate(dataset, indices) else {
                    summary.skipped_batches += 1;
                    continue;
                };

                let loss = self.loss(&batch);
                let loss_value = loss.double_value(&[]);
                (loss / accumulation as f64).backward();
                epoch_loss += loss_value;
                epoch_batches += 1;
                pending += 1;

                if pending == accumulation {
                    self.step(pending);
                    pending = 0;
                    summary.optimizer_steps += 1;
                }

                if batch_idx % LOG_EVERY == 0 {
                    debug!("Epoch {} | Batch {} | Loss: {:.4}", epoch, batch_idx, loss_value);
                    self.track(epoch, summary.optimizer_steps, loss_value);
                }
            }
            if pending > 0 {
                self.step(pending);
                summary.optimizer_steps += 1;
            }

            let mean_loss = (epoch_batches > 0).then(|| epoch_loss / epoch_batches as f64);
            match mean_loss {
                Some(loss) => info!(
                    "Epoch {} done in {:.1?} | Average loss: {:.4}",
                    epoch,
                    start.elapsed(),
                    loss
                ),
                None => warn!("Epoch {} had no usable batches", epoch),
            }
            summary.epochs = epoch;
            summary.last_epoch_loss = mean_loss;

            if let Some(dir) = &config.run.checkpoints_dir {
                let path = dir.join(format!("checkpoint_epoch_{epoch}.safetensors"));
                self.save(&path)?;
                summary.checkpoints.push(path);
            }
        }

        if let Some(path) = &config.output_filepath {
            self.save(path)?;
            summary.checkpoints.push(path.clone());
        }
        Ok(summary)
    }

    fn loss(&self, batch: &Batch) -> Tensor {
        tch::autocast(self.autocast, || {
            let logits = self.model.forward_t(&batch.inputs, true);
            let vocab = logits.size()[2];
            logits.view([-1, vocab]).to_kind(Kind::Float).cross_entropy_loss::<Tensor>(
                &batch.targets.view([-1]),
                None,
                Reduction::Mean,
                IGNORE_INDEX,
                0.0,
            )
        })
    }

    /// Applies the gradients of a group of `group` accumulated batches.
    fn step(&mut self, group: usize) {
        let accumulation = self.config.training.gradient_accumulation_steps;
        if group < accumulation {
            rescale_gradients(&self.model.var_store().trainable_variables(), accumulation, group);
        }
        let max_norm = self.config.training.clip_gradients;
        if max_norm > 0.0 {
            self.optimizer.clip_grad_norm(max_norm);
        }
        self.optimizer.step();
        self.optimizer.zero_grad();
    }

    fn track(&self, epoch: usize, step: usize, loss: f64) {
        if self.config.run.neptune {
            info!(
                target: "neptune",
                "{}",
                json!({
                    "epoch": epoch,
                    "step": step,
                    "loss": loss,
                    "lr": self.config.training.lr,
                })
            );
        }
    }

    fn save(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| FinetuneError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.model.save_checkpoint(path)?;
        info!("Saved checkpoint to {:?}", path);
        if let Some(stager) = &self.stager {
            stager.stage(path)?;
        }
        Ok(())
    }
}

/// Each batch loss is divided by `accumulation` before backward. A short
/// trailing group of `group` batches is brought back to a mean over `group`.
fn rescale_gradients(variables: &[Tensor], accumulation: usize, group: usize) {
    let scale = accumulation as f64 / group as f64;
    tch::no_grad(|| {
        for var in variables {
            let mut grad = var.grad();
            if grad.defined() {
                let _ = grad.g_mul_scalar_(scale);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn test_short_group_gradient_is_mean_over_group() {
        let x = Tensor::ones([3], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        // one batch accumulated where four were expected
        let loss = (&x * 2.0).sum(Kind::Float) / 4.0;
        loss.backward();
        assert!(x.grad().allclose(&Tensor::full([3], 0.5, (Kind::Float, Device::Cpu)), 1e-6, 1e-6, false));

        rescale_gradients(std::slice::from_ref(&x), 4, 1);
        assert!(x.grad().allclose(&Tensor::full([3], 2.0, (Kind::Float, Device::Cpu)), 1e-6, 1e-6, false));
    }

    #[test]
    fn test_undefined_gradients_are_left_alone() {
        let x = Tensor::ones([2], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        rescale_gradients(std::slice::from_ref(&x), 4, 3);
        assert!(!x.grad().defined());
    }
}
