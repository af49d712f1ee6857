//! Second phase of configuration: turns the raw command line groups into a
//! fully resolved run description. Nothing downstream sees the raw strings.

use std::path::{Path, PathBuf};

use gopilot_core::GopilotModel;
use log::{info, warn};
use tch::Device;
use tokenizer::TokenizerKind;

use crate::args::{CliArgs, DeviceArg, ModelArg, TokenizerArg};
use crate::error::{FinetuneError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Fp32,
    Fp16,
}

impl Precision {
    /// Only the exact string `fp32` selects single precision.
    pub fn from_flag(flag: &str) -> Self {
        match flag {
            "fp32" => Precision::Fp32,
            "fp16" | "float16" | "half" => Precision::Fp16,
            other => {
                warn!("Precision {:?} is not \"fp32\", training in half precision", other);
                Precision::Fp16
            }
        }
    }
}

/// The best device this machine offers.
pub fn best_device() -> Device {
    Device::cuda_if_available()
}

pub fn resolve_device(arg: DeviceArg) -> Device {
    match arg {
        DeviceArg::Auto => best_device(),
        DeviceArg::Cpu => Device::Cpu,
        DeviceArg::Cuda => Device::Cuda(0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Gopilot,
}

impl ModelKind {
    pub fn load(self, config_path: &Path, dropout: f64, device: Device) -> Result<GopilotModel> {
        match self {
            ModelKind::Gopilot => Ok(GopilotModel::from_config_file(config_path, dropout, device)?),
        }
    }
}

impl From<ModelArg> for ModelKind {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Gopilot => ModelKind::Gopilot,
        }
    }
}

impl From<TokenizerArg> for TokenizerKind {
    fn from(arg: TokenizerArg) -> Self {
        match arg {
            TokenizerArg::Gopilot => TokenizerKind::Gopilot,
            TokenizerArg::HuggingFace => TokenizerKind::HuggingFace,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingParameters {
    pub gradient_accumulation_steps: usize,
    pub batch_size: usize,
    pub dropout: f64,
    pub weight_decay: f64,
    pub lr: f64,
    pub epsilon: f64,
    pub num_epochs: usize,
    pub clip_gradients: f64,
    pub precision: Precision,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub bucket: Option<String>,
    pub cache_dir: Option<PathBuf>,
    /// Stage checkpoints for upload.
    pub checkpoints: bool,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub device: Device,
    pub verbose: bool,
    pub neptune: bool,
    pub compile: bool,
    pub checkpoints_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub model: ModelKind,
    pub model_cf: PathBuf,
    pub tokenizer: TokenizerKind,
    pub tokenizer_cf: PathBuf,
    pub checkpoint_filepath: PathBuf,
    pub output_filepath: Option<PathBuf>,
    pub dataset_filepath: PathBuf,
    pub training: TrainingParameters,
    pub storage: StorageOptions,
    pub run: RunOptions,
}

impl ResolvedConfig {
    pub fn resolve(cli: CliArgs) -> Result<Self> {
        let CliArgs {
            general,
            training,
            s3,
            run,
        } = cli;

        let checkpoint_filepath = general
            .checkpoint_filepath
            .ok_or(FinetuneError::MissingArgument("--checkpoint-filepath"))?;
        let dataset_filepath = general
            .dataset_filepath
            .ok_or(FinetuneError::MissingArgument("--dataset-filepath"))?;

        for (name, value) in [
            ("--batch-size", training.batch_size),
            ("--gradient-accumulation-steps", training.gradient_accumulation_steps),
            ("--num-epochs", training.num_epochs),
        ] {
            if value == 0 {
                return Err(invalid(name, "must be at least 1"));
            }
        }
        if !(0.0..1.0).contains(&training.dropout) {
            return Err(invalid("--dropout", format!("{} is not in [0, 1)", training.dropout)));
        }
        if training.lr <= 0.0 {
            return Err(invalid("--lr", format!("{} is not positive", training.lr)));
        }
        if training.epsilon <= 0.0 {
            return Err(invalid("--epsilon", format!("{} is not positive", training.epsilon)));
        }
        if training.weight_decay < 0.0 {
            return Err(invalid("--weight-decay", format!("{} is negative", training.weight_decay)));
        }

        if s3.s3_checkpoints {
            if s3.s3_bucket.is_none() {
                return Err(FinetuneError::MissingArgument("--s3-bucket"));
            }
            if s3.s3_cache_dir.is_none() {
                return Err(FinetuneError::MissingArgument("--s3-cache-dir"));
            }
        }

        let device = resolve_device(run.device);
        if run.compile && !device.is_cuda() {
            return Err(FinetuneError::CompileRequiresCuda(format!("{device:?}")));
        }

        let precision = Precision::from_flag(&training.precision);
        info!("Resolved device {:?} and precision {:?}", device, precision);

        Ok(Self {
            model: general.model.into(),
            model_cf: general.model_cf,
            tokenizer: general.tokenizer.into(),
            tokenizer_cf: general.tokenizer_cf,
            checkpoint_filepath,
            output_filepath: general.output_filepath,
            dataset_filepath,
            training: TrainingParameters {
                gradient_accumulation_steps: training.gradient_accumulation_steps,
                batch_size: training.batch_size,
                dropout: training.dropout,
                weight_decay: training.weight_decay,
                lr: training.lr,
                epsilon: training.epsilon,
                num_epochs: training.num_epochs,
                clip_gradients: training.clip_gradients,
                precision,
                seed: training.seed,
            },
            storage: StorageOptions {
                bucket: s3.s3_bucket,
                cache_dir: s3.s3_cache_dir,
                checkpoints: s3.s3_checkpoints,
            },
            run: RunOptions {
                device,
                verbose: run.verbose,
                neptune: run.neptune,
                compile: run.compile,
                checkpoints_dir: run.checkpoints_dir,
            },
        })
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> FinetuneError {
    FinetuneError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}
