//! Command line surface.
//!
//! The flags are split into four groups, each with its own parser. Every
//! group but the last consumes only the flags it recognizes and hands the rest
//! on; the last group parses whatever remains strictly, so a flag that no
//! group claims is a usage error.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser, ValueEnum};

const BIN_NAME: &str = "gopilot-finetune";

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelArg {
    Gopilot,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenizerArg {
    Gopilot,
    #[value(name = "hugging-face")]
    HuggingFace,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceArg {
    /// Best device available on this machine.
    Auto,
    Cpu,
    Cuda,
}

/// General arguments: what to fine-tune and on which data.
#[derive(Parser, Debug, Clone)]
#[command(name = BIN_NAME)]
pub struct Args {
    /// Path to the model configuration file.
    #[arg(long, value_name = "PATH")]
    pub model_cf: PathBuf,

    /// Path to the tokenizer configuration file.
    #[arg(long, value_name = "PATH")]
    pub tokenizer_cf: PathBuf,

    /// Name of the model to use.
    #[arg(long, value_enum, default_value_t = ModelArg::Gopilot)]
    pub model: ModelArg,

    /// Name of the tokenizer to use.
    #[arg(long, value_enum, default_value_t = TokenizerArg::Gopilot)]
    pub tokenizer: TokenizerArg,

    /// Path to the checkpoint file.
    #[arg(long, value_name = "PATH")]
    pub checkpoint_filepath: Option<PathBuf>,

    /// Path to the output file.
    #[arg(long, value_name = "PATH")]
    pub output_filepath: Option<PathBuf>,

    /// Path to the JSONL dataset file.
    #[arg(long, value_name = "PATH")]
    pub dataset_filepath: Option<PathBuf>,
}

/// Optimisation hyperparameters.
#[derive(Parser, Debug, Clone)]
#[command(name = BIN_NAME)]
pub struct TrainingParametersArgs {
    /// Number of gradient accumulation steps.
    #[arg(long, default_value_t = 1)]
    pub gradient_accumulation_steps: usize,

    /// Batch size.
    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,

    /// Dropout probability.
    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Weight decay value.
    #[arg(long, default_value_t = 0.1)]
    pub weight_decay: f64,

    /// Learning rate.
    #[arg(long, default_value_t = 1e-5)]
    pub lr: f64,

    /// Epsilon value for AdamW.
    #[arg(long, default_value_t = 1e-8)]
    pub epsilon: f64,

    /// Number of epochs.
    #[arg(long, default_value_t = 1)]
    pub num_epochs: usize,

    /// Clip gradients to this global norm.
    #[arg(long, default_value_t = 1.0)]
    pub clip_gradients: f64,

    /// Precision ("fp32" for single precision, anything else for half).
    #[arg(long, default_value = "float32")]
    pub precision: String,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Remote object storage.
#[derive(Parser, Debug, Clone)]
#[command(name = BIN_NAME)]
pub struct S3Args {
    /// S3 bucket.
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// S3 cache directory.
    #[arg(long, value_name = "PATH")]
    pub s3_cache_dir: Option<PathBuf>,

    /// Upload checkpoints to S3.
    #[arg(long)]
    pub s3_checkpoints: bool,
}

/// Execution environment.
#[derive(Parser, Debug, Clone)]
#[command(name = BIN_NAME)]
pub struct RunArgs {
    /// Device to use.
    #[arg(long, value_enum, default_value_t = DeviceArg::Cuda)]
    pub device: DeviceArg,

    /// Verbose.
    #[arg(long)]
    pub verbose: bool,

    /// Log to Neptune.
    #[arg(long)]
    pub neptune: bool,

    /// Compile model.
    #[arg(long)]
    pub compile: bool,

    /// Checkpoints directory.
    #[arg(long, value_name = "PATH")]
    pub checkpoints_dir: Option<PathBuf>,
}

/// All four argument groups, as typed on the command line.
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub general: Args,
    pub training: TrainingParametersArgs,
    pub s3: S3Args,
    pub run: RunArgs,
}

impl CliArgs {
    /// Parses a full argv, program name first.
    pub fn try_parse_from<I, T>(argv: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let bin = argv.next().unwrap_or_else(|| BIN_NAME.to_string());
        let remaining: Vec<String> = argv.collect();

        let (general, remaining) = parse_known::<Args>(&bin, remaining)?;
        let (training, remaining) = parse_known::<TrainingParametersArgs>(&bin, remaining)?;
        let (s3, remaining) = parse_known::<S3Args>(&bin, remaining)?;
        let run = RunArgs::try_parse_from(std::iter::once(bin).chain(remaining))?;

        Ok(Self {
            general,
            training,
            s3,
            run,
        })
    }
}

/// Parses the tokens `T` recognizes and returns the unrecognized remainder.
pub fn parse_known<T>(bin: &str, tokens: Vec<String>) -> Result<(T, Vec<String>), clap::Error>
where
    T: CommandFactory + FromArgMatches,
{
    let mut command = T::command();
    command.build();
    let (known, remainder) = split_known(&command, tokens);

    let mut matches = command.try_get_matches_from_mut(std::iter::once(bin.to_string()).chain(known))?;
    let parsed = T::from_arg_matches_mut(&mut matches).map_err(|e| e.format(&mut command))?;
    Ok((parsed, remainder))
}

/// Partitions `tokens` into those belonging to `command` and the rest.
///
/// Handles `--flag`, `--flag value`, `--flag=value` and `-f value`. A value
/// that looks like a long flag is never swallowed.
fn split_known(command: &clap::Command, tokens: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut longs: HashMap<&str, bool> = HashMap::new();
    let mut shorts: HashMap<char, bool> = HashMap::new();
    for arg in command.get_arguments() {
        let takes_value = arg.get_action().takes_values();
        if let Some(long) = arg.get_long() {
            longs.insert(long, takes_value);
        }
        if let Some(short) = arg.get_short() {
            shorts.insert(short, takes_value);
        }
    }

    let mut known = Vec::new();
    let mut remainder = Vec::new();
    let mut tokens = tokens.into_iter().peekable();

    while let Some(token) = tokens.next() {
        if token == "--" {
            remainder.push(token);
            remainder.extend(tokens);
            break;
        }

        let needs_value = if let Some(flag) = token.strip_prefix("--") {
            match flag.split_once('=') {
                Some((name, _)) => longs.get(name).map(|_| false),
                None => longs.get(flag).copied(),
            }
        } else if let Some(flag) = token.strip_prefix('-') {
            let mut chars = flag.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => shorts.get(&c).copied(),
                _ => None,
            }
        } else {
            None
        };

        match needs_value {
            Some(needs_value) => {
                known.push(token);
                if needs_value {
                    if let Some(value) = tokens.next_if(|v| !v.starts_with("--")) {
                        known.push(value);
                    }
                }
            }
            None => remainder.push(token),
        }
    }

    (known, remainder)
}
