use std::sync::Arc;

use gopilot_core::{CompiledModel, ExecutableModel};
use log::info;
use tokenizer::Tokenizer;

use crate::args::CliArgs;
use crate::config::ResolvedConfig;
use crate::dataset::FineTuningDataset;
use crate::error::{FinetuneError, Result};
use crate::seed::seed_everything;
use crate::storage::StorageEnv;
use crate::train::{FineTuner, TrainSummary};

/// Everything a fine-tuning run needs, built in a fixed order.
#[derive(Debug)]
pub struct Session {
    config: ResolvedConfig,
    model: ExecutableModel,
    tokenizer: Arc<Tokenizer>,
    dataset: FineTuningDataset,
}

impl Session {
    /// Parses `argv` and prepares the run. `env` resolves environment
    /// variables and is only consulted once the command line is valid.
    pub fn from_argv<I, T, F>(argv: I, env: F) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
        F: Fn(&str) -> Option<String>,
    {
        let cli = CliArgs::try_parse_from(argv)?;
        Self::prepare(cli, env)
    }

    pub fn prepare<F>(cli: CliArgs, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        StorageEnv::from_lookup(env).ensure_available()?;

        seed_everything(cli.training.seed);

        let config = ResolvedConfig::resolve(cli)?;

        let mut model = config
            .model
            .load(&config.model_cf, config.training.dropout, config.run.device)?;
        model.load_checkpoint(&config.checkpoint_filepath)?;

        let model = if config.run.compile {
            ExecutableModel::Compiled(CompiledModel::compile(model)?)
        } else {
            ExecutableModel::from(model)
        };

        let tokenizer = Arc::new(config.tokenizer.load(&config.tokenizer_cf)?);
        info!(
            "Loaded {} tokenizer from {:?} ({} tokens)",
            tokenizer.kind(),
            config.tokenizer_cf,
            tokenizer.vocab_size()
        );
        let model_vocab = model.config().vocab_size;
        if tokenizer.vocab_size() as i64 > model_vocab {
            return Err(FinetuneError::VocabMismatch {
                tokenizer: tokenizer.vocab_size(),
                model: model_vocab,
            });
        }

        let dataset = FineTuningDataset::new(&config.dataset_filepath, Arc::clone(&tokenizer))?
            .with_max_length(model.config().context_length as usize);

        Ok(Self {
            config,
            model,
            tokenizer,
            dataset,
        })
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn model(&self) -> &ExecutableModel {
        &self.model
    }

    pub fn tokenizer(&self) -> &Arc<Tokenizer> {
        &self.tokenizer
    }

    pub fn dataset(&self) -> &FineTuningDataset {
        &self.dataset
    }

    pub fn train(&self) -> Result<TrainSummary> {
        FineTuner::new(&self.model, &self.config)?.fit(&self.dataset)
    }
}
