use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokenizer::{GopilotTokenizer, Trainer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a Gopilot tokenizer on Go sources
    Train {
        /// Go files to train on
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output tokenizer file
        #[arg(short, long, default_value = "tokenizer.json")]
        output: PathBuf,

        /// Vocabulary size
        #[arg(short, long, default_value_t = 32000)]
        vocab_size: usize,

        /// Minimum frequency for a pair to be merged
        #[arg(long, default_value_t = 2)]
        min_frequency: u32,
    },
    /// Encode Go source with an existing tokenizer
    Encode {
        /// Path to the tokenizer file
        #[arg(long)]
        tokenizer: PathBuf,

        /// Text to encode
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,

        /// File to encode
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Decode ids with an existing tokenizer
    Decode {
        /// Path to the tokenizer file
        #[arg(long)]
        tokenizer: PathBuf,

        /// IDs to decode (comma separated)
        #[arg(short, long)]
        ids: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            files,
            output,
            vocab_size,
            min_frequency,
        } => {
            println!("Training tokenizer on {} files...", files.len());
            let trainer = Trainer::new(vocab_size, min_frequency, Trainer::default_special_tokens());
            let tok = trainer.train_files(&files).context("Failed to train tokenizer")?;
            tok.save(&output)
                .with_context(|| format!("Failed to save tokenizer to {output:?}"))?;
            println!("Saved {} tokens to {:?}", tok.vocab_size(), output);
        }
        Commands::Encode { tokenizer, text, file } => {
            let tok = GopilotTokenizer::from_file(&tokenizer).context("Failed to load tokenizer")?;
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(file)) => {
                    std::fs::read_to_string(&file).with_context(|| format!("Failed to read {file:?}"))?
                }
                (None, None) => anyhow::bail!("pass --text or --file"),
            };
            println!("Encoded IDs: {:?}", tok.encode(&text));
        }
        Commands::Decode { tokenizer, ids } => {
            let tok = GopilotTokenizer::from_file(&tokenizer).context("Failed to load tokenizer")?;
            let ids = ids
                .split(',')
                .map(|s| s.trim().parse::<u32>().with_context(|| format!("Invalid ID {s:?}")))
                .collect::<Result<Vec<_>>>()?;
            println!("Decoded text: {}", tok.decode(&ids));
        }
    }

    Ok(())
}
