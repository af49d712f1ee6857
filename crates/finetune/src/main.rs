use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};

use finetune::{CliArgs, Session};

fn main() -> Result<()> {
    let cli = match CliArgs::try_parse_from(std::env::args()) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    let level = if cli.run.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let session = match Session::prepare(cli, |name| std::env::var(name).ok()) {
        Ok(session) => session,
        Err(e) if e.is_usage() || e.is_precondition() => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
        Err(e) => return Err(e).context("failed to prepare fine-tuning"),
    };

    let summary = session.train().context("fine-tuning failed")?;
    info!(
        "Fine-tuning complete: {} epochs, {} optimizer steps, {} checkpoints written",
        summary.epochs,
        summary.optimizer_steps,
        summary.checkpoints.len()
    );
    Ok(())
}
