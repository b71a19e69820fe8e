use anyhow::{Context, Result};
use clap::Parser;

use sw_cli::commands::{capture, run, weigh};
use sw_cli::{Cli, Commands, Config, logging};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config =
        Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    let _log_guard = logging::init(cli.verbose, config.log.file.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Commands::Run => run::run(&config)?,
        Commands::Capture => capture::run(&mut stdout, &config)?,
        Commands::Weigh { count } => weigh::run(&mut stdout, &config, count)?,
    }

    Ok(())
}
