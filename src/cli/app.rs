use anyhow::{anyhow, Result};
use clap::Parser;
use l6_observe::{init_tracing, LogFormat};
use tracing::{debug, error};

use super::cache::cmd_cache;
use super::config::cmd_config;
use super::env::{CliArgs, Commands};
use super::plan::cmd_plan;

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();
    let format = LogFormat::parse(&cli.log_format)
        .ok_or_else(|| anyhow!("unknown log format '{}'", cli.log_format))?;
    init_tracing(format);
    debug!(version = env!("CARGO_PKG_VERSION"), "soulreplay starting");

    let result = match cli.command.clone() {
        Commands::Config(args) => cmd_config(args, &cli),
        Commands::Plan(args) => cmd_plan(args, &cli),
        Commands::Cache(args) => cmd_cache(args, &cli),
    };
    if let Err(err) = &result {
        error!("Command failed: {:#}", err);
    }
    result
}
