use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::cache::CacheArgs;
use super::config::ConfigArgs;
use super::plan::PlanArgs;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(author, version, long_version = LONG_VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Policy file (YAML) layered over the builtin defaults
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log output format: text or json
    #[arg(long, default_value = "text", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Inspect or validate the effective replay policy
    Config(ConfigArgs),

    /// Show the tier sequence each recorded step would use
    Plan(PlanArgs),

    /// Inspect or purge a persisted healing cache
    Cache(CacheArgs),
}
