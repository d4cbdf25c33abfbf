use std::path::PathBuf;

use action_healer::HealingCache;
use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use super::config::load;
use super::env::CliArgs;

#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,

    /// Cache file; defaults to `cache.path` from the policy
    #[arg(long, value_name = "FILE", global = true)]
    pub path: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// Print entry counts and hit/miss counters
    Stats,

    /// Drop expired entries and write the cache back
    Purge,
}

pub fn cmd_cache(args: CacheArgs, cli: &CliArgs) -> Result<()> {
    let policy = load(cli)?;
    let path = args
        .path
        .or_else(|| policy.cache.path.clone())
        .ok_or_else(|| anyhow!("no cache file: pass --path or set cache.path"))?;
    let cache = HealingCache::open(&policy.cache, &path)?;

    match args.action {
        CacheAction::Stats => {
            let stats = cache.stats();
            println!("Healing cache {}", path.display());
            println!("  entries:  {}", stats.entries);
            println!("  healthy:  {}", stats.healthy);
            println!("  expired:  {}", stats.expired);
        }
        CacheAction::Purge => {
            let removed = cache.purge_expired();
            cache.save(&path)?;
            println!(
                "Removed {} expired entries from {} ({} left)",
                removed,
                path.display(),
                cache.len()
            );
        }
    }
    Ok(())
}
