use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use soulbrowser_policy_center::{load_policy, PolicySource, ReplayPolicy};

use super::env::CliArgs;

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective policy as YAML
    Show,

    /// Validate the policy and list every value not taken from the defaults
    Check,
}

/// Load defaults, the `--config` file, then environment overrides.
pub fn load(cli: &CliArgs) -> Result<ReplayPolicy> {
    load_policy(cli.config.as_deref()).context("failed to load replay policy")
}

pub fn cmd_config(args: ConfigArgs, cli: &CliArgs) -> Result<()> {
    let policy = load(cli)?;
    match args.action {
        ConfigAction::Show => {
            print!("{}", serde_yaml::to_string(&policy)?);
        }
        ConfigAction::Check => {
            println!("Policy is valid (rev {})", policy.rev);
            for line in overridden(&policy) {
                println!("  {}", line);
            }
        }
    }
    Ok(())
}

fn overridden(policy: &ReplayPolicy) -> Vec<String> {
    let mut lines: Vec<String> = policy
        .provenance
        .values()
        .filter(|entry| entry.source != PolicySource::Builtin)
        .map(|entry| format!("{} <- {:?}", entry.path, entry.source))
        .collect();
    lines.sort();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use soulbrowser_policy_center::default_policy;

    #[test]
    fn overridden_lists_non_builtin_paths_sorted() {
        let mut policy = default_policy();
        policy.set_provenance("confidence.minimum", PolicySource::Builtin);
        policy.set_provenance("remote.max_calls", PolicySource::Env);
        policy.set_provenance("cache.ttl_secs", PolicySource::File);
        assert_eq!(
            overridden(&policy),
            vec!["cache.ttl_secs <- File", "remote.max_calls <- Env"]
        );
    }
}
