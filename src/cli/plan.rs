use std::path::PathBuf;

use action_locator::{DecisionContext, DecisionEngine, TierPlan};
use anyhow::Result;
use clap::Args;
use soulbrowser_core_types::ActionDescriptor;

use super::config::load;
use super::env::CliArgs;
use crate::recording::{FileRecording, RecordingSource};

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Recording file (JSON or YAML)
    pub recording: PathBuf,

    /// Assume a remote-debugging protocol session is attached
    #[arg(long)]
    pub protocol: bool,
}

pub fn cmd_plan(args: PlanArgs, cli: &CliArgs) -> Result<()> {
    let policy = load(cli)?;
    let plan = TierPlan::from_policy(&policy)?;
    let steps = FileRecording::new(&args.recording).load()?;
    for (index, step) in steps.iter().enumerate() {
        println!("{}", describe_step(index + 1, step, &plan, args.protocol));
    }
    Ok(())
}

pub(crate) fn describe_step(
    position: usize,
    step: &ActionDescriptor,
    plan: &TierPlan,
    protocol: bool,
) -> String {
    let head = format!("{:>3}. {} [{}] \"{}\"", position, step.id, step.kind, step.label);
    if step.kind.is_navigation() {
        return format!("{head}\n     navigation, no resolution");
    }
    let ctx = DecisionContext::for_step(step, protocol);
    let sequence = DecisionEngine::new()
        .select_sequence(&ctx, plan)
        .into_iter()
        .map(|tier| {
            if plan.is_enabled(tier) {
                format!("{}({}ms)", tier, plan.timeout(tier).as_millis())
            } else {
                format!("{}(disabled)", tier)
            }
        })
        .collect::<Vec<_>>()
        .join(" -> ");
    format!(
        "{head}\n     stable_id={} name={} test_id={} manual_override={}\n     tiers: {}",
        ctx.has_stable_id, ctx.has_name, ctx.has_test_id, ctx.has_manual_override, sequence
    )
}
