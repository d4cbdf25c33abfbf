//! Load-time validation shared with the runtime constructors.

use std::collections::HashSet;

use soulbrowser_core_types::StrategyTier;

use crate::errors::PolicyError;
use crate::model::{
    ConfidencePolicy, HealCachePolicy, HealingPolicy, RemoteGuardPolicy, ReplayPolicy, TierPolicy,
};

/// Remote vision gets one bounded retry on transient failure.
pub const MAX_REMOTE_RETRIES: u32 = 1;

pub fn validate_policy(policy: &ReplayPolicy) -> Result<(), PolicyError> {
    validate_tiers(&policy.tier_policies())?;
    validate_confidence(&policy.confidence)?;
    validate_cache(&policy.cache)?;
    validate_remote(&policy.remote)?;
    validate_healing(&policy.healing)?;
    Ok(())
}

/// Every tier must appear once, and manual-coordinate must sort after all others.
pub fn validate_tiers(tiers: &[TierPolicy]) -> Result<(), PolicyError> {
    let mut seen = HashSet::new();
    for policy in tiers {
        if !seen.insert(policy.tier) {
            return Err(PolicyError::Invalid(format!(
                "tier '{}' configured more than once",
                policy.tier
            )));
        }
        if policy.timeout_ms == 0 {
            return Err(PolicyError::value(
                &format!("tiers.{}.timeout_ms", policy.tier),
                "timeout must be greater than zero",
            ));
        }
    }
    for tier in StrategyTier::all() {
        if !seen.contains(&tier) {
            return Err(PolicyError::Invalid(format!("tier '{}' missing", tier)));
        }
    }

    let Some(manual) = tiers
        .iter()
        .find(|policy| policy.tier == StrategyTier::ManualCoordinate)
    else {
        return Ok(());
    };
    for other in tiers
        .iter()
        .filter(|policy| policy.tier != StrategyTier::ManualCoordinate)
    {
        if manual.priority <= other.priority {
            return Err(PolicyError::ManualTierOrder {
                manual: manual.priority,
                other: other.tier.name().to_string(),
                priority: other.priority,
            });
        }
    }
    Ok(())
}

pub fn validate_confidence(policy: &ConfidencePolicy) -> Result<(), PolicyError> {
    for (path, value) in [
        ("confidence.auto_apply", policy.auto_apply),
        ("confidence.apply_flag", policy.apply_flag),
        ("confidence.minimum", policy.minimum),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(PolicyError::value(path, format!("{} is outside [0, 1]", value)));
        }
    }
    if policy.auto_apply < policy.apply_flag || policy.apply_flag < policy.minimum {
        return Err(PolicyError::ThresholdOrder {
            auto_apply: policy.auto_apply,
            apply_flag: policy.apply_flag,
            minimum: policy.minimum,
        });
    }
    Ok(())
}

pub fn validate_cache(policy: &HealCachePolicy) -> Result<(), PolicyError> {
    if policy.max_entries == 0 {
        return Err(PolicyError::value(
            "cache.max_entries",
            "cache must hold at least one entry",
        ));
    }
    if !(0.0..=1.0).contains(&policy.min_success_rate) {
        return Err(PolicyError::value(
            "cache.min_success_rate",
            format!("{} is outside [0, 1]", policy.min_success_rate),
        ));
    }
    Ok(())
}

pub fn validate_remote(policy: &RemoteGuardPolicy) -> Result<(), PolicyError> {
    if policy.window_secs == 0 {
        return Err(PolicyError::value("remote.window_secs", "window must be non-zero"));
    }
    if policy.max_calls == 0 {
        return Err(PolicyError::value("remote.max_calls", "budget must be non-zero"));
    }
    if policy.failure_threshold == 0 {
        return Err(PolicyError::value(
            "remote.failure_threshold",
            "threshold must be non-zero",
        ));
    }
    Ok(())
}

pub fn validate_healing(policy: &HealingPolicy) -> Result<(), PolicyError> {
    if policy.heuristic_timeout_ms == 0 {
        return Err(PolicyError::value(
            "healing.heuristic_timeout_ms",
            "timeout must be greater than zero",
        ));
    }
    if policy.remote_timeout_ms == 0 {
        return Err(PolicyError::value(
            "healing.remote_timeout_ms",
            "timeout must be greater than zero",
        ));
    }
    if policy.remote_retries > MAX_REMOTE_RETRIES {
        return Err(PolicyError::value(
            "healing.remote_retries",
            format!("at most {} retry is allowed", MAX_REMOTE_RETRIES),
        ));
    }
    if policy.remote_cost_per_call < 0.0 {
        return Err(PolicyError::value(
            "healing.remote_cost_per_call",
            "cost cannot be negative",
        ));
    }
    Ok(())
}
