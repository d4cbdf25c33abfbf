//! Validated, priority-ordered tier configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use soulbrowser_core_types::StrategyTier;
use soulbrowser_policy_center::{default_policy, validate_tiers, ReplayPolicy, TierPolicy};

use crate::errors::LocatorError;

/// Partial override for one tier; unset fields keep the current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierOverride {
    pub tier: StrategyTier,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub priority: Option<u32>,
}

impl TierOverride {
    pub fn new(tier: StrategyTier) -> Self {
        Self {
            tier,
            enabled: None,
            timeout_ms: None,
            priority: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Immutable tier plan, always sorted ascending by priority.
///
/// Construction and [`TierPlan::merge`] both validate, so a plan that exists
/// never schedules manual-coordinate ahead of another tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierPlan {
    tiers: Vec<TierPolicy>,
}

impl TierPlan {
    pub fn new(tiers: Vec<TierPolicy>) -> Result<Self, LocatorError> {
        validate_tiers(&tiers)?;
        let mut plan = Self { tiers };
        plan.sort();
        Ok(plan)
    }

    pub fn from_policy(policy: &ReplayPolicy) -> Result<Self, LocatorError> {
        Self::new(policy.tier_policies())
    }

    /// Apply overrides onto this plan and return the re-validated result.
    pub fn merge(&self, overrides: &[TierOverride]) -> Result<TierPlan, LocatorError> {
        let mut tiers = self.tiers.clone();
        for change in overrides {
            let policy = tiers
                .iter_mut()
                .find(|policy| policy.tier == change.tier)
                .ok_or(LocatorError::NoProvider(change.tier))?;
            if let Some(enabled) = change.enabled {
                policy.enabled = enabled;
            }
            if let Some(timeout_ms) = change.timeout_ms {
                policy.timeout_ms = timeout_ms;
            }
            if let Some(priority) = change.priority {
                policy.priority = priority;
            }
        }
        TierPlan::new(tiers)
    }

    fn sort(&mut self) {
        self.tiers
            .sort_by_key(|policy| (policy.priority, policy.tier));
    }

    /// Tiers in execution order, disabled ones included.
    pub fn ordered(&self) -> &[TierPolicy] {
        &self.tiers
    }

    pub fn get(&self, tier: StrategyTier) -> Option<&TierPolicy> {
        self.tiers.iter().find(|policy| policy.tier == tier)
    }

    pub fn priority(&self, tier: StrategyTier) -> u32 {
        self.get(tier).map(|policy| policy.priority).unwrap_or(u32::MAX)
    }

    pub fn is_enabled(&self, tier: StrategyTier) -> bool {
        self.get(tier).map(|policy| policy.enabled).unwrap_or(false)
    }

    pub fn timeout(&self, tier: StrategyTier) -> Duration {
        self.get(tier)
            .map(TierPolicy::timeout)
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for TierPlan {
    fn default() -> Self {
        let mut plan = Self {
            tiers: default_policy().tier_policies(),
        };
        plan.sort();
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(plan: &TierPlan) -> Vec<StrategyTier> {
        plan.ordered().iter().map(|policy| policy.tier).collect()
    }

    #[test]
    fn default_plan_is_reliability_first() {
        let plan = TierPlan::default();
        assert_eq!(order(&plan), StrategyTier::all().to_vec());
        assert_eq!(plan.timeout(StrategyTier::VisionOcr), Duration::from_secs(10));
    }

    #[test]
    fn merge_resorts_by_priority() {
        let plan = TierPlan::default()
            .merge(&[TierOverride::new(StrategyTier::ProtocolLevel).priority(5)])
            .unwrap();
        assert_eq!(
            order(&plan),
            vec![
                StrategyTier::ProtocolLevel,
                StrategyTier::NativeQuery,
                StrategyTier::VisionOcr,
                StrategyTier::ManualCoordinate,
            ]
        );
    }

    #[test]
    fn merge_rejects_manual_before_vision() {
        let err = TierPlan::default()
            .merge(&[TierOverride::new(StrategyTier::ManualCoordinate).priority(1)])
            .unwrap_err();
        assert!(matches!(err, LocatorError::InvalidConfig(_)));

        // Pushing vision past manual is the same violation.
        let err = TierPlan::default()
            .merge(&[TierOverride::new(StrategyTier::VisionOcr).priority(99)])
            .unwrap_err();
        assert!(matches!(err, LocatorError::InvalidConfig(_)));
    }

    #[test]
    fn manual_is_last_for_every_accepted_override() {
        for priority in 0..60 {
            for tier in StrategyTier::all() {
                let merged =
                    TierPlan::default().merge(&[TierOverride::new(tier).priority(priority)]);
                if let Ok(plan) = merged {
                    assert_eq!(
                        plan.ordered().last().map(|policy| policy.tier),
                        Some(StrategyTier::ManualCoordinate),
                        "override {tier}={priority} reordered manual"
                    );
                }
            }
        }
    }

    #[test]
    fn disable_keeps_position() {
        let plan = TierPlan::default()
            .merge(&[TierOverride::new(StrategyTier::NativeQuery).enabled(false)])
            .unwrap();
        assert!(!plan.is_enabled(StrategyTier::NativeQuery));
        assert_eq!(order(&plan)[0], StrategyTier::NativeQuery);
    }
}
