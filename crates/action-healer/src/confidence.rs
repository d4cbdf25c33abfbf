//! Confidence score to heal action mapping

use soulbrowser_policy_center::{validate_confidence, ConfidencePolicy};

use crate::errors::HealError;
use crate::types::HealAction;

/// Validated thresholds; `auto_apply >= apply_flag >= minimum` always holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceThresholds {
    auto_apply: f64,
    apply_flag: f64,
    minimum: f64,
}

impl ConfidenceThresholds {
    pub fn new(auto_apply: f64, apply_flag: f64, minimum: f64) -> Result<Self, HealError> {
        validate_confidence(&ConfidencePolicy {
            auto_apply,
            apply_flag,
            minimum,
        })?;
        Ok(Self {
            auto_apply,
            apply_flag,
            minimum,
        })
    }

    pub fn from_policy(policy: &ConfidencePolicy) -> Result<Self, HealError> {
        Self::new(policy.auto_apply, policy.apply_flag, policy.minimum)
    }

    pub fn auto_apply(&self) -> f64 {
        self.auto_apply
    }

    pub fn apply_flag(&self) -> f64 {
        self.apply_flag
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// A score that is not a number never clears any threshold.
    pub fn decide(&self, score: f64) -> HealAction {
        if score.is_nan() {
            HealAction::NoAction
        } else if score >= self.auto_apply {
            HealAction::AutoApply
        } else if score >= self.apply_flag {
            HealAction::ApplyAndFlag
        } else if score >= self.minimum {
            HealAction::SuggestOnly
        } else {
            HealAction::NoAction
        }
    }

    pub fn meets_minimum(&self, score: f64) -> bool {
        !score.is_nan() && score >= self.minimum
    }
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        let policy = ConfidencePolicy::default();
        Self {
            auto_apply: policy.auto_apply,
            apply_flag: policy.apply_flag,
            minimum: policy.minimum,
        }
    }
}
