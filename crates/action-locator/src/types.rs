//! Core types for tiered resolution

use serde::{Deserialize, Serialize};
use soulbrowser_core_types::{ElementHandle, StepId, StrategyTier};

/// What a strategy provider reports for one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub success: bool,
    pub confidence: Option<f64>,
    pub element: Option<ElementHandle>,
    pub error: Option<String>,
}

impl StrategyOutcome {
    /// Element located and the action performed on it
    pub fn resolved(element: ElementHandle, confidence: f64) -> Self {
        Self {
            success: true,
            confidence: Some(confidence),
            element: Some(element),
            error: None,
        }
    }

    /// Strategy ran but did not find (or could not act on) the element
    pub fn missed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            confidence: None,
            element: None,
            error: Some(reason.into()),
        }
    }
}

/// Record of one tier attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: StrategyTier,
    pub success: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    pub confidence: Option<f64>,
    pub element: Option<ElementHandle>,
}

impl TierAttempt {
    pub(crate) fn from_outcome(tier: StrategyTier, elapsed_ms: u64, outcome: StrategyOutcome) -> Self {
        Self {
            tier,
            success: outcome.success,
            elapsed_ms,
            error: outcome.error,
            confidence: outcome.confidence,
            element: outcome.element,
        }
    }

    pub(crate) fn failed(tier: StrategyTier, elapsed_ms: u64, error: impl Into<String>) -> Self {
        Self {
            tier,
            success: false,
            elapsed_ms,
            error: Some(error.into()),
            confidence: None,
            element: None,
        }
    }
}

/// How a step ended up being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "tier", rename_all = "snake_case")]
pub enum ResolvedBy {
    /// A tier succeeded
    Tier(StrategyTier),
    /// Navigation steps are performed, not resolved
    Navigation,
    /// Every tier in the sequence failed
    Exhausted,
}

/// Result of executing one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub step_id: StepId,
    pub step_label: String,
    pub success: bool,
    pub resolved_by: ResolvedBy,
    pub attempts: Vec<TierAttempt>,
    pub elapsed_ms: u64,
}

impl OrchestrationResult {
    /// Tier reported to callers expecting the legacy shape: exhausted runs
    /// report the nominal last resort without claiming it succeeded.
    pub fn used_tier(&self) -> Option<StrategyTier> {
        match self.resolved_by {
            ResolvedBy::Tier(tier) => Some(tier),
            ResolvedBy::Exhausted => Some(StrategyTier::ManualCoordinate),
            ResolvedBy::Navigation => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.resolved_by, ResolvedBy::Exhausted)
    }

    pub fn attempted_tiers(&self) -> Vec<StrategyTier> {
        self.attempts.iter().map(|attempt| attempt.tier).collect()
    }

    pub fn winning_attempt(&self) -> Option<&TierAttempt> {
        self.attempts.iter().find(|attempt| attempt.success)
    }

    /// Human-readable reason for a failed step.
    pub fn failure_reason(&self) -> Option<String> {
        if self.success {
            return None;
        }
        if self.attempts.is_empty() {
            return Some("no enabled tier was attempted".to_string());
        }
        Some(
            self.attempts
                .iter()
                .map(|attempt| {
                    format!(
                        "{}: {}",
                        attempt.tier,
                        attempt.error.as_deref().unwrap_or("not found")
                    )
                })
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Aggregate of a sequential run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub results: Vec<OrchestrationResult>,
    pub passed: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
