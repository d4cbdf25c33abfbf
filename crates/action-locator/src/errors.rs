//! Error types for the locator system

use soulbrowser_core_types::StrategyTier;
use soulbrowser_policy_center::PolicyError;
use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Tier plan or override rejected before execution
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] PolicyError),

    /// Strategy provider reported an error
    #[error("Strategy '{tier}' failed: {reason}")]
    StrategyFailed { tier: StrategyTier, reason: String },

    /// Provider did not answer within the tier timeout
    #[error("Strategy '{tier}' timed out after {timeout_ms}ms")]
    Timeout { tier: StrategyTier, timeout_ms: u64 },

    /// No provider registered for a tier in the sequence
    #[error("No provider registered for tier '{0}'")]
    NoProvider(StrategyTier),

    /// Step is missing what the strategy needs (selector, coordinates, ...)
    #[error("Invalid step: {0}")]
    InvalidStep(String),

    /// Remote-debugging-protocol transport error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    pub fn strategy(tier: StrategyTier, reason: impl Into<String>) -> Self {
        LocatorError::StrategyFailed {
            tier,
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocatorError::Timeout { .. } | LocatorError::Protocol(_))
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::InvalidConfig(_) | LocatorError::Internal(_) => 3,
            LocatorError::Protocol(_) | LocatorError::Timeout { .. } => 2,
            LocatorError::StrategyFailed { .. } | LocatorError::NoProvider(_) => 1,
            LocatorError::InvalidStep(_) => 0,
        }
    }
}
