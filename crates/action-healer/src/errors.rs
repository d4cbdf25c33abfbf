//! Error types for self-healing

use soulbrowser_policy_center::PolicyError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum HealError {
    /// Thresholds, cache bounds or guard limits rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] PolicyError),

    /// Analyzer reported an error
    #[error("Provider '{provider}' failed: {reason}")]
    Provider { provider: String, reason: String },

    /// Analyzer did not answer within its timeout
    #[error("Provider '{provider}' timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    /// Remote endpoint answered with a non-success status
    #[error("Remote analysis returned {status}: {body}")]
    Http { status: u16, body: String },

    /// Request never reached the endpoint
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("Malformed analysis response: {0}")]
    Decode(String),

    /// Reading or writing the cache file failed
    #[error("Cache persistence failed: {0}")]
    Persist(String),
}

impl HealError {
    pub fn provider(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        HealError::Provider {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Whether a single retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            HealError::Timeout { .. } | HealError::Transport(_) => true,
            HealError::Http { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            HealError::InvalidConfig(_) => 3,
            HealError::Persist(_) => 2,
            HealError::Http { .. } | HealError::Transport(_) | HealError::Timeout { .. } => 1,
            HealError::Provider { .. } | HealError::Decode(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        for status in [408, 429, 500, 503] {
            assert!(HealError::Http {
                status,
                body: String::new()
            }
            .is_transient());
        }
        for status in [400, 401, 404] {
            assert!(!HealError::Http {
                status,
                body: String::new()
            }
            .is_transient());
        }
        assert!(HealError::Transport("reset".into()).is_transient());
        assert!(!HealError::Decode("eof".into()).is_transient());
    }
}
