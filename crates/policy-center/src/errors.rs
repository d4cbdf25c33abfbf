use soulbrowser_core_types::SoulError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    #[error("invalid policy: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid value for '{path}': {reason}")]
    InvalidValue { path: String, reason: String },
    #[error("confidence thresholds out of order: auto_apply={auto_apply} apply_flag={apply_flag} minimum={minimum}")]
    ThresholdOrder {
        auto_apply: f64,
        apply_flag: f64,
        minimum: f64,
    },
    #[error("manual_coordinate priority {manual} must be greater than {other} priority {priority}")]
    ManualTierOrder {
        manual: u32,
        other: String,
        priority: u32,
    },
}

impl PolicyError {
    pub(crate) fn value(path: &str, reason: impl Into<String>) -> Self {
        PolicyError::InvalidValue {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<PolicyError> for SoulError {
    fn from(value: PolicyError) -> Self {
        SoulError::new(value.to_string())
    }
}
