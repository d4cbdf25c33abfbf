//! Error type for the replay engine and its wiring

use std::path::PathBuf;

use action_healer::HealError;
use action_locator::LocatorError;
use soulbrowser_policy_center::PolicyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Heal(#[from] HealError),

    /// Recording file missing or unreadable
    #[error("Failed to read recording {path}: {source}")]
    RecordingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recording content is not a list of steps
    #[error("Invalid recording {path}: {reason}")]
    RecordingFormat { path: PathBuf, reason: String },

    /// Page surface could not serve a snapshot or URL
    #[error("Page error: {0}")]
    Page(String),
}

impl ReplayError {
    pub fn recording_format(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ReplayError::RecordingFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Configuration problems are fatal; everything else is per-step.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ReplayError::Policy(_)
                | ReplayError::Locator(LocatorError::InvalidConfig(_))
                | ReplayError::Heal(HealError::InvalidConfig(_))
        )
    }
}
