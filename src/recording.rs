//! Loading recorded steps

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use soulbrowser_core_types::ActionDescriptor;
use tracing::debug;

use crate::errors::ReplayError;

/// Anything that can hand the engine an ordered list of steps.
pub trait RecordingSource {
    fn load(&self) -> Result<Vec<ActionDescriptor>, ReplayError>;
}

/// A recording accepts either a bare list of steps or `{ steps: [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordingDocument {
    Steps(Vec<ActionDescriptor>),
    Wrapped { steps: Vec<ActionDescriptor> },
}

impl RecordingDocument {
    fn into_steps(self) -> Vec<ActionDescriptor> {
        match self {
            RecordingDocument::Steps(steps) | RecordingDocument::Wrapped { steps } => steps,
        }
    }
}

/// JSON or YAML recording on disk, picked by extension (`.yaml`/`.yml`
/// read as YAML, anything else as JSON).
#[derive(Debug, Clone)]
pub struct FileRecording {
    path: PathBuf,
}

impl FileRecording {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_yaml(&self) -> bool {
        matches!(
            self.path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase())
                .as_deref(),
            Some("yaml") | Some("yml")
        )
    }
}

impl RecordingSource for FileRecording {
    fn load(&self) -> Result<Vec<ActionDescriptor>, ReplayError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| ReplayError::RecordingIo {
            path: self.path.clone(),
            source,
        })?;
        let document: RecordingDocument = if self.is_yaml() {
            serde_yaml::from_str(&raw)
                .map_err(|err| ReplayError::recording_format(&self.path, err))?
        } else {
            serde_json::from_str(&raw)
                .map_err(|err| ReplayError::recording_format(&self.path, err))?
        };
        let steps = document.into_steps();
        debug!(path = %self.path.display(), steps = steps.len(), "recording loaded");
        Ok(steps)
    }
}

impl RecordingSource for Vec<ActionDescriptor> {
    fn load(&self) -> Result<Vec<ActionDescriptor>, ReplayError> {
        Ok(self.clone())
    }
}
