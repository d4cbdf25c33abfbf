//! SoulBrowser replay
//!
//! Replays recorded browser steps with tiered element resolution and heals
//! steps whose recorded locator no longer resolves. [`ReplayEngine`] wires
//! the orchestrator and healer from one policy; [`ReplaySession`] drives a
//! run against a [`PageSurface`].

pub mod cli;
pub mod engine;
pub mod errors;
pub mod recording;
pub mod replay;

pub use engine::{EngineBuilder, ReplayEngine};
pub use errors::ReplayError;
pub use recording::{FileRecording, RecordingSource};
pub use replay::{PageSurface, ReplayReport, ReplaySession, StepOutcome, StepReport};
