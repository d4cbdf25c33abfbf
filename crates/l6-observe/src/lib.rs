//! Observability for the replay engine.
//!
//! Tracing setup and telemetry sinks, plus process-local metrics.

pub mod metrics;
pub mod telemetry;
pub mod tracing;

pub use telemetry::{
    now_ms, FanoutSink, HealingRecord, MemorySink, RunRecord, TelemetrySink, TracingSink,
};
pub use crate::tracing::{init_tracing, step_span, LogFormat};
