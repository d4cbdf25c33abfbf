//! Telemetry records emitted by the replay engine.
//!
//! The engine only produces records; where they end up is decided by the
//! [`TelemetrySink`] the host process injects.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::metrics::{self, labels};

const DEFAULT_MEMORY_CAPACITY: usize = 200;

/// One record per healing attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealingRecord {
    pub session_id: String,
    pub step_id: String,
    pub step_label: String,
    pub original_locator: Option<String>,
    pub healed_locator: Option<String>,
    pub provider: Option<String>,
    pub success: bool,
    pub confidence: f64,
    pub action: String,
    pub duration_ms: u64,
    pub cache_hit: bool,
    pub estimated_cost: f64,
    pub timestamp_ms: i64,
}

/// One record per orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub healed: usize,
    pub elapsed_ms: u64,
    pub timestamp_ms: i64,
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub trait TelemetrySink: Send + Sync {
    fn record_healing(&self, record: HealingRecord);

    fn record_run(&self, record: RunRecord);
}

/// Emits records as structured `tracing` events and feeds the metrics registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record_healing(&self, record: HealingRecord) {
        let provider = record.provider.as_deref().unwrap_or("none");
        let success = if record.success { "true" } else { "false" };
        metrics::inc(
            "replay_heal_attempts_total",
            labels([("provider", provider), ("success", success)]),
        );
        metrics::observe(
            "replay_heal_latency_ms",
            record.duration_ms,
            labels([("provider", provider)]),
        );
        if record.cache_hit {
            metrics::inc("replay_heal_cache_hits_total", labels([]));
        }
        info!(
            target: "telemetry",
            kind = "healing",
            session = %record.session_id,
            step = %record.step_id,
            label = %record.step_label,
            original = record.original_locator.as_deref().unwrap_or("-"),
            healed = record.healed_locator.as_deref().unwrap_or("-"),
            provider,
            success = record.success,
            confidence = record.confidence,
            action = %record.action,
            duration_ms = record.duration_ms,
            cache_hit = record.cache_hit,
            estimated_cost = record.estimated_cost,
            "healing attempt"
        );
    }

    fn record_run(&self, record: RunRecord) {
        metrics::add("replay_steps_passed_total", record.passed as u64, labels([]));
        metrics::add("replay_steps_failed_total", record.failed as u64, labels([]));
        info!(
            target: "telemetry",
            kind = "run",
            run = %record.run_id,
            total = record.total,
            passed = record.passed,
            failed = record.failed,
            healed = record.healed,
            elapsed_ms = record.elapsed_ms,
            "orchestration run"
        );
    }
}

/// Bounded in-memory sink keeping the most recent records.
pub struct MemorySink {
    capacity: usize,
    healing: Mutex<VecDeque<HealingRecord>>,
    runs: Mutex<VecDeque<RunRecord>>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            healing: Mutex::new(VecDeque::new()),
            runs: Mutex::new(VecDeque::new()),
        }
    }

    pub fn healing_records(&self) -> Vec<HealingRecord> {
        self.healing.lock().iter().cloned().collect()
    }

    pub fn run_records(&self) -> Vec<RunRecord> {
        self.runs.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.healing.lock().clear();
        self.runs.lock().clear();
    }

    fn push<T>(capacity: usize, queue: &Mutex<VecDeque<T>>, item: T) {
        let mut guard = queue.lock();
        guard.push_back(item);
        while guard.len() > capacity {
            guard.pop_front();
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

impl TelemetrySink for MemorySink {
    fn record_healing(&self, record: HealingRecord) {
        Self::push(self.capacity, &self.healing, record);
    }

    fn record_run(&self, record: RunRecord) {
        Self::push(self.capacity, &self.runs, record);
    }
}

/// Forwards every record to each inner sink.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl TelemetrySink for FanoutSink {
    fn record_healing(&self, record: HealingRecord) {
        for sink in &self.sinks {
            sink.record_healing(record.clone());
        }
    }

    fn record_run(&self, record: RunRecord) {
        for sink in &self.sinks {
            sink.record_run(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healing(step: &str) -> HealingRecord {
        HealingRecord {
            session_id: "s-1".into(),
            step_id: step.into(),
            step_label: "Submit".into(),
            original_locator: Some("css:#submit-123".into()),
            healed_locator: Some("css:button[type=submit]".into()),
            provider: Some("cache".into()),
            success: true,
            confidence: 0.9,
            action: "auto_apply".into(),
            duration_ms: 4,
            cache_hit: true,
            estimated_cost: 0.0,
            timestamp_ms: now_ms(),
        }
    }

    #[test]
    fn memory_sink_is_bounded() {
        let sink = MemorySink::new(2);
        sink.record_healing(healing("a"));
        sink.record_healing(healing("b"));
        sink.record_healing(healing("c"));
        let steps: Vec<_> = sink
            .healing_records()
            .into_iter()
            .map(|record| record.step_id)
            .collect();
        assert_eq!(steps, vec!["b", "c"]);
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = Arc::new(MemorySink::default());
        let second = Arc::new(MemorySink::default());
        let fanout = FanoutSink::new()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(TracingSink));

        fanout.record_run(RunRecord {
            run_id: "run-1".into(),
            total: 5,
            passed: 4,
            failed: 1,
            healed: 0,
            elapsed_ms: 10,
            timestamp_ms: now_ms(),
        });
        fanout.record_healing(healing("a"));

        assert_eq!(first.run_records().len(), 1);
        assert_eq!(second.healing_records().len(), 1);
    }
}
