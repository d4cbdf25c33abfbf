//! Tiered orchestrator: run a step through its tier sequence, first success wins

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::FutureExt;
use l6_observe::metrics::{self, labels};
use l6_observe::{now_ms, step_span, RunRecord, TelemetrySink, TracingSink};
use soulbrowser_core_types::ActionDescriptor;
use soulbrowser_policy_center::ReplayPolicy;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn, Instrument};

use crate::decision::{DecisionContext, DecisionEngine};
use crate::errors::LocatorError;
use crate::strategies::StrategyRegistry;
use crate::tiers::{TierOverride, TierPlan};
use crate::types::{OrchestrationResult, ResolvedBy, RunReport, TierAttempt};

const DEFAULT_INTER_STEP_PAUSE: Duration = Duration::from_millis(250);

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Sequences strategy providers for each step.
///
/// Owned by whatever drives a run; there is no process-wide instance.
pub struct TieredOrchestrator {
    registry: StrategyRegistry,
    engine: DecisionEngine,
    plan: ArcSwap<TierPlan>,
    inter_step_pause: Duration,
    telemetry: Arc<dyn TelemetrySink>,
}

impl TieredOrchestrator {
    pub fn new(registry: StrategyRegistry, plan: TierPlan) -> Self {
        Self {
            registry,
            engine: DecisionEngine::new(),
            plan: ArcSwap::from_pointee(plan),
            inter_step_pause: DEFAULT_INTER_STEP_PAUSE,
            telemetry: Arc::new(TracingSink),
        }
    }

    pub fn from_policy(
        registry: StrategyRegistry,
        policy: &ReplayPolicy,
    ) -> Result<Self, LocatorError> {
        let plan = TierPlan::from_policy(policy)?;
        Ok(Self::new(registry, plan)
            .with_inter_step_pause(Duration::from_millis(policy.execution.inter_step_pause_ms)))
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_inter_step_pause(mut self, pause: Duration) -> Self {
        self.inter_step_pause = pause;
        self
    }

    /// Current plan. Executions hold the snapshot they started with.
    pub fn plan(&self) -> Arc<TierPlan> {
        self.plan.load_full()
    }

    pub fn inter_step_pause(&self) -> Duration {
        self.inter_step_pause
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Merge overrides onto the current plan and swap it in.
    /// An invalid result leaves the current plan untouched.
    pub fn update_tiers(&self, overrides: &[TierOverride]) -> Result<Arc<TierPlan>, LocatorError> {
        let merged = Arc::new(self.plan.load().merge(overrides)?);
        self.plan.store(merged.clone());
        info!(
            order = ?merged.ordered().iter().map(|p| p.tier.name()).collect::<Vec<_>>(),
            "tier plan updated"
        );
        Ok(merged)
    }

    pub async fn decision_context(&self, action: &ActionDescriptor) -> DecisionContext {
        DecisionContext::for_step(action, self.registry.protocol_available().await)
    }

    pub async fn execute_step(&self, action: &ActionDescriptor) -> OrchestrationResult {
        if action.kind.is_navigation() {
            return self.navigation_result(action);
        }
        let ctx = self.decision_context(action).await;
        self.execute_step_with_context(action, &ctx).await
    }

    /// Execute with a caller-built decision context (e.g. with tiers already
    /// known to have failed for this step).
    pub async fn execute_step_with_context(
        &self,
        action: &ActionDescriptor,
        ctx: &DecisionContext,
    ) -> OrchestrationResult {
        if action.kind.is_navigation() {
            return self.navigation_result(action);
        }
        let span = step_span(&action.id.0, &action.label);
        self.run_tiers(action, ctx).instrument(span).await
    }

    async fn run_tiers(&self, action: &ActionDescriptor, ctx: &DecisionContext) -> OrchestrationResult {
        let started = Instant::now();
        let plan = self.plan.load_full();
        let sequence = self.engine.select_sequence(ctx, &plan);
        debug!(sequence = ?sequence, "tier sequence selected");

        let mut attempts = Vec::with_capacity(sequence.len());
        for tier in sequence {
            if !plan.is_enabled(tier) {
                debug!(%tier, "tier disabled, skipping");
                continue;
            }

            let attempt_started = Instant::now();
            let Some(provider) = self.registry.get(tier) else {
                attempts.push(TierAttempt::failed(
                    tier,
                    0,
                    LocatorError::NoProvider(tier).to_string(),
                ));
                continue;
            };

            let timeout = plan.timeout(tier);
            let execution = AssertUnwindSafe(provider.execute(action)).catch_unwind();
            let attempt = match time::timeout(timeout, execution).await {
                Ok(Ok(Ok(outcome))) => {
                    TierAttempt::from_outcome(tier, elapsed_ms(attempt_started), outcome)
                }
                Ok(Ok(Err(err))) => {
                    TierAttempt::failed(tier, elapsed_ms(attempt_started), err.to_string())
                }
                Ok(Err(payload)) => {
                    let reason = panic_message(payload.as_ref());
                    warn!(%tier, reason = %reason, "strategy provider panicked");
                    TierAttempt::failed(
                        tier,
                        elapsed_ms(attempt_started),
                        LocatorError::strategy(tier, format!("provider panicked: {reason}"))
                            .to_string(),
                    )
                }
                Err(_) => TierAttempt::failed(
                    tier,
                    elapsed_ms(attempt_started),
                    LocatorError::Timeout {
                        tier,
                        timeout_ms: timeout.as_millis() as u64,
                    }
                    .to_string(),
                ),
            };

            let success = if attempt.success { "true" } else { "false" };
            metrics::inc(
                "replay_tier_attempts_total",
                labels([("tier", tier.name()), ("success", success)]),
            );
            metrics::observe(
                "replay_tier_latency_ms",
                attempt.elapsed_ms,
                labels([("tier", tier.name())]),
            );

            if attempt.success {
                debug!(%tier, elapsed_ms = attempt.elapsed_ms, "tier resolved step");
                attempts.push(attempt);
                return OrchestrationResult {
                    step_id: action.id.clone(),
                    step_label: action.label.clone(),
                    success: true,
                    resolved_by: ResolvedBy::Tier(tier),
                    attempts,
                    elapsed_ms: elapsed_ms(started),
                };
            }

            debug!(%tier, error = attempt.error.as_deref().unwrap_or("-"), "tier failed");
            attempts.push(attempt);
        }

        let result = OrchestrationResult {
            step_id: action.id.clone(),
            step_label: action.label.clone(),
            success: false,
            resolved_by: ResolvedBy::Exhausted,
            attempts,
            elapsed_ms: elapsed_ms(started),
        };
        warn!(
            reason = result.failure_reason().as_deref().unwrap_or("-"),
            "all tiers exhausted"
        );
        result
    }

    fn navigation_result(&self, action: &ActionDescriptor) -> OrchestrationResult {
        OrchestrationResult {
            step_id: action.id.clone(),
            step_label: action.label.clone(),
            success: true,
            resolved_by: ResolvedBy::Navigation,
            attempts: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// Run steps one at a time, pausing between them. A failed step never
    /// stops the ones after it.
    pub async fn execute_all(&self, actions: &[ActionDescriptor]) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut results = Vec::with_capacity(actions.len());

        for (index, action) in actions.iter().enumerate() {
            if index > 0 && !self.inter_step_pause.is_zero() {
                time::sleep(self.inter_step_pause).await;
            }
            results.push(self.execute_step(action).await);
        }

        let passed = results.iter().filter(|result| result.success).count();
        let report = RunReport {
            run_id,
            failed: results.len() - passed,
            passed,
            results,
            elapsed_ms: elapsed_ms(started),
        };
        self.telemetry.record_run(RunRecord {
            run_id: report.run_id.clone(),
            total: report.results.len(),
            passed: report.passed,
            failed: report.failed,
            healed: 0,
            elapsed_ms: report.elapsed_ms,
            timestamp_ms: now_ms(),
        });
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::StrategyProvider;
    use crate::types::StrategyOutcome;
    use async_trait::async_trait;
    use l6_observe::MemorySink;
    use soulbrowser_core_types::{ActionKind, ElementHandle, StrategyTier};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        tier: StrategyTier,
        succeed: bool,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(tier: StrategyTier, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                tier,
                succeed,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StrategyProvider for Scripted {
        fn tier(&self) -> StrategyTier {
            self.tier
        }

        async fn execute(&self, _action: &ActionDescriptor) -> Result<StrategyOutcome, LocatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(StrategyOutcome::resolved(ElementHandle::new("el"), 0.9))
            } else {
                Ok(StrategyOutcome::missed("no match"))
            }
        }
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let native = Scripted::new(StrategyTier::NativeQuery, false);
        let vision = Scripted::new(StrategyTier::VisionOcr, true);
        let registry = StrategyRegistry::new()
            .with(native.clone())
            .with(vision.clone());
        let orchestrator = TieredOrchestrator::new(registry, TierPlan::default());

        let result = orchestrator
            .execute_step(&ActionDescriptor::new(ActionKind::Click, "Save"))
            .await;
        assert!(result.success);
        assert_eq!(result.resolved_by, ResolvedBy::Tier(StrategyTier::VisionOcr));
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(native.calls.load(Ordering::SeqCst), 1);
        assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn navigation_short_circuits() {
        let native = Scripted::new(StrategyTier::NativeQuery, true);
        let orchestrator =
            TieredOrchestrator::new(StrategyRegistry::new().with(native.clone()), TierPlan::default());
        let step = ActionDescriptor::new(ActionKind::Open, "Home").with_url("https://example.com");

        let result = orchestrator.execute_step(&step).await;
        assert!(result.success);
        assert_eq!(result.resolved_by, ResolvedBy::Navigation);
        assert!(result.attempts.is_empty());
        assert_eq!(native.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_provider_is_a_failed_attempt() {
        let orchestrator = TieredOrchestrator::new(StrategyRegistry::new(), TierPlan::default());
        let result = orchestrator
            .execute_step(&ActionDescriptor::new(ActionKind::Click, "Save"))
            .await;
        assert!(result.is_exhausted());
        assert_eq!(
            result.attempted_tiers(),
            vec![StrategyTier::NativeQuery, StrategyTier::VisionOcr]
        );
        assert!(result.attempts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("No provider"));
    }

    #[tokio::test]
    async fn invalid_update_keeps_plan() {
        let orchestrator = TieredOrchestrator::new(StrategyRegistry::new(), TierPlan::default());
        let before = orchestrator.plan();
        let err = orchestrator
            .update_tiers(&[TierOverride::new(StrategyTier::ManualCoordinate).priority(0)])
            .unwrap_err();
        assert!(matches!(err, LocatorError::InvalidConfig(_)));
        assert_eq!(*orchestrator.plan(), *before);

        let updated = orchestrator
            .update_tiers(&[TierOverride::new(StrategyTier::VisionOcr).enabled(false)])
            .unwrap();
        assert!(!updated.is_enabled(StrategyTier::VisionOcr));
        assert!(!orchestrator.plan().is_enabled(StrategyTier::VisionOcr));
    }

    #[tokio::test(start_paused = true)]
    async fn execute_all_emits_run_record() {
        let sink = Arc::new(MemorySink::default());
        let registry = StrategyRegistry::new().with(Scripted::new(StrategyTier::NativeQuery, true));
        let orchestrator = TieredOrchestrator::new(registry, TierPlan::default())
            .with_telemetry(sink.clone());
        let steps = vec![
            ActionDescriptor::new(ActionKind::Click, "One"),
            ActionDescriptor::new(ActionKind::Click, "Two"),
        ];

        let report = orchestrator.execute_all(&steps).await;
        assert!(report.all_passed());
        assert!(report.elapsed_ms >= 250);
        let runs = sink.run_records();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].total, 2);
        assert_eq!(runs[0].passed, 2);
    }
}
