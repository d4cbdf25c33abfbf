//! Healing-aware replay session
//!
//! Steps run one at a time. A step whose tiers are all exhausted is handed
//! to the healer; an applied heal re-runs the step with the healed locator
//! first and reports back whether it worked. A failed step never stops the
//! steps after it.

use std::sync::Arc;

use action_healer::{HealingRequest, HealingResponse, PageContext, Snapshot};
use action_locator::OrchestrationResult;
use async_trait::async_trait;
use l6_observe::{now_ms, RunRecord};
use serde::Serialize;
use soulbrowser_core_types::{ActionDescriptor, HealingAnnotation, SessionId, StepId};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::engine::ReplayEngine;
use crate::errors::ReplayError;

/// The live page a session replays against.
#[async_trait]
pub trait PageSurface: Send + Sync {
    async fn current_url(&self) -> Result<String, ReplayError>;

    /// Screenshot handed to the healing providers.
    async fn snapshot(&self) -> Result<Snapshot, ReplayError>;

    async fn title(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Healed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step_id: StepId,
    pub step_label: String,
    pub outcome: StepOutcome,
    pub resolution: OrchestrationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healing: Option<HealingResponse>,
    /// The healed copy of the step, when a heal was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<ActionDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<OrchestrationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    fn new(step: &ActionDescriptor, resolution: OrchestrationResult) -> Self {
        let outcome = if resolution.success {
            StepOutcome::Passed
        } else {
            StepOutcome::Failed
        };
        Self {
            step_id: step.id.clone(),
            step_label: step.label.clone(),
            outcome,
            resolution,
            healing: None,
            applied: None,
            retry: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome != StepOutcome::Failed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub run_id: String,
    pub session_id: SessionId,
    pub steps: Vec<StepReport>,
    pub passed: usize,
    pub healed: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl ReplayReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

pub struct ReplaySession {
    engine: ReplayEngine,
    page: Arc<dyn PageSurface>,
    session_id: SessionId,
}

impl ReplaySession {
    pub fn new(engine: ReplayEngine, page: Arc<dyn PageSurface>) -> Self {
        Self {
            engine,
            page,
            session_id: SessionId::new(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn run(&self, steps: &[ActionDescriptor]) -> ReplayReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        let pause = self.engine.orchestrator().inter_step_pause();
        self.engine.healer().reset_run();
        info!(run = %run_id, session = %self.session_id, steps = steps.len(), "replay started");

        let mut reports = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            if index > 0 && !pause.is_zero() {
                time::sleep(pause).await;
            }
            reports.push(self.run_step(step).await);
        }

        if let Err(err) = self.engine.healer().persist_cache() {
            warn!(error = %err, "failed to persist healing cache");
        }

        let count = |outcome: StepOutcome| {
            reports
                .iter()
                .filter(|report| report.outcome == outcome)
                .count()
        };
        let report = ReplayReport {
            run_id,
            session_id: self.session_id.clone(),
            passed: count(StepOutcome::Passed),
            healed: count(StepOutcome::Healed),
            failed: count(StepOutcome::Failed),
            steps: reports,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.engine.telemetry().record_run(RunRecord {
            run_id: report.run_id.clone(),
            total: report.steps.len(),
            passed: report.passed + report.healed,
            failed: report.failed,
            healed: report.healed,
            elapsed_ms: report.elapsed_ms,
            timestamp_ms: now_ms(),
        });
        report
    }

    pub async fn run_step(&self, step: &ActionDescriptor) -> StepReport {
        let orchestrator = self.engine.orchestrator();
        let resolution = orchestrator.execute_step(step).await;
        let mut report = StepReport::new(step, resolution);
        if report.resolution.success {
            return report;
        }
        report.error = report.resolution.failure_reason();
        if !self.engine.policy().execution.heal_on_failure {
            return report;
        }

        let (url, snapshot) = match self.capture().await {
            Ok(captured) => captured,
            Err(err) => {
                warn!(step = %step.id, error = %err, "cannot capture page for healing");
                report.error = Some(err.to_string());
                return report;
            }
        };
        let page = PageContext {
            url: url.clone(),
            title: self.page.title().await,
        };
        let request = HealingRequest::new(step.clone(), snapshot, page)
            .with_session(self.session_id.clone());
        let healing = self.engine.healer().heal(&request).await;

        let healed_locator = match (&healing.suggested_locator, healing.action.applies()) {
            (Some(locator), true) if healing.success => locator.clone(),
            _ => {
                debug!(step = %step.id, action = %healing.action, "heal not applied");
                report.healing = Some(healing);
                return report;
            }
        };

        let annotation = HealingAnnotation {
            original: step.primary_locator().cloned(),
            healed: healed_locator.clone(),
            provider: healing
                .provider
                .map(|provider| provider.name().to_string())
                .unwrap_or_default(),
            confidence: healing.confidence,
            action: healing.action.name().to_string(),
            recorded_at_ms: now_ms(),
        };
        let healed_step = step.healed_with(annotation);
        let retry = orchestrator.execute_step(&healed_step).await;
        self.engine
            .healer()
            .record_result(step, &url, &healed_locator, retry.success);

        if retry.success {
            info!(step = %step.id, locator = %healed_locator, "step healed");
            report.outcome = StepOutcome::Healed;
            report.error = None;
        } else {
            warn!(step = %step.id, locator = %healed_locator, "healed locator did not resolve");
            report.error = retry.failure_reason();
        }
        report.healing = Some(healing);
        report.applied = Some(healed_step);
        report.retry = Some(retry);
        report
    }

    async fn capture(&self) -> Result<(String, Snapshot), ReplayError> {
        let url = self.page.current_url().await?;
        let snapshot = self.page.snapshot().await?;
        Ok((url, snapshot))
    }
}
