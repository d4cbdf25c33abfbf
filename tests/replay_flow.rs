use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use action_healer::{
    AnalysisQuery, AnalysisResult, CacheKey, HealAction, HealError, HealingProviderKind,
    LocalAnalyzer, RemoteAnalyzer, Snapshot,
};
use action_locator::{LocatorError, StrategyOutcome, StrategyProvider};
use async_trait::async_trait;
use l6_observe::MemorySink;
use soulbrowser_core_types::{ActionDescriptor, ActionKind, ElementHandle, LocatorHint, StrategyTier};
use soulbrowser_policy_center::{default_policy, ReplayPolicy};
use soulbrowser_replay::{PageSurface, ReplayEngine, ReplayError, StepOutcome};

const PAGE_URL: &str = "https://shop.example.com/cart/42?ref=mail";

/// Native query that only finds elements matching the live page's selectors.
struct LivePage {
    selectors: Vec<&'static str>,
    calls: AtomicUsize,
}

impl LivePage {
    fn new(selectors: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            selectors: selectors.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl StrategyProvider for LivePage {
    fn tier(&self) -> StrategyTier {
        StrategyTier::NativeQuery
    }

    async fn execute(&self, action: &ActionDescriptor) -> Result<StrategyOutcome, LocatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match action.primary_locator() {
            Some(LocatorHint::Selector { selector })
                if self.selectors.contains(&selector.as_str()) =>
            {
                Ok(StrategyOutcome::resolved(ElementHandle::new(selector.clone()), 1.0))
            }
            _ => Ok(StrategyOutcome::missed("no element matches")),
        }
    }
}

struct Suggests {
    locator: &'static str,
    confidence: f64,
    calls: AtomicUsize,
}

impl Suggests {
    fn new(locator: &'static str, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            locator,
            confidence,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self) -> AnalysisResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        AnalysisResult::found(
            LocatorHint::selector(self.locator),
            self.confidence,
            "matched by label",
        )
    }
}

#[async_trait]
impl LocalAnalyzer for Suggests {
    async fn analyze(&self, _: &Snapshot, _: &AnalysisQuery) -> Result<AnalysisResult, HealError> {
        Ok(self.answer())
    }
}

#[async_trait]
impl RemoteAnalyzer for Suggests {
    async fn analyze(&self, _: &Snapshot, _: &AnalysisQuery) -> Result<AnalysisResult, HealError> {
        Ok(self.answer())
    }
}

struct FakePage {
    broken: bool,
}

#[async_trait]
impl PageSurface for FakePage {
    async fn current_url(&self) -> Result<String, ReplayError> {
        if self.broken {
            return Err(ReplayError::Page("target closed".into()));
        }
        Ok(PAGE_URL.to_string())
    }

    async fn snapshot(&self) -> Result<Snapshot, ReplayError> {
        Ok(Snapshot::png(vec![0x89, 0x50, 0x4e, 0x47], 1280, 720))
    }
}

fn policy() -> ReplayPolicy {
    let mut policy = default_policy();
    policy.execution.inter_step_pause_ms = 0;
    policy
}

fn page() -> Arc<dyn PageSurface> {
    Arc::new(FakePage { broken: false })
}

fn click(id: &str, selector: &str) -> ActionDescriptor {
    ActionDescriptor::new(ActionKind::Click, format!("Click {id}"))
        .with_id(id)
        .with_hint(LocatorHint::selector(selector))
}

fn recording() -> Vec<ActionDescriptor> {
    vec![
        ActionDescriptor::new(ActionKind::Navigate, "Open cart")
            .with_id("open")
            .with_url(PAGE_URL),
        click("qty", "#qty"),
        click("checkout", "#checkout-8f3a2c"),
    ]
}

#[tokio::test]
async fn confident_heal_is_applied_and_step_reexecuted() {
    let live = LivePage::new(&["#qty", "button[data-testid=checkout]"]);
    let heuristic = Suggests::new("button[data-testid=checkout]", 0.92);
    let telemetry = Arc::new(MemorySink::default());
    let engine = ReplayEngine::builder(policy())
        .strategy(live.clone())
        .local_analyzer(heuristic.clone())
        .telemetry(telemetry.clone())
        .build()
        .unwrap();

    let steps = recording();
    let report = engine.session(page()).run(&steps).await;

    assert!(report.all_passed());
    assert_eq!((report.passed, report.healed, report.failed), (2, 1, 0));
    let healed = &report.steps[2];
    assert_eq!(healed.outcome, StepOutcome::Healed);
    assert_eq!(healed.healing.as_ref().unwrap().action, HealAction::AutoApply);

    let applied = healed.applied.as_ref().unwrap();
    assert_eq!(
        applied.primary_locator(),
        Some(&LocatorHint::selector("button[data-testid=checkout]"))
    );
    let annotation = applied.annotations.last().unwrap();
    assert_eq!(annotation.original, Some(LocatorHint::selector("#checkout-8f3a2c")));
    assert_eq!(annotation.provider, "local_heuristic");
    assert!(healed.retry.as_ref().unwrap().success);
    // The recorded step itself is untouched.
    assert_eq!(steps[2].primary_locator(), Some(&LocatorHint::selector("#checkout-8f3a2c")));
    assert!(steps[2].annotations.is_empty());

    assert_eq!(heuristic.calls(), 1);
    let runs = telemetry.run_records();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].healed, 1);
    assert_eq!(runs[0].failed, 0);
    assert_eq!(telemetry.healing_records().len(), 1);
}

#[tokio::test]
async fn weak_suggestion_is_reported_but_not_applied() {
    let live = LivePage::new(&["#qty", "button.checkout"]);
    let engine = ReplayEngine::builder(policy())
        .strategy(live.clone())
        .local_analyzer(Suggests::new("button.checkout", 0.45))
        .build()
        .unwrap();

    let report = engine.session(page()).run(&recording()).await;

    assert_eq!(report.failed, 1);
    let step = &report.steps[2];
    assert_eq!(step.outcome, StepOutcome::Failed);
    let healing = step.healing.as_ref().unwrap();
    assert!(healing.success);
    assert_eq!(healing.action, HealAction::SuggestOnly);
    assert!(step.applied.is_none());
    assert!(step.retry.is_none());
    // qty once, checkout once, no re-execution
    assert_eq!(live.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn healing_can_be_switched_off() {
    let mut policy = policy();
    policy.execution.heal_on_failure = false;
    let heuristic = Suggests::new("button.checkout", 0.95);
    let engine = ReplayEngine::builder(policy)
        .strategy(LivePage::new(&["#qty"]))
        .local_analyzer(heuristic.clone())
        .build()
        .unwrap();

    let report = engine.session(page()).run(&recording()).await;

    assert_eq!((report.passed, report.healed, report.failed), (2, 0, 1));
    assert!(report.steps[2].healing.is_none());
    assert!(report.steps[2].error.as_deref().unwrap().contains("native_query"));
    assert_eq!(heuristic.calls(), 0);
}

#[tokio::test]
async fn remote_heal_is_cached_and_reused_next_run() {
    let mut policy = policy();
    policy.healing.heuristic_enabled = false;
    let remote = Suggests::new("button[data-testid=checkout]", 0.9);
    let engine = ReplayEngine::builder(policy)
        .strategy(LivePage::new(&["#qty", "button[data-testid=checkout]"]))
        .remote_analyzer(remote.clone())
        .build()
        .unwrap();

    let first = engine.session(page()).run(&recording()).await;
    assert_eq!(first.healed, 1);
    let healing = first.steps[2].healing.as_ref().unwrap();
    assert_eq!(healing.provider, Some(HealingProviderKind::RemoteVision));
    assert!(healing.estimated_cost > 0.0);

    let key = CacheKey::for_step(&recording()[2], PAGE_URL);
    let entry = engine.healer().cache().peek(&key).unwrap();
    assert_eq!(entry.success_count, 1);
    assert_eq!(entry.provider, HealingProviderKind::RemoteVision);

    let second = engine.session(page()).run(&recording()).await;
    assert_eq!(second.healed, 1);
    let healing = second.steps[2].healing.as_ref().unwrap();
    assert!(healing.cache_hit);
    assert_eq!(healing.provider, Some(HealingProviderKind::Cache));
    assert_eq!(healing.estimated_cost, 0.0);
    assert_eq!(remote.calls(), 1);
    assert_eq!(engine.healer().cache().peek(&key).unwrap().success_count, 2);
}

#[tokio::test]
async fn page_capture_failure_leaves_step_failed() {
    let heuristic = Suggests::new("button.checkout", 0.95);
    let engine = ReplayEngine::builder(policy())
        .strategy(LivePage::new(&["#qty"]))
        .local_analyzer(heuristic.clone())
        .build()
        .unwrap();

    let report = engine
        .session(Arc::new(FakePage { broken: true }))
        .run(&recording())
        .await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.steps[2].error.as_deref(), Some("Page error: target closed"));
    assert_eq!(heuristic.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn steps_are_paced_by_the_inter_step_pause() {
    let mut policy = policy();
    policy.execution.inter_step_pause_ms = 250;
    let engine = ReplayEngine::builder(policy)
        .strategy(LivePage::new(&["#qty", "#checkout-8f3a2c"]))
        .build()
        .unwrap();

    let report = engine.session(page()).run(&recording()).await;

    assert!(report.all_passed());
    assert!(report.elapsed_ms >= 500);
}
