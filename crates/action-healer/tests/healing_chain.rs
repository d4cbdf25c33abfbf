//! Provider chain behaviour with scripted analyzers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use action_healer::{
    AiHealer, AnalysisQuery, AnalysisResult, CacheEntry, CacheKey, CircuitState,
    ConfidenceThresholds, HealAction, HealError, HealingCache, HealingProviderKind,
    HealingRequest, HeuristicProvider, LocalAnalyzer, PageContext, RemoteAnalyzer, RemoteGuard,
    Snapshot, VisionProvider, VisionSettings,
};
use async_trait::async_trait;
use l6_observe::MemorySink;
use soulbrowser_core_types::{ActionDescriptor, ActionKind, LocatorHint};
use soulbrowser_policy_center::{default_policy, HealCachePolicy, RemoteGuardPolicy};

const PAGE: &str = "https://shop.test/orders/42";

enum Script {
    Found(&'static str, f64),
    NotFound,
    Fail(HealError),
    Hang,
}

struct ScriptedAnalyzer {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run(&self) -> Result<AnalysisResult, HealError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Found(selector, confidence) => Ok(AnalysisResult::found(
                LocatorHint::selector(*selector),
                *confidence,
                "matched label",
            )),
            Script::NotFound => Ok(AnalysisResult::not_found("no match")),
            Script::Fail(err) => Err(err.clone()),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(AnalysisResult::not_found("late"))
            }
        }
    }
}

#[async_trait]
impl LocalAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, _: &Snapshot, _: &AnalysisQuery) -> Result<AnalysisResult, HealError> {
        self.run().await
    }
}

#[async_trait]
impl RemoteAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, _: &Snapshot, _: &AnalysisQuery) -> Result<AnalysisResult, HealError> {
        self.run().await
    }
}

fn step() -> ActionDescriptor {
    ActionDescriptor::new(ActionKind::Click, "Place order")
        .with_id("step-3")
        .with_hint(LocatorHint::selector("#order-btn-8812"))
}

fn request() -> HealingRequest {
    HealingRequest::new(
        step(),
        Snapshot::png(vec![0x89, 0x50], 1280, 720),
        PageContext::new(PAGE),
    )
}

fn healer_with(
    local: Option<Arc<ScriptedAnalyzer>>,
    remote: Option<Arc<ScriptedAnalyzer>>,
) -> AiHealer {
    let mut policy = default_policy();
    policy.healing.remote_enabled = true;
    AiHealer::from_policy(
        &policy,
        local.map(|a| a as Arc<dyn LocalAnalyzer>),
        remote.map(|a| a as Arc<dyn RemoteAnalyzer>),
    )
    .unwrap()
}

fn cached_entry(success: u32, failure: u32) -> CacheEntry {
    let action = step();
    let mut entry = CacheEntry::new(
        CacheKey::for_step(&action, "https://shop.test/orders/99"),
        action.primary_locator().cloned(),
        LocatorHint::selector("button[data-action=place-order]"),
        0.92,
        HealingProviderKind::RemoteVision,
        Duration::from_secs(3600),
    );
    entry.success_count = success;
    entry.failure_count = failure;
    entry
}

#[tokio::test]
async fn healthy_cache_entry_wins_without_remote_call() {
    let remote = ScriptedAnalyzer::new(Script::Found("#other", 0.99));
    let sink = Arc::new(MemorySink::default());
    let healer = healer_with(None, Some(remote.clone())).with_telemetry(sink.clone());
    healer.cache().set(cached_entry(9, 1));

    let response = healer.heal(&request()).await;

    assert!(response.success);
    assert_eq!(response.provider, Some(HealingProviderKind::Cache));
    assert!(response.cache_hit);
    assert_eq!(response.action, HealAction::AutoApply);
    assert_eq!(remote.calls(), 0);

    let records = sink.healing_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider.as_deref(), Some("cache"));
    assert!(records[0].cache_hit);
    assert_eq!(records[0].estimated_cost, 0.0);
}

#[tokio::test]
async fn unhealthy_cache_entry_falls_through() {
    let local = ScriptedAnalyzer::new(Script::Found("button.place-order", 0.7));
    let healer = healer_with(Some(local.clone()), None);
    healer.cache().set(cached_entry(1, 3));

    let response = healer.heal(&request()).await;

    assert_eq!(response.provider, Some(HealingProviderKind::LocalHeuristic));
    assert_eq!(response.action, HealAction::ApplyAndFlag);
    assert_eq!(local.calls(), 1);
}

#[tokio::test]
async fn all_providers_disabled_is_a_quiet_failure() {
    let mut policy = default_policy();
    policy.healing.cache_enabled = false;
    policy.healing.heuristic_enabled = false;
    policy.healing.remote_enabled = false;
    let local = ScriptedAnalyzer::new(Script::Found("#x", 0.9));
    let remote = ScriptedAnalyzer::new(Script::Found("#y", 0.9));
    let healer = AiHealer::from_policy(
        &policy,
        Some(local.clone() as Arc<dyn LocalAnalyzer>),
        Some(remote.clone() as Arc<dyn RemoteAnalyzer>),
    )
    .unwrap();

    let response = healer.heal(&request()).await;

    assert!(!response.success);
    assert_eq!(response.action, HealAction::NoAction);
    assert!(response.provider.is_none());
    assert_eq!(response.reasoning, "no healing provider enabled");
    assert_eq!(local.calls() + remote.calls(), 0);
}

#[tokio::test]
async fn remote_result_is_cached_for_next_failure() {
    let remote = ScriptedAnalyzer::new(Script::Found("button.place-order", 0.85));
    let healer = healer_with(None, Some(remote.clone()));

    let first = healer.heal(&request()).await;
    assert_eq!(first.provider, Some(HealingProviderKind::RemoteVision));
    assert!(first.estimated_cost > 0.0);

    // same step on another order page resolves from cache
    let mut again = request();
    again.page = PageContext::new("https://shop.test/orders/77");
    let second = healer.heal(&again).await;
    assert_eq!(second.provider, Some(HealingProviderKind::Cache));
    assert_eq!(second.suggested_locator, first.suggested_locator);
    assert_eq!(remote.calls(), 1);
}

#[tokio::test]
async fn weak_proposals_become_alternatives() {
    let local = ScriptedAnalyzer::new(Script::Found("div.maybe", 0.1));
    let healer = healer_with(Some(local), None);

    let response = healer.heal(&request()).await;

    assert!(!response.success);
    assert_eq!(response.action, HealAction::NoAction);
    assert_eq!(response.alternatives.len(), 1);
    assert_eq!(
        response.alternatives[0].locator,
        LocatorHint::selector("div.maybe")
    );
}

#[tokio::test(start_paused = true)]
async fn heuristic_timeout_counts_as_nothing() {
    let local = ScriptedAnalyzer::new(Script::Hang);
    let remote = ScriptedAnalyzer::new(Script::Found("button.place-order", 0.9));
    let healer = healer_with(Some(local.clone()), Some(remote.clone()));

    let response = healer.heal(&request()).await;

    assert!(response.success);
    assert_eq!(response.provider, Some(HealingProviderKind::RemoteVision));
    assert!(response.reasoning.contains("matched label"));
    assert_eq!(local.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_remote_failure_is_retried_once() {
    let remote = ScriptedAnalyzer::new(Script::Fail(HealError::Http {
        status: 503,
        body: "busy".into(),
    }));
    let guard = Arc::new(RemoteGuard::new(&RemoteGuardPolicy::default()).unwrap());
    let provider = VisionProvider::new(remote.clone(), guard.clone(), VisionSettings::default());
    let healer = AiHealer::new(
        Arc::new(HealingCache::default()),
        guard.clone(),
        ConfidenceThresholds::default(),
    )
    .with_provider(Arc::new(provider));

    let response = healer.heal(&request()).await;

    assert!(!response.success);
    assert_eq!(remote.calls(), 2);
    assert!((response.estimated_cost - 0.02).abs() < 1e-9);
    assert_eq!(guard.step_attempts("step-3"), 1);
}

#[tokio::test(start_paused = true)]
async fn breaker_stops_remote_calls_after_three_failures() {
    let remote = ScriptedAnalyzer::new(Script::Fail(HealError::Http {
        status: 400,
        body: "bad".into(),
    }));
    let guard = Arc::new(
        RemoteGuard::new(&RemoteGuardPolicy {
            per_step_attempts: 10,
            ..RemoteGuardPolicy::default()
        })
        .unwrap(),
    );
    let healer = AiHealer::new(
        Arc::new(HealingCache::default()),
        guard.clone(),
        ConfidenceThresholds::default(),
    )
    .with_provider(Arc::new(VisionProvider::new(
        remote.clone(),
        guard.clone(),
        VisionSettings::default(),
    )));

    for _ in 0..3 {
        healer.heal(&request()).await;
    }
    assert_eq!(remote.calls(), 3);
    assert_eq!(guard.circuit_state().name(), "open");

    let skipped = healer.heal(&request()).await;
    assert!(!skipped.success);
    assert!(skipped.reasoning.contains("circuit open"));
    assert_eq!(remote.calls(), 3);

    tokio::time::advance(Duration::from_secs(300)).await;
    healer.heal(&request()).await;
    assert_eq!(remote.calls(), 4);
    assert_eq!(guard.circuit_state().name(), "open");
}

#[tokio::test(start_paused = true)]
async fn abandoned_trial_does_not_lock_out_remote_vision() {
    let guard = Arc::new(
        RemoteGuard::new(&RemoteGuardPolicy {
            per_step_attempts: 10,
            ..RemoteGuardPolicy::default()
        })
        .unwrap(),
    );
    let vision = |analyzer: Arc<ScriptedAnalyzer>| {
        AiHealer::new(
            Arc::new(HealingCache::default()),
            guard.clone(),
            ConfidenceThresholds::default(),
        )
        .with_provider(Arc::new(VisionProvider::new(
            analyzer,
            guard.clone(),
            VisionSettings::default(),
        )))
    };

    let failing = vision(ScriptedAnalyzer::new(Script::Fail(HealError::Http {
        status: 400,
        body: "bad".into(),
    })));
    for _ in 0..3 {
        failing.heal(&request()).await;
    }
    tokio::time::advance(Duration::from_secs(300)).await;

    // the caller gives up on the trial before it reports
    let hanging = ScriptedAnalyzer::new(Script::Hang);
    let hanging_healer = vision(hanging.clone());
    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), hanging_healer.heal(&request())).await;
    assert!(abandoned.is_err());
    assert_eq!(hanging.calls(), 1);

    tokio::time::advance(Duration::from_secs(300)).await;
    let healthy = ScriptedAnalyzer::new(Script::Found("button.place-order", 0.9));
    let response = vision(healthy.clone()).heal(&request()).await;
    assert!(response.success);
    assert_eq!(healthy.calls(), 1);
    assert_eq!(guard.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn remote_reheal_keeps_failure_history() {
    let remote = ScriptedAnalyzer::new(Script::Found("button[data-action=place-order]", 0.92));
    let healer = healer_with(None, Some(remote.clone()));
    let seeded = cached_entry(1, 4);
    healer.cache().set(seeded.clone());

    let first = healer.heal(&request()).await;
    assert_eq!(first.provider, Some(HealingProviderKind::RemoteVision));
    let kept = healer.cache().peek(&seeded.key).unwrap();
    assert_eq!((kept.success_count, kept.failure_count), (1, 4));

    // still below the reuse threshold, so the cache does not answer
    let second = healer.heal(&request()).await;
    assert_eq!(second.provider, Some(HealingProviderKind::RemoteVision));
    assert_eq!(remote.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn per_step_cap_limits_remote_dispatches_per_run() {
    let remote = ScriptedAnalyzer::new(Script::NotFound);
    let healer = healer_with(None, Some(remote.clone()));

    for _ in 0..4 {
        healer.heal(&request()).await;
    }
    assert_eq!(remote.calls(), 2);

    healer.reset_run();
    healer.heal(&request()).await;
    assert_eq!(remote.calls(), 3);
}

#[tokio::test]
async fn record_result_feeds_cache_counters() {
    let healer = healer_with(None, None);
    let entry = cached_entry(0, 0);
    healer.cache().set(entry.clone());
    let action = step();

    assert!(healer.record_result(&action, PAGE, &entry.healed, false));
    assert!(healer.record_result(&action, PAGE, &entry.healed, false));
    assert!(!healer.record_result(&action, PAGE, &LocatorHint::selector("#unrelated"), true));

    let stored = healer.cache().peek(&entry.key).unwrap();
    assert_eq!(stored.failure_count, 2);
    assert_eq!(stored.success_count, 0);
    // now below the 0.5 minimum: served no more
    let response = healer.heal(&request()).await;
    assert_ne!(response.provider, Some(HealingProviderKind::Cache));
}

#[test]
fn cache_survives_reload_with_recency() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("heal-cache.json");
    let policy = HealCachePolicy {
        max_entries: 2,
        ..HealCachePolicy::default()
    };

    let cache = HealingCache::new(&policy).unwrap();
    let older = cached_entry(1, 0);
    let mut newer = cached_entry(2, 0);
    newer.key.step_label = "Cancel order".into();
    cache.set(older.clone());
    cache.set(newer.clone());
    // `older` becomes most recently used
    assert!(cache.get(&older.key).is_some());
    cache.save(&path).unwrap();

    let reloaded = HealingCache::open(&policy, &path).unwrap();
    assert_eq!(reloaded.len(), 2);
    let mut third = cached_entry(0, 0);
    third.key.step_label = "Track order".into();
    reloaded.set(third);
    assert!(reloaded.peek(&newer.key).is_none());
    assert!(reloaded.peek(&older.key).is_some());
}

#[test]
fn heuristic_provider_can_be_driven_without_a_runtime_helper() {
    let local = ScriptedAnalyzer::new(Script::NotFound);
    let provider = HeuristicProvider::new(local.clone(), Duration::from_secs(1));
    let healer = AiHealer::new(
        Arc::new(HealingCache::default()),
        Arc::new(RemoteGuard::default()),
        ConfidenceThresholds::default(),
    )
    .with_provider(Arc::new(provider));

    let response = tokio_test::block_on(healer.heal(&request()));
    assert!(!response.success);
    assert!(response.reasoning.contains("no match"));
    assert_eq!(
        healer.provider_kinds(),
        vec![HealingProviderKind::Cache, HealingProviderKind::LocalHeuristic]
    );
    assert_eq!(healer.guard().circuit_state(), CircuitState::Closed);
}
