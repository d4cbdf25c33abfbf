//! Healing orchestrator
//!
//! Runs the enabled providers in priority order and stops at the first one
//! that proposes a locator clearing the confidence minimum. Provider errors
//! are logged and count as "found nothing"; `heal` itself never fails.

use std::path::PathBuf;
use std::sync::Arc;

use l6_observe::{now_ms, HealingRecord, TelemetrySink, TracingSink};
use soulbrowser_core_types::{ActionDescriptor, LocatorHint};
use soulbrowser_policy_center::validate::validate_healing;
use soulbrowser_policy_center::ReplayPolicy;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, HealingCache};
use crate::confidence::ConfidenceThresholds;
use crate::errors::HealError;
use crate::guard::RemoteGuard;
use crate::providers::{
    CacheProvider, HealingProvider, HeuristicProvider, LocalAnalyzer, RemoteAnalyzer,
    VisionProvider, VisionSettings,
};
use crate::types::{
    HealingProviderKind, HealingRequest, HealingResponse, LocatorCandidate, Proposal,
};

pub struct AiHealer {
    providers: Vec<Arc<dyn HealingProvider>>,
    thresholds: ConfidenceThresholds,
    cache: Arc<HealingCache>,
    guard: Arc<RemoteGuard>,
    cache_path: Option<PathBuf>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl AiHealer {
    /// Healer with only the cache provider; add analyzers with
    /// [`AiHealer::with_provider`].
    pub fn new(
        cache: Arc<HealingCache>,
        guard: Arc<RemoteGuard>,
        thresholds: ConfidenceThresholds,
    ) -> Self {
        Self {
            providers: vec![Arc::new(CacheProvider::new(cache.clone()))],
            thresholds,
            cache,
            guard,
            cache_path: None,
            telemetry: Arc::new(TracingSink),
        }
    }

    /// Build the full chain from policy. A persisted cache at
    /// `cache.path` is loaded when present.
    pub fn from_policy(
        policy: &ReplayPolicy,
        local: Option<Arc<dyn LocalAnalyzer>>,
        remote: Option<Arc<dyn RemoteAnalyzer>>,
    ) -> Result<Self, HealError> {
        validate_healing(&policy.healing)?;
        let thresholds = ConfidenceThresholds::from_policy(&policy.confidence)?;
        let cache = Arc::new(HealingCache::new(&policy.cache)?);
        if let Some(path) = &policy.cache.path {
            cache.load(path)?;
        }
        let guard = Arc::new(RemoteGuard::new(&policy.remote)?);
        let healing = &policy.healing;

        let mut healer = Self::new(cache.clone(), guard.clone(), thresholds);
        healer.cache_path = policy.cache.path.clone();
        healer.set_provider_enabled(HealingProviderKind::Cache, healing.cache_enabled);

        if let Some(analyzer) = local {
            let provider = HeuristicProvider::new(analyzer, healing.heuristic_timeout());
            provider.set_enabled(healing.heuristic_enabled);
            healer = healer.with_provider(Arc::new(provider));
        }
        if let Some(analyzer) = remote {
            let provider = VisionProvider::new(
                analyzer,
                guard,
                VisionSettings {
                    timeout: healing.remote_timeout(),
                    retries: healing.remote_retries,
                    cost_per_call: healing.remote_cost_per_call,
                },
            )
            .with_cache(cache);
            provider.set_enabled(healing.remote_enabled);
            healer = healer.with_provider(Arc::new(provider));
        }
        Ok(healer)
    }

    /// Add a provider, replacing any existing one of the same kind.
    pub fn with_provider(mut self, provider: Arc<dyn HealingProvider>) -> Self {
        self.providers.retain(|existing| existing.kind() != provider.kind());
        self.providers.push(provider);
        self.providers.sort_by_key(|provider| provider.kind());
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn thresholds(&self) -> &ConfidenceThresholds {
        &self.thresholds
    }

    pub fn cache(&self) -> &Arc<HealingCache> {
        &self.cache
    }

    pub fn guard(&self) -> &Arc<RemoteGuard> {
        &self.guard
    }

    pub fn provider_kinds(&self) -> Vec<HealingProviderKind> {
        self.providers.iter().map(|provider| provider.kind()).collect()
    }

    /// Toggle a provider; false when no provider of that kind is installed.
    pub fn set_provider_enabled(&self, kind: HealingProviderKind, enabled: bool) -> bool {
        match self.providers.iter().find(|provider| provider.kind() == kind) {
            Some(provider) => {
                provider.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub async fn heal(&self, request: &HealingRequest) -> HealingResponse {
        let started = Instant::now();
        let mut alternatives: Vec<LocatorCandidate> = Vec::new();
        let mut notes: Vec<String> = Vec::new();
        let mut cost = 0.0;
        let mut accepted: Option<Proposal> = None;

        for provider in &self.providers {
            if !provider.is_enabled() {
                continue;
            }
            let kind = provider.kind();
            let proposal = match provider.propose(request).await {
                Ok(proposal) => proposal,
                Err(err) => {
                    warn!(provider = %kind, error = %err, "healing provider failed");
                    notes.push(format!("{}: {}", kind, err));
                    continue;
                }
            };
            cost += proposal.cost;

            let clears_minimum = self.thresholds.meets_minimum(proposal.confidence);
            if proposal.locator.is_some() && clears_minimum {
                accepted = Some(proposal);
                break;
            }

            debug!(provider = %kind, confidence = proposal.confidence, "proposal not accepted");
            notes.push(format!("{}: {}", kind, proposal.reasoning));
            if let Some(locator) = proposal.locator {
                alternatives.push(LocatorCandidate {
                    locator,
                    confidence: proposal.confidence,
                    reasoning: Some(proposal.reasoning),
                });
            }
            alternatives.extend(proposal.alternatives);
        }

        let mut response = match accepted {
            Some(proposal) => {
                alternatives.extend(proposal.alternatives);
                HealingResponse {
                    success: true,
                    provider: Some(proposal.provider),
                    suggested_locator: proposal.locator,
                    confidence: proposal.confidence,
                    reasoning: proposal.reasoning,
                    alternatives,
                    elapsed_ms: 0,
                    action: self.thresholds.decide(proposal.confidence),
                    cache_hit: proposal.cache_hit,
                    estimated_cost: 0.0,
                }
            }
            None if notes.is_empty() => {
                HealingResponse::failed("no healing provider enabled", alternatives)
            }
            None => HealingResponse::failed(notes.join("; "), alternatives),
        };
        response.elapsed_ms = started.elapsed().as_millis() as u64;
        response.estimated_cost = cost;

        info!(
            step = %request.action.id,
            success = response.success,
            provider = response.provider.map(|p| p.name()).unwrap_or("none"),
            action = %response.action,
            confidence = response.confidence,
            "healing finished"
        );
        self.telemetry.record_healing(HealingRecord {
            session_id: request.session_id.to_string(),
            step_id: request.action.id.to_string(),
            step_label: request.action.label.clone(),
            original_locator: request.action.primary_locator().map(|hint| hint.to_string()),
            healed_locator: response.suggested_locator.as_ref().map(|hint| hint.to_string()),
            provider: response.provider.map(|p| p.name().to_string()),
            success: response.success,
            confidence: response.confidence,
            action: response.action.name().to_string(),
            duration_ms: response.elapsed_ms,
            cache_hit: response.cache_hit,
            estimated_cost: response.estimated_cost,
            timestamp_ms: now_ms(),
        });
        response
    }

    /// Report whether a healed locator actually worked in the page. Updates
    /// the cache entry for the step when it holds that locator; returns
    /// whether an entry was updated.
    pub fn record_result(
        &self,
        action: &ActionDescriptor,
        page_url: &str,
        healed: &LocatorHint,
        success: bool,
    ) -> bool {
        let key = CacheKey::for_step(action, page_url);
        match self.cache.peek(&key) {
            Some(entry) if &entry.healed == healed => {
                if success {
                    self.cache.record_success(&key)
                } else {
                    self.cache.record_failure(&key)
                }
            }
            _ => false,
        }
    }

    /// Clear per-run state (per-step remote attempt counters).
    pub fn reset_run(&self) {
        self.guard.reset_run();
    }

    /// Save the cache to its configured path; false when none is set.
    pub fn persist_cache(&self) -> Result<bool, HealError> {
        match &self.cache_path {
            Some(path) => {
                self.cache.save(path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
