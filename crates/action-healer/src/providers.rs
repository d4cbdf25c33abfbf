//! Healing providers
//!
//! Each provider proposes a replacement locator for a step whose recorded
//! locator failed. They are consulted cheapest first: cache, local
//! heuristic analysis, remote vision analysis.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheKey, HealingCache};
use crate::errors::HealError;
use crate::guard::RemoteGuard;
use crate::types::{AnalysisQuery, AnalysisResult, HealingProviderKind, HealingRequest, Proposal, Snapshot};

#[async_trait]
pub trait HealingProvider: Send + Sync {
    fn kind(&self) -> HealingProviderKind;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    async fn propose(&self, request: &HealingRequest) -> Result<Proposal, HealError>;
}

/// Bounded, offline analyzer matching a step against a snapshot.
#[async_trait]
pub trait LocalAnalyzer: Send + Sync {
    async fn is_available(&self) -> bool {
        true
    }

    async fn analyze(
        &self,
        snapshot: &Snapshot,
        query: &AnalysisQuery,
    ) -> Result<AnalysisResult, HealError>;
}

/// External analysis service. Same contract as [`LocalAnalyzer`], plus a
/// credential setter.
#[async_trait]
pub trait RemoteAnalyzer: Send + Sync {
    async fn is_available(&self) -> bool {
        true
    }

    async fn analyze(
        &self,
        snapshot: &Snapshot,
        query: &AnalysisQuery,
    ) -> Result<AnalysisResult, HealError>;

    fn set_api_key(&self, _api_key: Option<String>) {}
}

pub struct CacheProvider {
    cache: Arc<HealingCache>,
    enabled: AtomicBool,
}

impl CacheProvider {
    pub fn new(cache: Arc<HealingCache>) -> Self {
        Self {
            cache,
            enabled: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl HealingProvider for CacheProvider {
    fn kind(&self) -> HealingProviderKind {
        HealingProviderKind::Cache
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    async fn propose(&self, request: &HealingRequest) -> Result<Proposal, HealError> {
        let key = CacheKey::for_step(&request.action, &request.page.url);
        let Some(entry) = self.cache.get(&key) else {
            return Ok(Proposal::nothing(self.kind(), "no reusable cache entry"));
        };
        debug!(key = %key, healed = %entry.healed, "healing served from cache");
        Ok(Proposal {
            provider: self.kind(),
            reasoning: format!(
                "previously healed by {} (success rate {:.2})",
                entry.provider,
                entry.success_rate()
            ),
            locator: Some(entry.healed),
            confidence: entry.confidence,
            alternatives: Vec::new(),
            cache_hit: true,
            cost: 0.0,
        })
    }
}

pub struct HeuristicProvider {
    analyzer: Arc<dyn LocalAnalyzer>,
    timeout: Duration,
    enabled: AtomicBool,
}

impl HeuristicProvider {
    pub fn new(analyzer: Arc<dyn LocalAnalyzer>, timeout: Duration) -> Self {
        Self {
            analyzer,
            timeout,
            enabled: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl HealingProvider for HeuristicProvider {
    fn kind(&self) -> HealingProviderKind {
        HealingProviderKind::LocalHeuristic
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    async fn propose(&self, request: &HealingRequest) -> Result<Proposal, HealError> {
        if !self.analyzer.is_available().await {
            return Ok(Proposal::nothing(self.kind(), "local analyzer unavailable"));
        }
        let query = AnalysisQuery::from_action(&request.action);
        match time::timeout(self.timeout, self.analyzer.analyze(&request.snapshot, &query)).await {
            Ok(result) => Ok(Proposal::from_analysis(self.kind(), result?)),
            Err(_) => Err(HealError::Timeout {
                provider: self.kind().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionSettings {
    pub timeout: Duration,
    pub retries: u32,
    pub cost_per_call: f64,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            retries: 1,
            cost_per_call: 0.01,
        }
    }
}

/// Remote vision analysis behind the rate limiter and circuit breaker.
/// Results that produce a locator are written into the healing cache.
pub struct VisionProvider {
    analyzer: Arc<dyn RemoteAnalyzer>,
    guard: Arc<RemoteGuard>,
    cache: Option<Arc<HealingCache>>,
    settings: VisionSettings,
    enabled: AtomicBool,
}

impl VisionProvider {
    pub fn new(
        analyzer: Arc<dyn RemoteAnalyzer>,
        guard: Arc<RemoteGuard>,
        settings: VisionSettings,
    ) -> Self {
        Self {
            analyzer,
            guard,
            cache: None,
            settings,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn with_cache(mut self, cache: Arc<HealingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn set_api_key(&self, api_key: Option<String>) {
        self.analyzer.set_api_key(api_key);
    }

    async fn call_once(
        &self,
        snapshot: &Snapshot,
        query: &AnalysisQuery,
    ) -> Result<AnalysisResult, HealError> {
        match time::timeout(self.settings.timeout, self.analyzer.analyze(snapshot, query)).await {
            Ok(result) => result,
            Err(_) => Err(HealError::Timeout {
                provider: HealingProviderKind::RemoteVision.to_string(),
                timeout_ms: self.settings.timeout.as_millis() as u64,
            }),
        }
    }

    fn remember(&self, request: &HealingRequest, proposal: &Proposal) {
        let (Some(cache), Some(healed)) = (&self.cache, &proposal.locator) else {
            return;
        };
        let key = CacheKey::for_step(&request.action, &request.page.url);
        cache.upsert(CacheEntry::new(
            key,
            request.action.primary_locator().cloned(),
            healed.clone(),
            proposal.confidence,
            HealingProviderKind::RemoteVision,
            cache.ttl(),
        ));
    }
}

#[async_trait]
impl HealingProvider for VisionProvider {
    fn kind(&self) -> HealingProviderKind {
        HealingProviderKind::RemoteVision
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    async fn propose(&self, request: &HealingRequest) -> Result<Proposal, HealError> {
        if !self.analyzer.is_available().await {
            return Ok(Proposal::nothing(self.kind(), "remote analyzer unavailable"));
        }
        let step = request.action.id.0.as_str();
        if let Err(rejection) = self.guard.admit(step) {
            info!(step, reason = %rejection, "remote vision skipped");
            return Ok(Proposal::nothing(self.kind(), format!("skipped: {}", rejection)));
        }

        let query = AnalysisQuery::from_action(&request.action);
        let mut calls = 0u32;
        let outcome = loop {
            calls += 1;
            match self.call_once(&request.snapshot, &query).await {
                Ok(result) => break Ok(result),
                Err(err) if err.is_transient() && calls <= self.settings.retries => {
                    warn!(step, attempt = calls, error = %err, "remote vision failed, retrying");
                }
                Err(err) => break Err(err),
            }
        };
        let cost = self.settings.cost_per_call * calls as f64;

        match outcome {
            Ok(result) => {
                self.guard.record_outcome(true);
                let proposal = Proposal::from_analysis(self.kind(), result).with_cost(cost);
                self.remember(request, &proposal);
                Ok(proposal)
            }
            Err(err) => {
                self.guard.record_outcome(false);
                warn!(step, error = %err, "remote vision failed");
                Ok(Proposal::nothing(self.kind(), format!("remote analysis failed: {}", err))
                    .with_cost(cost))
            }
        }
    }
}
