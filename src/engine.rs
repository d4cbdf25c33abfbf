//! Engine wiring
//!
//! Everything the replay engine needs is built here from one validated
//! policy and handed over explicitly; no component looks anything up
//! globally. Invalid configuration fails in [`EngineBuilder::build`],
//! before any step runs.

use std::sync::Arc;

use action_healer::{AiHealer, HttpVisionAnalyzer, LocalAnalyzer, RemoteAnalyzer};
use action_locator::{StrategyProvider, StrategyRegistry, TieredOrchestrator};
use l6_observe::{TelemetrySink, TracingSink};
use soulbrowser_policy_center::{validate_policy, ReplayPolicy};
use tracing::info;

use crate::errors::ReplayError;
use crate::replay::{PageSurface, ReplaySession};

pub struct EngineBuilder {
    policy: ReplayPolicy,
    registry: StrategyRegistry,
    local: Option<Arc<dyn LocalAnalyzer>>,
    remote: Option<Arc<dyn RemoteAnalyzer>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl EngineBuilder {
    pub fn new(policy: ReplayPolicy) -> Self {
        Self {
            policy,
            registry: StrategyRegistry::new(),
            local: None,
            remote: None,
            telemetry: None,
        }
    }

    pub fn strategy(mut self, provider: Arc<dyn StrategyProvider>) -> Self {
        self.registry.register(provider);
        self
    }

    pub fn local_analyzer(mut self, analyzer: Arc<dyn LocalAnalyzer>) -> Self {
        self.local = Some(analyzer);
        self
    }

    pub fn remote_analyzer(mut self, analyzer: Arc<dyn RemoteAnalyzer>) -> Self {
        self.remote = Some(analyzer);
        self
    }

    /// Use the HTTP vision service at `endpoint`. The client times out with
    /// the policy's remote timeout.
    pub fn http_vision(
        self,
        endpoint: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ReplayError> {
        let analyzer = HttpVisionAnalyzer::new(endpoint, self.policy.healing.remote_timeout())?;
        analyzer.set_api_key(api_key);
        Ok(self.remote_analyzer(Arc::new(analyzer)))
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn build(self) -> Result<ReplayEngine, ReplayError> {
        validate_policy(&self.policy)?;
        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn TelemetrySink>);

        let orchestrator = TieredOrchestrator::from_policy(self.registry, &self.policy)?
            .with_telemetry(telemetry.clone());
        let healer = AiHealer::from_policy(&self.policy, self.local, self.remote)?
            .with_telemetry(telemetry.clone());

        info!(
            strategies = ?orchestrator.registry().tiers(),
            healers = ?healer.provider_kinds(),
            "replay engine ready"
        );
        Ok(ReplayEngine {
            policy: Arc::new(self.policy),
            orchestrator: Arc::new(orchestrator),
            healer: Arc::new(healer),
            telemetry,
        })
    }
}

/// Shared, immutable engine. Sessions borrow its components.
#[derive(Clone)]
pub struct ReplayEngine {
    policy: Arc<ReplayPolicy>,
    orchestrator: Arc<TieredOrchestrator>,
    healer: Arc<AiHealer>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ReplayEngine {
    pub fn builder(policy: ReplayPolicy) -> EngineBuilder {
        EngineBuilder::new(policy)
    }

    pub fn policy(&self) -> &ReplayPolicy {
        &self.policy
    }

    pub fn orchestrator(&self) -> &Arc<TieredOrchestrator> {
        &self.orchestrator
    }

    pub fn healer(&self) -> &Arc<AiHealer> {
        &self.healer
    }

    pub fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.telemetry
    }

    pub fn session(&self, page: Arc<dyn PageSurface>) -> ReplaySession {
        ReplaySession::new(self.clone(), page)
    }
}
