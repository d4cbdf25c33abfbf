//! Strategy providers
//!
//! One provider per tier. Providers carry the actual page work (DOM query,
//! protocol command, vision match, raw coordinate click); the orchestrator
//! only sequences them, bounds them with a timeout and records the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use soulbrowser_core_types::{ActionDescriptor, StrategyTier};

use crate::{errors::LocatorError, types::StrategyOutcome};

/// Provider trait for one strategy tier
#[async_trait]
pub trait StrategyProvider: Send + Sync {
    /// Tier this provider implements
    fn tier(&self) -> StrategyTier;

    /// Whether the provider can run right now (e.g. protocol session attached)
    async fn is_available(&self) -> bool {
        true
    }

    /// Locate the step's target and perform the action on it
    async fn execute(&self, action: &ActionDescriptor) -> Result<StrategyOutcome, LocatorError>;
}

/// Providers keyed by tier; registering a tier twice replaces the earlier one.
#[derive(Default, Clone)]
pub struct StrategyRegistry {
    providers: HashMap<StrategyTier, Arc<dyn StrategyProvider>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn StrategyProvider>) {
        self.providers.insert(provider.tier(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn StrategyProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, tier: StrategyTier) -> Option<Arc<dyn StrategyProvider>> {
        self.providers.get(&tier).cloned()
    }

    pub fn tiers(&self) -> Vec<StrategyTier> {
        let mut tiers: Vec<_> = self.providers.keys().copied().collect();
        tiers.sort();
        tiers
    }

    /// Probe the protocol-level provider; false when none is registered.
    pub async fn protocol_available(&self) -> bool {
        match self.get(StrategyTier::ProtocolLevel) {
            Some(provider) => provider.is_available().await,
            None => false,
        }
    }
}
