use std::collections::BTreeMap;

use soulbrowser_core_types::StrategyTier;

use crate::model::{
    ConfidencePolicy, ExecutionPolicy, HealCachePolicy, HealingPolicy, RemoteGuardPolicy,
    ReplayPolicy, TierSettings,
};

pub fn default_policy() -> ReplayPolicy {
    ReplayPolicy {
        rev: 1,
        tiers: default_tiers(),
        confidence: ConfidencePolicy::default(),
        cache: HealCachePolicy::default(),
        remote: RemoteGuardPolicy::default(),
        healing: HealingPolicy::default(),
        execution: ExecutionPolicy::default(),
        provenance: Default::default(),
    }
}

pub fn default_tiers() -> BTreeMap<StrategyTier, TierSettings> {
    let mut tiers = BTreeMap::new();
    tiers.insert(StrategyTier::NativeQuery, settings(10, 5_000));
    tiers.insert(StrategyTier::ProtocolLevel, settings(20, 5_000));
    tiers.insert(StrategyTier::VisionOcr, settings(30, 10_000));
    tiers.insert(StrategyTier::ManualCoordinate, settings(40, 3_000));
    tiers
}

fn settings(priority: u32, timeout_ms: u64) -> TierSettings {
    TierSettings {
        enabled: true,
        timeout_ms,
        priority,
    }
}
