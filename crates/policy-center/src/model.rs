use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use soulbrowser_core_types::StrategyTier;

/// Complete, layered replay configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayPolicy {
    pub rev: u64,
    pub tiers: BTreeMap<StrategyTier, TierSettings>,
    pub confidence: ConfidencePolicy,
    pub cache: HealCachePolicy,
    pub remote: RemoteGuardPolicy,
    pub healing: HealingPolicy,
    pub execution: ExecutionPolicy,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub provenance: HashMap<String, PolicyProvenance>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TierSettings {
    pub enabled: bool,
    pub timeout_ms: u64,
    pub priority: u32,
}

/// Tier configuration with its tier attached; lower priority runs first.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TierPolicy {
    pub tier: StrategyTier,
    pub enabled: bool,
    pub timeout_ms: u64,
    pub priority: u32,
}

impl TierPolicy {
    pub fn new(tier: StrategyTier, priority: u32, timeout_ms: u64) -> Self {
        Self {
            tier,
            enabled: true,
            timeout_ms,
            priority,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfidencePolicy {
    pub auto_apply: f64,
    pub apply_flag: f64,
    pub minimum: f64,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            auto_apply: 0.80,
            apply_flag: 0.60,
            minimum: 0.30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HealCachePolicy {
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub min_success_rate: f64,
    pub path: Option<PathBuf>,
}

impl Default for HealCachePolicy {
    fn default() -> Self {
        Self {
            ttl_secs: 7 * 24 * 60 * 60,
            max_entries: 500,
            min_success_rate: 0.5,
            path: None,
        }
    }
}

impl HealCachePolicy {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteGuardPolicy {
    pub window_secs: u64,
    pub max_calls: usize,
    pub per_step_attempts: u32,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for RemoteGuardPolicy {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_calls: 50,
            per_step_attempts: 2,
            failure_threshold: 3,
            cooldown_secs: 300,
        }
    }
}

impl RemoteGuardPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HealingPolicy {
    pub cache_enabled: bool,
    pub heuristic_enabled: bool,
    pub remote_enabled: bool,
    pub heuristic_timeout_ms: u64,
    pub remote_timeout_ms: u64,
    pub remote_retries: u32,
    pub remote_cost_per_call: f64,
}

impl Default for HealingPolicy {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            heuristic_enabled: true,
            remote_enabled: false,
            heuristic_timeout_ms: 2_000,
            remote_timeout_ms: 15_000,
            remote_retries: 1,
            remote_cost_per_call: 0.01,
        }
    }
}

impl HealingPolicy {
    pub fn heuristic_timeout(&self) -> Duration {
        Duration::from_millis(self.heuristic_timeout_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionPolicy {
    pub inter_step_pause_ms: u64,
    pub heal_on_failure: bool,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            inter_step_pause_ms: 250,
            heal_on_failure: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyProvenance {
    pub path: String,
    pub source: PolicySource,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicySource {
    Builtin,
    File,
    Env,
    Cli,
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        crate::defaults::default_policy()
    }
}

impl ReplayPolicy {
    /// Tier table flattened into policies, in declaration order.
    pub fn tier_policies(&self) -> Vec<TierPolicy> {
        self.tiers
            .iter()
            .map(|(tier, settings)| TierPolicy {
                tier: *tier,
                enabled: settings.enabled,
                timeout_ms: settings.timeout_ms,
                priority: settings.priority,
            })
            .collect()
    }

    pub fn set_provenance(&mut self, path: &str, source: PolicySource) {
        self.provenance.insert(
            path.to_string(),
            PolicyProvenance {
                path: path.to_string(),
                source,
            },
        );
    }

    pub fn source_of(&self, path: &str) -> Option<PolicySource> {
        self.provenance.get(path).map(|entry| entry.source)
    }
}
