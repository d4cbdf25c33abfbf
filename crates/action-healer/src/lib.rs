//! Self-healing for recorded steps
//!
//! When a step's recorded locator no longer resolves, [`AiHealer`] asks a
//! chain of providers for a replacement: the healing cache, a local
//! heuristic analyzer, then a remote vision service guarded by a rate
//! limiter and circuit breaker. The winning proposal's confidence decides
//! whether the caller applies it silently, applies and flags it, only
//! suggests it, or does nothing.

pub mod cache;
pub mod confidence;
pub mod errors;
pub mod guard;
pub mod healer;
pub mod providers;
pub mod remote;
pub mod types;

pub use cache::{locator_hash, normalize_url_pattern, CacheEntry, CacheKey, CacheStats, HealingCache};
pub use confidence::ConfidenceThresholds;
pub use errors::HealError;
pub use guard::{CircuitBreaker, CircuitState, GuardRejection, RateLimiter, RemoteGuard};
pub use healer::AiHealer;
pub use providers::{
    CacheProvider, HealingProvider, HeuristicProvider, LocalAnalyzer, RemoteAnalyzer,
    VisionProvider, VisionSettings,
};
pub use remote::HttpVisionAnalyzer;
pub use types::*;
