//! Replay policy center.
//!
//! Owns the configuration surface of the replay engine: the tier plan,
//! confidence thresholds, healing cache bounds and the remote-provider guard.
//! Policies are layered (builtin defaults, YAML file, environment, CLI
//! overrides) and validated before anything executes.

pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::default_policy;
pub use errors::PolicyError;
pub use loader::{load_policy, load_policy_with_options, LoadOptions};
pub use model::{
    ConfidencePolicy, ExecutionPolicy, HealCachePolicy, HealingPolicy, PolicySource,
    RemoteGuardPolicy, ReplayPolicy, TierPolicy, TierSettings,
};
pub use validate::{validate_confidence, validate_policy, validate_tiers};
