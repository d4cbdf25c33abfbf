//! Tiered element resolution
//!
//! A step is resolved by trying independent strategies in a fixed,
//! reliability-first order and stopping at the first one that succeeds:
//! - native query (DOM selectors)
//! - protocol level (remote-debugging commands, needs a stable hint)
//! - vision / OCR
//! - manual coordinates (only with a recorded override, always last)
//!
//! The decision engine filters and orders the tiers per step; the
//! orchestrator runs them under per-tier timeouts and records every attempt.

pub mod decision;
pub mod errors;
pub mod orchestrator;
pub mod strategies;
pub mod tiers;
pub mod types;

pub use decision::{is_auto_generated_id, DecisionContext, DecisionEngine};
pub use errors::*;
pub use orchestrator::TieredOrchestrator;
pub use strategies::{StrategyProvider, StrategyRegistry};
pub use tiers::{TierOverride, TierPlan};
pub use types::*;
