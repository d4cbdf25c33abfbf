//! Decision engine: which tiers apply to a step, and in what order

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use soulbrowser_core_types::{ActionDescriptor, LocatorHint, StrategyTier};

use crate::tiers::TierPlan;

static HEX_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)[0-9a-f]{8,}$").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static FRAMEWORK_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(ember\d+|ext-gen\d+|ext-comp-\d+|yui_[\w-]*\d+|gwt-uid-\d+|mui-\d+|j_idt\d+[\w:]*|react-select-\d+[\w-]*|radix-[\w:-]+|headlessui-[\w-]+|cdk-[\w-]+-\d+|ng-[\w-]*\d+|css-[0-9a-z]{5,}|sc-[0-9a-zA-Z]{5,}|:r[0-9a-z]+:)$",
    )
    .unwrap()
});
static HASHED_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-_:]([0-9a-fA-F]{6,}|\d{4,})$").unwrap());

static SELECTOR_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([A-Za-z_][\w-]*)").unwrap());
static SELECTOR_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[\s*name\s*[~|^$*]?=\s*["']?([^"'\]]+)"#).unwrap());
static SELECTOR_TEST_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[\s*data-(?:testid|test-id|test|qa|cy)\s*=\s*["']?([^"'\]]+)"#).unwrap()
});

/// True when an element id looks machine-generated and will not survive a
/// re-render: pure hex hashes, pure digits, framework prefixes, or a hashed
/// numeric suffix.
pub fn is_auto_generated_id(id: &str) -> bool {
    let id = id.trim();
    if id.is_empty() {
        return true;
    }
    if HEX_HASH.is_match(id) || DIGITS.is_match(id) || FRAMEWORK_ID.is_match(id) {
        return true;
    }
    match HASHED_SUFFIX.captures(id) {
        // a suffix of plain letters like "-facade" is a word, not a hash
        Some(caps) => caps[1].chars().any(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Per-step routing facts. Derived for every execution, never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionContext {
    pub has_stable_id: bool,
    pub has_name: bool,
    pub has_test_id: bool,
    pub in_iframe: bool,
    pub in_shadow_root: bool,
    pub protocol_available: bool,
    pub has_manual_override: bool,
    pub failed_tiers: HashSet<StrategyTier>,
}

impl DecisionContext {
    pub fn for_step(action: &ActionDescriptor, protocol_available: bool) -> Self {
        let attributes = &action.attributes;
        let mut ctx = Self {
            has_stable_id: attributes
                .id
                .as_deref()
                .is_some_and(|id| !is_auto_generated_id(id)),
            has_name: attributes.name.as_deref().is_some_and(|n| !n.trim().is_empty()),
            has_test_id: attributes
                .test_id
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty()),
            in_iframe: attributes.in_iframe,
            in_shadow_root: attributes.in_shadow_root,
            protocol_available,
            has_manual_override: action.has_manual_override(),
            failed_tiers: HashSet::new(),
        };

        for hint in &action.hints {
            match hint {
                LocatorHint::Selector { selector } => {
                    if SELECTOR_ID
                        .captures_iter(selector)
                        .any(|caps| !is_auto_generated_id(&caps[1]))
                    {
                        ctx.has_stable_id = true;
                    }
                    if SELECTOR_NAME.is_match(selector) {
                        ctx.has_name = true;
                    }
                    if SELECTOR_TEST_ID.is_match(selector) {
                        ctx.has_test_id = true;
                    }
                }
                LocatorHint::Coordinates { .. } => ctx.has_manual_override = true,
                LocatorHint::Semantic { .. } => {}
            }
        }
        ctx
    }

    pub fn with_failed(mut self, tier: StrategyTier) -> Self {
        self.failed_tiers.insert(tier);
        self
    }

    /// Any hint the protocol tier can address directly.
    pub fn has_stable_hint(&self) -> bool {
        self.has_stable_id || self.has_name || self.has_test_id
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Ordered tier sequence for a step. Disabled tiers stay in the list;
    /// the orchestrator skips them.
    pub fn select_sequence(&self, ctx: &DecisionContext, plan: &TierPlan) -> Vec<StrategyTier> {
        let mut candidates = vec![StrategyTier::NativeQuery, StrategyTier::VisionOcr];
        if ctx.protocol_available && ctx.has_stable_hint() {
            candidates.push(StrategyTier::ProtocolLevel);
        }
        if ctx.has_manual_override {
            candidates.push(StrategyTier::ManualCoordinate);
        }
        candidates.retain(|tier| !ctx.failed_tiers.contains(tier));

        candidates.sort_by_key(|tier| {
            (
                *tier == StrategyTier::ManualCoordinate,
                plan.priority(*tier),
                *tier,
            )
        });
        candidates
    }
}
