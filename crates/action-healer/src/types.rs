//! Healing requests, provider proposals and responses

use std::fmt;

use serde::{Deserialize, Serialize};
use soulbrowser_core_types::{ActionDescriptor, ActionKind, BoundingBox, LocatorHint, SessionId};

/// Visual evidence captured from the page when a step failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub width: u32,
    pub height: u32,
}

impl Snapshot {
    pub fn png(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            mime: "image/png".to_string(),
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Identity of the page the step ran against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl PageContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealingRequest {
    pub action: ActionDescriptor,
    pub snapshot: Snapshot,
    pub page: PageContext,
    pub session_id: SessionId,
}

impl HealingRequest {
    pub fn new(action: ActionDescriptor, snapshot: Snapshot, page: PageContext) -> Self {
        Self {
            action,
            snapshot,
            page,
            session_id: SessionId::new(),
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }
}

/// Healing providers, in the order they are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingProviderKind {
    Cache,
    LocalHeuristic,
    RemoteVision,
}

impl HealingProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            HealingProviderKind::Cache => "cache",
            HealingProviderKind::LocalHeuristic => "local_heuristic",
            HealingProviderKind::RemoteVision => "remote_vision",
        }
    }
}

impl fmt::Display for HealingProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the caller should do with a healed locator. Ordered from least to
/// most aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealAction {
    NoAction,
    SuggestOnly,
    ApplyAndFlag,
    AutoApply,
}

impl HealAction {
    pub fn name(&self) -> &'static str {
        match self {
            HealAction::NoAction => "no_action",
            HealAction::SuggestOnly => "suggest_only",
            HealAction::ApplyAndFlag => "apply_and_flag",
            HealAction::AutoApply => "auto_apply",
        }
    }

    /// Whether the healed locator should be used in the page.
    pub fn applies(&self) -> bool {
        matches!(self, HealAction::AutoApply | HealAction::ApplyAndFlag)
    }
}

impl fmt::Display for HealAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorCandidate {
    pub locator: LocatorHint,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// What analyzers are asked to find in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisQuery {
    pub target_label: String,
    pub element_kind: ActionKind,
    pub expected_bounds: Option<BoundingBox>,
    pub hints: Vec<LocatorHint>,
}

impl AnalysisQuery {
    pub fn from_action(action: &ActionDescriptor) -> Self {
        Self {
            target_label: action.label.clone(),
            element_kind: action.kind,
            expected_bounds: action.bounds,
            hints: action.hints.clone(),
        }
    }
}

/// Analyzer answer, shared by the local and remote analyzers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub found: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub suggested_locator: Option<LocatorHint>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub alternatives: Vec<LocatorCandidate>,
}

impl AnalysisResult {
    pub fn found(locator: LocatorHint, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            found: true,
            confidence,
            suggested_locator: Some(locator),
            reasoning: reasoning.into(),
            alternatives: Vec::new(),
        }
    }

    pub fn not_found(reasoning: impl Into<String>) -> Self {
        Self {
            found: false,
            confidence: 0.0,
            suggested_locator: None,
            reasoning: reasoning.into(),
            alternatives: Vec::new(),
        }
    }
}

/// One provider's answer to a healing request.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub provider: HealingProviderKind,
    pub locator: Option<LocatorHint>,
    pub confidence: f64,
    pub reasoning: String,
    pub alternatives: Vec<LocatorCandidate>,
    pub cache_hit: bool,
    pub cost: f64,
}

impl Proposal {
    pub fn nothing(provider: HealingProviderKind, reasoning: impl Into<String>) -> Self {
        Self {
            provider,
            locator: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            alternatives: Vec::new(),
            cache_hit: false,
            cost: 0.0,
        }
    }

    pub fn from_analysis(provider: HealingProviderKind, result: AnalysisResult) -> Self {
        let locator = if result.found {
            result.suggested_locator
        } else {
            None
        };
        Self {
            provider,
            confidence: if locator.is_some() { result.confidence } else { 0.0 },
            locator,
            reasoning: result.reasoning,
            alternatives: result.alternatives,
            cache_hit: false,
            cost: 0.0,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealingResponse {
    pub success: bool,
    pub provider: Option<HealingProviderKind>,
    pub suggested_locator: Option<LocatorHint>,
    pub confidence: f64,
    pub reasoning: String,
    pub alternatives: Vec<LocatorCandidate>,
    pub elapsed_ms: u64,
    pub action: HealAction,
    pub cache_hit: bool,
    pub estimated_cost: f64,
}

impl HealingResponse {
    pub fn failed(reasoning: impl Into<String>, alternatives: Vec<LocatorCandidate>) -> Self {
        Self {
            success: false,
            provider: None,
            suggested_locator: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            alternatives,
            elapsed_ms: 0,
            action: HealAction::NoAction,
            cache_hit: false,
            estimated_cost: 0.0,
        }
    }
}
