//! Shared primitives for the replay engine.
//!
//! Everything a recorded step carries lives here so the locator, the healer
//! and the CLI agree on one vocabulary: the [`ActionDescriptor`] itself, its
//! [`LocatorHint`]s, and the ordered [`StrategyTier`] enum.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Shared error type for the replay crates.
#[derive(Debug, Error, Clone)]
pub enum SoulError {
    #[error("{message}")]
    Message { message: String },
}

impl SoulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct StepId(pub String);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolution technique, declared in reliability-first order.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum StrategyTier {
    /// Direct DOM query by selector or semantic descriptor
    NativeQuery,
    /// Remote-debugging-protocol round-trips
    ProtocolLevel,
    /// Screenshot + OCR/vision matching
    VisionOcr,
    /// Recorded absolute coordinates, last resort
    ManualCoordinate,
}

impl StrategyTier {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyTier::NativeQuery => "native_query",
            StrategyTier::ProtocolLevel => "protocol_level",
            StrategyTier::VisionOcr => "vision_ocr",
            StrategyTier::ManualCoordinate => "manual_coordinate",
        }
    }

    pub fn all() -> [StrategyTier; 4] {
        [
            StrategyTier::NativeQuery,
            StrategyTier::ProtocolLevel,
            StrategyTier::VisionOcr,
            StrategyTier::ManualCoordinate,
        ]
    }

    pub fn parse(raw: &str) -> Option<StrategyTier> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        StrategyTier::all()
            .into_iter()
            .find(|tier| tier.name() == normalized)
    }
}

impl fmt::Display for StrategyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic kind of a recorded step.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ActionKind {
    Open,
    Navigate,
    Click,
    DoubleClick,
    RightClick,
    Hover,
    Type,
    Select,
    Scroll,
    Wait,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Open => "open",
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::RightClick => "right_click",
            ActionKind::Hover => "hover",
            ActionKind::Type => "type",
            ActionKind::Select => "select",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait => "wait",
        }
    }

    /// Navigation is performed, never resolved against an element.
    pub fn is_navigation(&self) -> bool {
        matches!(self, ActionKind::Open | ActionKind::Navigate)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }
}

/// One way of finding the element a step targets.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde-full",
    serde(tag = "type", rename_all = "snake_case")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum LocatorHint {
    /// Structural selector (CSS or XPath)
    Selector { selector: String },
    /// Accessibility role and accessible name
    Semantic {
        role: Option<String>,
        name: Option<String>,
    },
    /// Absolute viewport coordinates
    Coordinates { x: f64, y: f64 },
}

impl LocatorHint {
    pub fn selector(selector: impl Into<String>) -> Self {
        LocatorHint::Selector {
            selector: selector.into(),
        }
    }

    pub fn semantic(role: impl Into<String>, name: impl Into<String>) -> Self {
        LocatorHint::Semantic {
            role: Some(role.into()),
            name: Some(name.into()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LocatorHint::Selector { .. } => "css",
            LocatorHint::Semantic { .. } => "aria",
            LocatorHint::Coordinates { .. } => "xy",
        }
    }
}

impl fmt::Display for LocatorHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorHint::Selector { selector } => write!(f, "css:{}", selector),
            LocatorHint::Semantic { role, name } => write!(
                f,
                "aria:{}/{}",
                role.as_deref().unwrap_or("*"),
                name.as_deref().unwrap_or("*")
            ),
            LocatorHint::Coordinates { x, y } => write!(f, "xy:{},{}", x, y),
        }
    }
}

/// Identifying attributes captured alongside the locator hints.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(default))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementAttributes {
    pub id: Option<String>,
    pub name: Option<String>,
    pub test_id: Option<String>,
    /// Element lives inside an embedded document (iframe)
    pub in_iframe: bool,
    /// Element lives behind a component boundary (shadow root)
    pub in_shadow_root: bool,
}

/// Opaque handle to an element a strategy resolved.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ElementHandle {
    pub id: String,
    pub bounds: Option<BoundingBox>,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bounds: None,
        }
    }
}

/// Trace left on a step when a healed locator was applied to it.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct HealingAnnotation {
    pub original: Option<LocatorHint>,
    pub healed: LocatorHint,
    pub provider: String,
    pub confidence: f64,
    pub action: String,
    pub recorded_at_ms: i64,
}

/// A recorded step.
///
/// Descriptors are immutable once recorded; the only change the replay
/// engine makes is [`ActionDescriptor::healed_with`], which returns a new
/// descriptor carrying the healed locator and an annotation.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ActionDescriptor {
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub id: StepId,
    pub kind: ActionKind,
    pub label: String,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub hints: Vec<LocatorHint>,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub attributes: ElementAttributes,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub bounds: Option<BoundingBox>,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub manual_override: Option<Point>,
    /// Text to type or option to select
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub value: Option<String>,
    /// Target of navigation steps
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub url: Option<String>,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub annotations: Vec<HealingAnnotation>,
}

impl ActionDescriptor {
    pub fn new(kind: ActionKind, label: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            kind,
            label: label.into(),
            hints: Vec::new(),
            attributes: ElementAttributes::default(),
            bounds: None,
            manual_override: None,
            value: None,
            url: None,
            annotations: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = StepId(id.into());
        self
    }

    pub fn with_hint(mut self, hint: LocatorHint) -> Self {
        self.hints.push(hint);
        self
    }

    pub fn with_attributes(mut self, attributes: ElementAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_manual_override(mut self, point: Point) -> Self {
        self.manual_override = Some(point);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The locator the step was recorded with (first hint).
    pub fn primary_locator(&self) -> Option<&LocatorHint> {
        self.hints.first()
    }

    pub fn has_manual_override(&self) -> bool {
        self.manual_override.is_some()
    }

    /// Copy of this step with `annotation.healed` promoted to primary locator.
    pub fn healed_with(&self, annotation: HealingAnnotation) -> ActionDescriptor {
        let mut healed = self.clone();
        healed.hints.retain(|hint| hint != &annotation.healed);
        healed.hints.insert(0, annotation.healed.clone());
        healed.annotations.push(annotation);
        healed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_tier_order_is_reliability_first() {
        let tiers = StrategyTier::all();
        assert!(tiers.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(StrategyTier::parse("vision-ocr"), Some(StrategyTier::VisionOcr));
        assert_eq!(StrategyTier::parse("bogus"), None);
    }

    #[test]
    fn locator_hint_display() {
        assert_eq!(LocatorHint::selector("#submit").to_string(), "css:#submit");
        assert_eq!(
            LocatorHint::semantic("button", "Save").to_string(),
            "aria:button/Save"
        );
        let partial = LocatorHint::Semantic {
            role: None,
            name: Some("Save".into()),
        };
        assert_eq!(partial.to_string(), "aria:*/Save");
    }

    #[test]
    fn healed_with_promotes_locator_and_keeps_original() {
        let original = ActionDescriptor::new(ActionKind::Click, "Save")
            .with_hint(LocatorHint::selector("#save-42"))
            .with_hint(LocatorHint::semantic("button", "Save"));
        let healed_hint = LocatorHint::selector("button.save");
        let healed = original.healed_with(HealingAnnotation {
            original: original.primary_locator().cloned(),
            healed: healed_hint.clone(),
            provider: "cache".into(),
            confidence: 0.9,
            action: "auto_apply".into(),
            recorded_at_ms: 0,
        });

        assert_eq!(healed.primary_locator(), Some(&healed_hint));
        assert_eq!(healed.hints.len(), 3);
        assert_eq!(healed.annotations.len(), 1);
        assert!(original.annotations.is_empty());
        assert_eq!(healed.id, original.id);
    }

    #[test]
    fn navigation_kinds() {
        assert!(ActionKind::Open.is_navigation());
        assert!(ActionKind::Navigate.is_navigation());
        assert!(!ActionKind::Click.is_navigation());
    }

    #[cfg(feature = "serde-full")]
    #[test]
    fn descriptor_deserializes_with_defaults() {
        let raw = r#"{
            "kind": "click",
            "label": "Checkout",
            "hints": [{"type": "selector", "selector": "[data-testid=checkout]"}],
            "attributes": {"test_id": "checkout"}
        }"#;
        let step: ActionDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(step.kind, ActionKind::Click);
        assert_eq!(step.attributes.test_id.as_deref(), Some("checkout"));
        assert!(step.manual_override.is_none());
        assert!(!step.id.0.is_empty());
    }
}
