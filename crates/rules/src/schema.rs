//! Document schema types with serde deserialization.
//!
//! Defines the type hierarchy for configuration documents:
//! - `DocumentEnvelope`: lightweight first-pass header (apiVersion, kind, metadata)
//! - `RuleDocument`: enum dispatching to kind-specific document types
//! - Compiled runtime types: [`RuleDefinition`], [`CompositionDefinition`], [`RuleSet`]
//!
//! A detection rule's evaluator kind is deliberately an open string and its
//! conditions an opaque JSON map: unknown kinds or malformed conditions must
//! degrade to non-firing diagnostics at evaluation time, not fail at load.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use verdict_core::Action;

// ── Document kind enum ──────────────────────────────────────────────

/// Supported document kinds for two-pass deserialization dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    DetectionRule,
    Composition,
    DecisionMatrix,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::DetectionRule => write!(f, "DetectionRule"),
            DocumentKind::Composition => write!(f, "Composition"),
            DocumentKind::DecisionMatrix => write!(f, "DecisionMatrix"),
        }
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "DetectionRule" => Ok(DocumentKind::DetectionRule),
            "Composition" => Ok(DocumentKind::Composition),
            "DecisionMatrix" => Ok(DocumentKind::DecisionMatrix),
            other => Err(format!("unknown document kind: '{}'", other)),
        }
    }
}

// ── Common metadata ─────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

/// Metadata block shared by all document kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonMetadata {
    /// Unique ID within the rules directory; doubles as the rule name.
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

// ── Document envelope (first-pass) ──────────────────────────────────

/// Lightweight first-pass deserializer that reads only the header fields.
///
/// Used during two-pass loading: first extract `kind` to determine the
/// concrete type, then deserialize the full document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEnvelope {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    /// Remaining fields captured as raw YAML for second-pass deserialization.
    #[serde(flatten)]
    pub rest: serde_yaml::Value,
}

impl DocumentEnvelope {
    /// Parse the `kind` field into a typed [`DocumentKind`].
    pub fn document_kind(&self) -> std::result::Result<DocumentKind, String> {
        self.kind.parse()
    }

    /// Two-pass: reconstruct the full YAML and deserialize into the concrete type.
    pub fn parse_full(&self) -> std::result::Result<RuleDocument, String> {
        let yaml = serde_yaml::to_string(self).map_err(|e| e.to_string())?;
        match self.document_kind()? {
            DocumentKind::DetectionRule => {
                let doc: DetectionRuleDocument =
                    serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?;
                Ok(RuleDocument::Rule(doc))
            }
            DocumentKind::Composition => {
                let doc: CompositionDocument =
                    serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?;
                Ok(RuleDocument::Composition(doc))
            }
            DocumentKind::DecisionMatrix => {
                let doc: crate::matrix_doc::MatrixDocument =
                    serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?;
                Ok(RuleDocument::Matrix(doc))
            }
        }
    }
}

// ── Rule document (multi-kind container) ────────────────────────────

/// A fully deserialized document of any supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleDocument {
    /// Single detection rule (rate limit, velocity, device, keyword, ...).
    Rule(DetectionRuleDocument),
    /// Boolean combinator over named rules.
    Composition(CompositionDocument),
    /// Decision matrix entries plus fallback defaults.
    Matrix(crate::matrix_doc::MatrixDocument),
}

impl RuleDocument {
    /// Get the document's metadata regardless of kind.
    pub fn metadata(&self) -> &CommonMetadata {
        match self {
            RuleDocument::Rule(doc) => &doc.metadata,
            RuleDocument::Composition(doc) => &doc.metadata,
            RuleDocument::Matrix(doc) => &doc.metadata,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            RuleDocument::Rule(_) => DocumentKind::DetectionRule,
            RuleDocument::Composition(_) => DocumentKind::Composition,
            RuleDocument::Matrix(_) => DocumentKind::DecisionMatrix,
        }
    }

    pub fn as_rule(&self) -> Option<&DetectionRuleDocument> {
        match self {
            RuleDocument::Rule(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_composition(&self) -> Option<&CompositionDocument> {
        match self {
            RuleDocument::Composition(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&crate::matrix_doc::MatrixDocument> {
        match self {
            RuleDocument::Matrix(doc) => Some(doc),
            _ => None,
        }
    }
}

// ── Detection rule documents ────────────────────────────────────────

fn default_rule_action() -> Action {
    Action::Review
}

fn empty_conditions() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Top-level DetectionRule document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRuleDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    pub spec: DetectionRuleSpec,
}

/// Specification section of a DetectionRule document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRuleSpec {
    /// Evaluator kind; open string matched against the engine registry.
    pub kind: String,
    /// Kind-specific condition parameters, deserialized by the evaluator.
    #[serde(default = "empty_conditions")]
    pub conditions: serde_json::Value,
    /// Action suggested when the rule fires. Informational only; the
    /// decision matrix makes the final call.
    #[serde(default = "default_rule_action")]
    pub action: Action,
    /// Higher priority rules surface first in diagnostics.
    #[serde(default)]
    pub priority: i32,
}

impl DetectionRuleDocument {
    /// Flatten the document into a runtime [`RuleDefinition`].
    pub fn compile(&self) -> RuleDefinition {
        RuleDefinition {
            name: self.metadata.id.clone(),
            kind: self.spec.kind.clone(),
            conditions: self.spec.conditions.clone(),
            action: self.spec.action,
            priority: self.spec.priority,
            enabled: self.metadata.enabled,
            description: self.metadata.description.clone().unwrap_or_default(),
        }
    }
}

// ── Composition documents ───────────────────────────────────────────

/// Boolean combinators for rule compositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// Fires only when every member fired; risk = max of member risks.
    And,
    /// Fires when any member fired; risk = max of fired members.
    Or,
    /// Fires when more than half the members fired; risk = mean of fired.
    Majority,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::And => write!(f, "AND"),
            Combinator::Or => write!(f, "OR"),
            Combinator::Majority => write!(f, "MAJORITY"),
        }
    }
}

/// Top-level Composition document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    pub spec: CompositionSpec,
}

/// Specification section of a Composition document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionSpec {
    pub operator: Combinator,
    /// Member rule (or earlier composition) names, evaluated in order.
    pub members: Vec<String>,
    #[serde(default)]
    pub priority: i32,
}

impl CompositionDocument {
    /// Flatten the document into a runtime [`CompositionDefinition`].
    pub fn compile(&self) -> CompositionDefinition {
        CompositionDefinition {
            name: self.metadata.id.clone(),
            operator: self.spec.operator,
            members: self.spec.members.clone(),
            priority: self.spec.priority,
            enabled: self.metadata.enabled,
            description: self.metadata.description.clone().unwrap_or_default(),
        }
    }
}

// ── Compiled runtime types ──────────────────────────────────────────

/// Known evaluator kinds shipped with the engine.
///
/// The runtime registry is keyed by string so projects can register
/// custom evaluators; this enum exists for validation and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    RateLimit,
    Velocity,
    Device,
    Keyword,
    Geolocation,
    Behavior,
    Amount,
}

impl RuleKind {
    pub const ALL: [RuleKind; 7] = [
        RuleKind::RateLimit,
        RuleKind::Velocity,
        RuleKind::Device,
        RuleKind::Keyword,
        RuleKind::Geolocation,
        RuleKind::Behavior,
        RuleKind::Amount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::RateLimit => "rate_limit",
            RuleKind::Velocity => "velocity",
            RuleKind::Device => "device",
            RuleKind::Keyword => "keyword",
            RuleKind::Geolocation => "geolocation",
            RuleKind::Behavior => "behavior",
            RuleKind::Amount => "amount",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "rate_limit" => Ok(RuleKind::RateLimit),
            "velocity" => Ok(RuleKind::Velocity),
            "device" => Ok(RuleKind::Device),
            // "custom" is the historical name for the keyword screen.
            "keyword" | "custom" => Ok(RuleKind::Keyword),
            "geolocation" => Ok(RuleKind::Geolocation),
            "behavior" => Ok(RuleKind::Behavior),
            "amount" => Ok(RuleKind::Amount),
            other => Err(format!("unknown rule kind: '{}'", other)),
        }
    }
}

/// A flat, runtime-ready detection rule. Configuration data, not code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    pub kind: String,
    #[serde(default = "empty_conditions")]
    pub conditions: serde_json::Value,
    #[serde(default = "default_rule_action")]
    pub action: Action,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

impl RuleDefinition {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            conditions: empty_conditions(),
            action: Action::Review,
            priority: 0,
            enabled: true,
            description: String::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: serde_json::Value) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A flat, runtime-ready composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionDefinition {
    pub name: String,
    pub operator: Combinator,
    pub members: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

impl CompositionDefinition {
    pub fn new(
        name: impl Into<String>,
        operator: Combinator,
        members: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            operator,
            members,
            priority: 0,
            enabled: true,
            description: String::new(),
        }
    }
}

/// Rules and compositions compiled for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<RuleDefinition>,
    pub compositions: Vec<CompositionDefinition>,
}

impl RuleSet {
    /// Compile every rule/composition document, skipping matrix documents.
    ///
    /// Disabled documents are compiled too; the pipeline filters on the
    /// enabled flag so tooling can still inspect them.
    pub fn from_documents<'a>(docs: impl IntoIterator<Item = &'a RuleDocument>) -> Self {
        let mut set = RuleSet::default();
        for doc in docs {
            match doc {
                RuleDocument::Rule(rule) => set.rules.push(rule.compile()),
                RuleDocument::Composition(comp) => set.compositions.push(comp.compile()),
                RuleDocument::Matrix(_) => {}
            }
        }
        set
    }

    /// Look up a rule by name.
    pub fn rule(&self, name: &str) -> Option<&RuleDefinition> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.compositions.is_empty()
    }

    /// All rule and composition names, rules first.
    pub fn names(&self) -> Vec<&str> {
        self.rules
            .iter()
            .map(|r| r.name.as_str())
            .chain(self.compositions.iter().map(|c| c.name.as_str()))
            .collect()
    }
}

/// Parse a flat JSON config of the shape `{"rules": [...], "compositions": [...]}`
/// into a [`RuleSet`]. Entries that fail to deserialize are skipped and
/// reported back as (index, error) pairs.
pub fn rule_set_from_flat_json(
    value: &serde_json::Value,
) -> (RuleSet, Vec<(usize, String)>) {
    let mut set = RuleSet::default();
    let mut failures = Vec::new();

    let rules = value.get("rules").and_then(|v| v.as_array());
    for (idx, raw) in rules.into_iter().flatten().enumerate() {
        match serde_json::from_value::<RuleDefinition>(raw.clone()) {
            Ok(rule) => set.rules.push(rule),
            Err(e) => failures.push((idx, e.to_string())),
        }
    }

    let comps = value.get("compositions").and_then(|v| v.as_array());
    for (idx, raw) in comps.into_iter().flatten().enumerate() {
        match serde_json::from_value::<CompositionDefinition>(raw.clone()) {
            Ok(comp) => set.compositions.push(comp),
            Err(e) => failures.push((idx, e.to_string())),
        }
    }

    (set, failures)
}

// ── Tests ───────────────────────────────────────────────────────────
