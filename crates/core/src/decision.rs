//! Decision-side contracts: actions, risk bands, rule results, the
//! decision matrix configuration, and the final verdict.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VerdictError;
use crate::event::EventType;

/// Clamp a score to the unit interval. NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ── Action ──────────────────────────────────────────────────────────

/// Verdict actions, from least to most disruptive for legitimate users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allow,
    Deny,
    Review,
    /// Require additional verification (e.g. a challenge) before allowing.
    StepUp,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Deny => "deny",
            Action::Review => "review",
            Action::StepUp => "step_up",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = VerdictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Action::Allow),
            "deny" => Ok(Action::Deny),
            "review" => Ok(Action::Review),
            "step_up" => Ok(Action::StepUp),
            other => Err(VerdictError::UnknownAction(other.to_string())),
        }
    }
}

// ── Risk band ───────────────────────────────────────────────────────

/// Ordinal classification of an aggregate risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    /// Accepts the legacy `med` label still found in older matrix exports.
    #[serde(alias = "med")]
    Medium,
    High,
    Critical,
}

impl RiskBand {
    /// Classify a score into a band.
    ///
    /// Boundaries are half-open: `[0,0.3)` low, `[0.3,0.6)` medium,
    /// `[0.6,0.8)` high, `[0.8,1.0]` critical. Input is clamped first.
    pub fn from_score(score: f64) -> Self {
        let s = clamp_unit(score);
        if s < 0.3 {
            RiskBand::Low
        } else if s < 0.6 {
            RiskBand::Medium
        } else if s < 0.8 {
            RiskBand::High
        } else {
            RiskBand::Critical
        }
    }

    /// Nominal score for the band, used to derive confidence as
    /// `1 - band_score`.
    pub fn band_score(&self) -> f64 {
        match self {
            RiskBand::Low => 0.2,
            RiskBand::Medium => 0.5,
            RiskBand::High => 0.7,
            RiskBand::Critical => 0.9,
        }
    }

    /// Ordinal rank, low = 0.
    pub fn rank(&self) -> u8 {
        match self {
            RiskBand::Low => 0,
            RiskBand::Medium => 1,
            RiskBand::High => 2,
            RiskBand::Critical => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Low => "low",
            RiskBand::Medium => "medium",
            RiskBand::High => "high",
            RiskBand::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskBand {
    type Err = VerdictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskBand::Low),
            // "med" is the legacy label still found in older matrix exports.
            "medium" | "med" => Ok(RiskBand::Medium),
            "high" => Ok(RiskBand::High),
            "critical" => Ok(RiskBand::Critical),
            other => Err(VerdictError::UnknownRiskBand(other.to_string())),
        }
    }
}

// ── Rule result ─────────────────────────────────────────────────────

/// Outcome of evaluating one rule or composition against a context.
///
/// Constructed through [`RuleResult::fire`] / [`RuleResult::pass`], which
/// enforce the invariants: risk is clamped to [0, 1] and a non-fired
/// result always carries risk 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub fired: bool,
    /// Human-readable explanation, also used for diagnostics on
    /// non-firing results.
    pub reason: String,
    /// Risk contribution in [0, 1]; exactly 0 when not fired.
    pub risk: f64,
    /// Name of the rule or composition that produced this result.
    pub rule_name: String,
}

impl RuleResult {
    /// A fired result with a clamped risk contribution.
    pub fn fire(rule_name: impl Into<String>, reason: impl Into<String>, risk: f64) -> Self {
        Self {
            fired: true,
            reason: reason.into(),
            risk: clamp_unit(risk),
            rule_name: rule_name.into(),
        }
    }

    /// A non-firing result; the reason doubles as the diagnostic.
    pub fn pass(rule_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            fired: false,
            reason: reason.into(),
            risk: 0.0,
            rule_name: rule_name.into(),
        }
    }
}

// ── Decision matrix configuration ───────────────────────────────────

fn default_confidence_threshold() -> f64 {
    0.8
}

/// One cell of the decision matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub event_type: EventType,
    pub risk_band: RiskBand,
    pub customer_segment: String,
    pub action: Action,
    /// Maximum tolerable false-positive rate before escalation kicks in.
    pub max_fpr: f64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub notes: String,
}

impl MatrixEntry {
    /// Composite lookup key for this entry.
    pub fn key(&self) -> String {
        matrix_key(self.event_type, self.risk_band, &self.customer_segment)
    }
}

/// Composite lookup key `event_type:risk_band:customer_segment`.
pub fn matrix_key(event_type: EventType, band: RiskBand, segment: &str) -> String {
    format!("{}:{}:{}", event_type, band, segment)
}

/// Full matrix configuration: entries plus the fallback defaults used
/// when no entry matches a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixConfig {
    pub entries: Vec<MatrixEntry>,
    pub default_action: Action,
    pub default_max_fpr: f64,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            default_action: Action::Review,
            default_max_fpr: 0.01,
        }
    }
}

// ── Decision result ─────────────────────────────────────────────────

/// The final verdict: the sole externally visible output of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub action: Action,
    /// Confidence in the action, in [0, 1].
    pub confidence: f64,
    /// Aggregate risk score in [0, 1].
    pub risk_score: f64,
    /// Matrix-derived reasons first, then fired-rule reasons.
    pub reasons: Vec<String>,
    /// Names of fired rules and compositions, matrix-derived names first.
    pub rules_fired: Vec<String>,
    /// Matrix key, risk band, segment, default/escalation flags, etc.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

// ── Tests ───────────────────────────────────────────────────────────
