//! DecisionMatrix document kind — matrix entries plus fallback defaults.

use serde::{Deserialize, Serialize};

use verdict_core::{Action, EventType, MatrixConfig, MatrixEntry, RiskBand};

use crate::schema::CommonMetadata;

// ── Document-level types ────────────────────────────────────────────

fn default_matrix_action() -> Action {
    Action::Review
}

fn default_max_fpr() -> f64 {
    0.01
}

/// Top-level DecisionMatrix document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    pub spec: MatrixSpec,
}

/// Specification section of a DecisionMatrix document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSpec {
    /// Action returned when no entry matches a lookup key.
    #[serde(default = "default_matrix_action")]
    pub default_action: Action,
    /// FPR budget reported with default decisions.
    #[serde(default = "default_max_fpr")]
    pub default_max_fpr: f64,
    #[serde(default)]
    pub entries: Vec<MatrixEntry>,
}

impl MatrixDocument {
    /// Flatten the document into a runtime [`MatrixConfig`].
    pub fn compile(&self) -> MatrixConfig {
        MatrixConfig {
            entries: self.spec.entries.clone(),
            default_action: self.spec.default_action,
            default_max_fpr: self.spec.default_max_fpr,
        }
    }

    /// Wrap a config back into a document, e.g. for exporting the live
    /// matrix to a file.
    pub fn from_config(id: &str, name: &str, config: &MatrixConfig) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "DecisionMatrix".to_string(),
            metadata: CommonMetadata {
                id: id.to_string(),
                name: name.to_string(),
                enabled: true,
                description: None,
                tags: None,
            },
            spec: MatrixSpec {
                default_action: config.default_action,
                default_max_fpr: config.default_max_fpr,
                entries: config.entries.clone(),
            },
        }
    }
}

// ── Flat import ─────────────────────────────────────────────────────

/// Import a matrix from flat JSON, the shape admin tooling submits.
///
/// Accepts either a bare entry list or an object
/// `{"entries": [...], "default_action": ..., "default_max_fpr": ...}`.
pub fn matrix_from_flat_json(value: &serde_json::Value) -> Result<MatrixConfig, String> {
    let (entries_value, default_action, default_max_fpr) = match value {
        serde_json::Value::Array(_) => (value, default_matrix_action(), default_max_fpr()),
        serde_json::Value::Object(map) => {
            let entries = map
                .get("entries")
                .ok_or_else(|| "matrix object is missing `entries`".to_string())?;
            let action = match map.get("default_action") {
                Some(raw) => serde_json::from_value(raw.clone())
                    .map_err(|e| format!("invalid default_action: {}", e))?,
                None => default_matrix_action(),
            };
            let fpr = match map.get("default_max_fpr") {
                Some(raw) => raw
                    .as_f64()
                    .ok_or_else(|| "default_max_fpr must be a number".to_string())?,
                None => default_max_fpr(),
            };
            (entries, action, fpr)
        }
        _ => return Err("matrix import expects a list or an object".to_string()),
    };

    let entries: Vec<MatrixEntry> = serde_json::from_value(entries_value.clone())
        .map_err(|e| format!("invalid matrix entries: {}", e))?;

    Ok(MatrixConfig {
        entries,
        default_action,
        default_max_fpr,
    })
}

// ── Built-in default matrix ─────────────────────────────────────────

fn entry(
    event_type: EventType,
    risk_band: RiskBand,
    segment: &str,
    action: Action,
    max_fpr: f64,
    confidence_threshold: f64,
    notes: &str,
) -> MatrixEntry {
    MatrixEntry {
        event_type,
        risk_band,
        customer_segment: segment.to_string(),
        action,
        max_fpr,
        confidence_threshold,
        notes: notes.to_string(),
    }
}

/// The built-in default matrix: login and payment cells for new and
/// returning users across the band range. Shipped verbatim as
/// `data/matrix/default.yml`.
pub fn default_matrix() -> MatrixConfig {
    MatrixConfig {
        entries: vec![
            entry(
                EventType::Login,
                RiskBand::Low,
                "new_user",
                Action::Allow,
                0.01,
                0.8,
                "New user login with low risk",
            ),
            entry(
                EventType::Login,
                RiskBand::Low,
                "returning",
                Action::Allow,
                0.005,
                0.9,
                "Returning user login with low risk",
            ),
            entry(
                EventType::Payment,
                RiskBand::Medium,
                "new_user",
                Action::StepUp,
                0.008,
                0.7,
                "New user payment with medium risk",
            ),
            entry(
                EventType::Payment,
                RiskBand::Medium,
                "returning",
                Action::Allow,
                0.003,
                0.8,
                "Returning user payment with medium risk",
            ),
            entry(
                EventType::Payment,
                RiskBand::High,
                "new_user",
                Action::Review,
                0.005,
                0.6,
                "New user payment with high risk",
            ),
            entry(
                EventType::Payment,
                RiskBand::High,
                "returning",
                Action::StepUp,
                0.002,
                0.7,
                "Returning user payment with high risk",
            ),
            entry(
                EventType::Payment,
                RiskBand::Critical,
                "new_user",
                Action::Deny,
                0.001,
                0.5,
                "New user payment with critical risk",
            ),
            entry(
                EventType::Payment,
                RiskBand::Critical,
                "returning",
                Action::Review,
                0.001,
                0.6,
                "Returning user payment with critical risk",
            ),
        ],
        default_action: Action::Review,
        default_max_fpr: 0.01,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
