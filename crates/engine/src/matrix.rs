//! Decision matrix runtime: O(1) keyed lookup with copy-on-write reloads.
//!
//! The live matrix is an immutable index behind an `Arc`. Readers clone
//! the `Arc` and do their lookups lock-free on a consistent snapshot;
//! every mutation (reload, insert, remove) builds a fresh index and swaps
//! the pointer, so a concurrent reader never observes a partial matrix.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use tracing::info;

use verdict_core::{
    clamp_unit, matrix_key, Action, DecisionResult, EventContext, EventType, MatrixConfig,
    MatrixEntry, Result, RiskBand, VerdictError,
};

// ── Immutable index ─────────────────────────────────────────────────

/// A compiled, immutable snapshot of the matrix configuration.
#[derive(Debug)]
pub struct MatrixIndex {
    /// Composite key → entry, in configuration order.
    entries: IndexMap<String, MatrixEntry>,
    default_action: Action,
    default_max_fpr: f64,
}

impl MatrixIndex {
    /// Build the lookup index. Duplicate composite keys are a
    /// configuration error.
    pub fn build(config: &MatrixConfig) -> Result<Self> {
        let mut entries = IndexMap::with_capacity(config.entries.len());
        for entry in &config.entries {
            let key = entry.key();
            if entries.insert(key.clone(), entry.clone()).is_some() {
                return Err(VerdictError::DuplicateMatrixKey(key));
            }
        }
        Ok(Self {
            entries,
            default_action: config.default_action,
            default_max_fpr: config.default_max_fpr,
        })
    }

    pub fn get(&self, key: &str) -> Option<&MatrixEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Runtime handle ──────────────────────────────────────────────────

/// Shared, hot-swappable decision matrix.
#[derive(Debug)]
pub struct DecisionMatrix {
    index: RwLock<Arc<MatrixIndex>>,
}

impl DecisionMatrix {
    pub fn new(config: &MatrixConfig) -> Result<Self> {
        Ok(Self {
            index: RwLock::new(Arc::new(MatrixIndex::build(config)?)),
        })
    }

    /// Current snapshot; the returned `Arc` stays valid across reloads.
    pub fn snapshot(&self) -> Arc<MatrixIndex> {
        self.index.read().expect("matrix lock poisoned").clone()
    }

    /// Replace the whole matrix. Readers keep their old snapshot until
    /// their next lookup; nobody sees a half-applied config.
    pub fn reload(&self, config: &MatrixConfig) -> Result<()> {
        let next = Arc::new(MatrixIndex::build(config)?);
        let count = next.len();
        *self.index.write().expect("matrix lock poisoned") = next;
        info!(entries = count, "reloaded decision matrix");
        Ok(())
    }

    /// Upsert a single entry at runtime.
    pub fn insert_entry(&self, entry: MatrixEntry) {
        let key = entry.key();
        let mut guard = self.index.write().expect("matrix lock poisoned");
        let mut entries = guard.entries.clone();
        entries.insert(key.clone(), entry);
        *guard = Arc::new(MatrixIndex {
            entries,
            default_action: guard.default_action,
            default_max_fpr: guard.default_max_fpr,
        });
        info!(key = %key, "inserted matrix entry");
    }

    /// Remove an entry at runtime. Returns whether an entry existed.
    pub fn remove_entry(&self, event_type: EventType, band: RiskBand, segment: &str) -> bool {
        let key = matrix_key(event_type, band, segment);
        let mut guard = self.index.write().expect("matrix lock poisoned");
        let mut entries = guard.entries.clone();
        let removed = entries.shift_remove(&key).is_some();
        if removed {
            *guard = Arc::new(MatrixIndex {
                entries,
                default_action: guard.default_action,
                default_max_fpr: guard.default_max_fpr,
            });
            info!(key = %key, "removed matrix entry");
        }
        removed
    }

    /// Export the live configuration, in entry order.
    pub fn export(&self) -> MatrixConfig {
        let index = self.snapshot();
        MatrixConfig {
            entries: index.entries.values().cloned().collect(),
            default_action: index.default_action,
            default_max_fpr: index.default_max_fpr,
        }
    }

    /// Look up the configured decision for (event type, band, segment).
    ///
    /// Missing entry → the configured default action. Present entry whose
    /// FPR budget is blown by `current_fpr` → escalate to review. The
    /// returned result carries the band's nominal score as `risk_score`;
    /// the orchestrator overwrites it with the aggregate.
    pub fn decide(
        &self,
        event: &EventContext,
        band: RiskBand,
        segment: &str,
        current_fpr: f64,
    ) -> DecisionResult {
        let index = self.snapshot();
        let key = matrix_key(event.event_type, band, segment);

        match index.get(&key) {
            None => default_decision(&index, event, band, segment, key),
            Some(entry) if current_fpr > entry.max_fpr => {
                escalation_decision(entry, band, current_fpr, key)
            }
            Some(entry) => normal_decision(entry, event, band, segment, key),
        }
    }
}

// ── Decision constructors ───────────────────────────────────────────

fn base_metadata(key: &str, band: RiskBand) -> serde_json::Map<String, serde_json::Value> {
    let mut metadata = serde_json::Map::new();
    metadata.insert("matrix_key".to_string(), key.into());
    metadata.insert("risk_band".to_string(), band.as_str().into());
    metadata
}

fn default_decision(
    index: &MatrixIndex,
    event: &EventContext,
    band: RiskBand,
    segment: &str,
    key: String,
) -> DecisionResult {
    let mut metadata = base_metadata(&key, band);
    metadata.insert("customer_segment".to_string(), segment.into());
    metadata.insert("is_default".to_string(), true.into());

    DecisionResult {
        action: index.default_action,
        confidence: clamp_unit(1.0 - band.band_score()),
        risk_score: band.band_score(),
        reasons: vec![
            format!("Using default decision for {}", event.event_type),
            format!("Risk band: {}", band),
            format!("Customer segment: {}", segment),
            format!("Max FPR: {:.3}", index.default_max_fpr),
        ],
        rules_fired: vec!["default_decision".to_string()],
        metadata,
    }
}

fn escalation_decision(
    entry: &MatrixEntry,
    band: RiskBand,
    current_fpr: f64,
    key: String,
) -> DecisionResult {
    let mut metadata = base_metadata(&key, band);
    metadata.insert("original_action".to_string(), entry.action.as_str().into());
    metadata.insert("fpr_threshold".to_string(), entry.max_fpr.into());
    metadata.insert("current_fpr".to_string(), current_fpr.into());
    metadata.insert("is_escalation".to_string(), true.into());

    DecisionResult {
        action: Action::Review,
        confidence: 0.8,
        risk_score: band.band_score(),
        reasons: vec![
            format!(
                "FPR {:.3} exceeds threshold {:.3}",
                current_fpr, entry.max_fpr
            ),
            format!("Escalating {} to review", entry.action),
        ],
        rules_fired: vec!["fpr_escalation".to_string()],
        metadata,
    }
}

fn normal_decision(
    entry: &MatrixEntry,
    event: &EventContext,
    band: RiskBand,
    segment: &str,
    key: String,
) -> DecisionResult {
    let mut metadata = base_metadata(&key, band);
    metadata.insert("customer_segment".to_string(), segment.into());
    metadata.insert(
        "confidence_threshold".to_string(),
        entry.confidence_threshold.into(),
    );
    metadata.insert("is_normal".to_string(), true.into());

    DecisionResult {
        action: entry.action,
        confidence: clamp_unit(1.0 - band.band_score()),
        risk_score: band.band_score(),
        reasons: vec![
            format!("Risk band: {}", band),
            format!("Customer segment: {}", segment),
            format!("Action: {}", entry.action),
            format!("Max FPR: {:.3}", entry.max_fpr),
            format!("Confidence threshold: {:.3}", entry.confidence_threshold),
        ],
        rules_fired: vec![format!("matrix_{}_{}", event.event_type, band)],
        metadata,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_rules::default_matrix;

    fn matrix() -> DecisionMatrix {
        DecisionMatrix::new(&default_matrix()).unwrap()
    }

    fn payment() -> EventContext {
        EventContext::new(EventType::Payment, "proj-1")
    }

    #[test]
    fn duplicate_keys_rejected_at_build() {
        let mut config = default_matrix();
        config.entries.push(config.entries[0].clone());

        let err = DecisionMatrix::new(&config).unwrap_err();
        assert!(matches!(err, VerdictError::DuplicateMatrixKey(_)));
    }

    #[test]
    fn normal_decision_returns_entry_action() {
        let decision = matrix().decide(&payment(), RiskBand::Critical, "new_user", 0.0005);
        assert_eq!(decision.action, Action::Deny);
        // Critical band score 0.9 → confidence 0.1.
        assert!((decision.confidence - 0.1).abs() < 1e-9);
        assert_eq!(
            decision.metadata.get("is_normal"),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(
            decision.metadata.get("matrix_key").and_then(|v| v.as_str()),
            Some("payment:critical:new_user")
        );
    }

    #[test]
    fn fpr_breach_escalates_to_review() {
        // Entry says deny with max_fpr 0.001; live FPR 0.01 forces review.
        let decision = matrix().decide(&payment(), RiskBand::Critical, "new_user", 0.01);
        assert_eq!(decision.action, Action::Review);
        assert_eq!(decision.confidence, 0.8);
        assert_eq!(
            decision.metadata.get("is_escalation"),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(
            decision
                .metadata
                .get("original_action")
                .and_then(|v| v.as_str()),
            Some("deny")
        );
        assert!(decision.reasons[0].contains("exceeds threshold"));
    }

    #[test]
    fn missing_entry_uses_default() {
        let checkout = EventContext::new(EventType::Checkout, "proj-1");
        let decision = matrix().decide(&checkout, RiskBand::Low, "new_user", 0.001);
        assert_eq!(decision.action, Action::Review);
        assert_eq!(
            decision.metadata.get("is_default"),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(decision.rules_fired, vec!["default_decision"]);
        // Low band score 0.2 → confidence 0.8.
        assert!((decision.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn reload_swaps_whole_matrix() {
        let m = matrix();
        let before = m.snapshot();
        assert_eq!(before.len(), 8);

        m.reload(&MatrixConfig::default()).unwrap();
        assert!(m.snapshot().is_empty());
        // The old snapshot is still a consistent view.
        assert_eq!(before.len(), 8);
    }

    #[test]
    fn reload_rejecting_bad_config_keeps_old_matrix() {
        let m = matrix();
        let mut bad = default_matrix();
        bad.entries.push(bad.entries[0].clone());

        assert!(m.reload(&bad).is_err());
        assert_eq!(m.snapshot().len(), 8);
    }

    #[test]
    fn insert_and_remove_entry() {
        let m = matrix();
        let entry = MatrixEntry {
            event_type: EventType::Checkout,
            risk_band: RiskBand::High,
            customer_segment: "returning".to_string(),
            action: Action::StepUp,
            max_fpr: 0.004,
            confidence_threshold: 0.7,
            notes: String::new(),
        };
        m.insert_entry(entry);
        assert_eq!(m.snapshot().len(), 9);

        let checkout = EventContext::new(EventType::Checkout, "proj-1");
        let decision = m.decide(&checkout, RiskBand::High, "returning", 0.001);
        assert_eq!(decision.action, Action::StepUp);

        assert!(m.remove_entry(EventType::Checkout, RiskBand::High, "returning"));
        assert!(!m.remove_entry(EventType::Checkout, RiskBand::High, "returning"));
        assert_eq!(m.snapshot().len(), 8);
    }

    #[test]
    fn insert_replaces_existing_key() {
        let m = matrix();
        let mut entry = m.export().entries[0].clone();
        entry.action = Action::Deny;
        m.insert_entry(entry.clone());

        assert_eq!(m.snapshot().len(), 8);
        let login = EventContext::new(EventType::Login, "proj-1");
        let decision = m.decide(&login, entry.risk_band, &entry.customer_segment, 0.0);
        assert_eq!(decision.action, Action::Deny);
    }

    #[test]
    fn export_round_trips_config() {
        let m = matrix();
        let exported = m.export();
        assert_eq!(exported, default_matrix());
    }

    #[test]
    fn decide_is_idempotent() {
        let m = matrix();
        let event = payment();
        let first = m.decide(&event, RiskBand::Medium, "returning", 0.001);
        let second = m.decide(&event, RiskBand::Medium, "returning", 0.001);
        assert_eq!(first, second);
    }
}
