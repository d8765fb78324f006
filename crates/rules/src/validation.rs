//! Rule set and matrix validation with structured errors and suggestions.
//!
//! Returns a [`ValidationResult`] with errors (block import) and warnings
//! (advisory). Unknown evaluator kinds are warnings, not errors: the engine
//! degrades them to non-firing diagnostics, but an operator almost always
//! wants to know about the typo before shipping the rule.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use verdict_core::MatrixConfig;

use crate::schema::{Combinator, RuleKind, RuleSet};

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// JSON-path-like location, e.g. `"rules[2].conditions.max_events"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: Some(suggestion.into()),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.valid = self.valid && other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

// ── Suggestion helper ───────────────────────────────────────────────

/// Case-insensitive Levenshtein distance, for "Did you mean …?" hints.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest candidate within edit distance 3, if any.
fn suggest<'a>(input: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .into_iter()
        .map(|c| (edit_distance(input, c), c))
        .filter(|(d, _)| *d <= 3)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

// ── Rule set validation ─────────────────────────────────────────────

const RATE_LIMIT_SCOPES: &[&str] = &["ip", "profile", "device"];

/// Validate a compiled rule set: name uniqueness, kind sanity, and
/// composition member resolution.
pub fn validate_rule_set(set: &RuleSet) -> ValidationResult {
    let mut result = ValidationResult::new();

    let mut seen: HashSet<&str> = HashSet::new();
    for (idx, rule) in set.rules.iter().enumerate() {
        let path = format!("rules[{}]", idx);

        if rule.name.is_empty() {
            result.error(format!("{}.name", path), "rule name must not be empty");
        } else if !seen.insert(&rule.name) {
            result.error(
                format!("{}.name", path),
                format!("duplicate rule name '{}'", rule.name),
            );
        }

        if rule.kind.parse::<RuleKind>().is_err() {
            let known: Vec<&str> = RuleKind::ALL.iter().map(|k| k.as_str()).collect();
            match suggest(&rule.kind, known) {
                Some(hint) => result.warn(
                    format!("{}.kind", path),
                    format!(
                        "unknown rule kind '{}' (did you mean '{}'?); the rule will never fire unless a custom evaluator is registered",
                        rule.kind, hint
                    ),
                ),
                None => result.warn(
                    format!("{}.kind", path),
                    format!(
                        "unknown rule kind '{}'; the rule will never fire unless a custom evaluator is registered",
                        rule.kind
                    ),
                ),
            }
        }

        validate_conditions(rule, &path, &mut result);
    }

    let rule_names: HashSet<&str> = set.rules.iter().map(|r| r.name.as_str()).collect();
    let mut addressable: HashSet<&str> = rule_names.clone();

    for (idx, comp) in set.compositions.iter().enumerate() {
        let path = format!("compositions[{}]", idx);

        if comp.name.is_empty() {
            result.error(format!("{}.name", path), "composition name must not be empty");
        } else if rule_names.contains(comp.name.as_str()) {
            result.error(
                format!("{}.name", path),
                format!("composition name '{}' collides with a rule name", comp.name),
            );
        } else if !addressable.insert(&comp.name) {
            result.error(
                format!("{}.name", path),
                format!("duplicate composition name '{}'", comp.name),
            );
        }

        if comp.members.is_empty() {
            result.error(
                format!("{}.members", path),
                "composition must have at least one member",
            );
        }

        if comp.operator == Combinator::Majority && comp.members.len() == 1 {
            result.warn(
                format!("{}.operator", path),
                "MAJORITY over a single member is equivalent to that member firing",
            );
        }

        for (midx, member) in comp.members.iter().enumerate() {
            // Members may reference rules or compositions defined earlier.
            if !addressable.contains(member.as_str()) || member == &comp.name {
                let mpath = format!("{}.members[{}]", path, midx);
                let candidates = addressable
                    .iter()
                    .copied()
                    .filter(|c| *c != member.as_str());
                match suggest(member, candidates) {
                    Some(hint) => result.error_with_suggestion(
                        mpath,
                        format!("unresolvable member '{}'", member),
                        format!("did you mean '{}'?", hint),
                    ),
                    None => result.error(mpath, format!("unresolvable member '{}'", member)),
                }
            }
        }
    }

    result
}

/// Per-kind condition checks. These are best-effort: the evaluators
/// degrade gracefully either way, so most findings are advisory.
fn validate_conditions(
    rule: &crate::schema::RuleDefinition,
    path: &str,
    result: &mut ValidationResult,
) {
    let conditions = match rule.conditions.as_object() {
        Some(map) => map,
        None => {
            if !rule.conditions.is_null() {
                result.error(
                    format!("{}.conditions", path),
                    "conditions must be a map",
                );
            }
            return;
        }
    };

    match rule.kind.parse::<RuleKind>() {
        Ok(RuleKind::RateLimit) => {
            if let Some(scope) = conditions.get("scope").and_then(|v| v.as_str()) {
                if !RATE_LIMIT_SCOPES.contains(&scope) {
                    result.warn(
                        format!("{}.conditions.scope", path),
                        format!("unsupported rate limit scope '{}'; the rule will never fire", scope),
                    );
                }
            }
            if conditions.get("max_events").and_then(|v| v.as_u64()) == Some(0) {
                result.error(
                    format!("{}.conditions.max_events", path),
                    "max_events must be positive",
                );
            }
        }
        Ok(RuleKind::Velocity) => {
            if conditions.get("max_velocity").and_then(|v| v.as_u64()) == Some(0) {
                result.error(
                    format!("{}.conditions.max_velocity", path),
                    "max_velocity must be positive",
                );
            }
        }
        Ok(RuleKind::Keyword) => {
            let keywords = conditions
                .get("suspicious_keywords")
                .and_then(|v| v.as_array());
            match keywords {
                Some(list) if !list.is_empty() => {}
                _ => result.warn(
                    format!("{}.conditions.suspicious_keywords", path),
                    "no suspicious keywords configured; the rule will never fire",
                ),
            }
        }
        Ok(RuleKind::Amount) => {
            match conditions.get("max_amount").and_then(|v| v.as_f64()) {
                Some(max) if max > 0.0 => {}
                Some(_) => result.error(
                    format!("{}.conditions.max_amount", path),
                    "max_amount must be positive",
                ),
                None => result.warn(
                    format!("{}.conditions.max_amount", path),
                    "no max_amount configured; the rule will never fire",
                ),
            }
        }
        _ => {}
    }
}

// ── Matrix validation ───────────────────────────────────────────────

fn check_unit_range(
    value: f64,
    path: String,
    label: &str,
    result: &mut ValidationResult,
) {
    if !(0.0..=1.0).contains(&value) {
        result.error(path, format!("{} must be within [0, 1], got {}", label, value));
    }
}

/// Validate a matrix configuration: key uniqueness and value ranges.
pub fn validate_matrix(config: &MatrixConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.entries.is_empty() {
        result.warn("entries", "matrix has no entries; every decision will use the default action");
    }

    let mut seen: HashSet<String> = HashSet::new();
    for (idx, entry) in config.entries.iter().enumerate() {
        let path = format!("entries[{}]", idx);
        let key = entry.key();

        if !seen.insert(key.clone()) {
            result.error(
                format!("{}.key", path),
                format!("duplicate matrix entry for key '{}'", key),
            );
        }

        if entry.customer_segment.is_empty() {
            result.error(
                format!("{}.customer_segment", path),
                "customer segment must not be empty",
            );
        }

        check_unit_range(entry.max_fpr, format!("{}.max_fpr", path), "max_fpr", &mut result);
        check_unit_range(
            entry.confidence_threshold,
            format!("{}.confidence_threshold", path),
            "confidence_threshold",
            &mut result,
        );
    }

    check_unit_range(
        config.default_max_fpr,
        "default_max_fpr".to_string(),
        "default_max_fpr",
        &mut result,
    );

    result
}

// ── Tests ───────────────────────────────────────────────────────────
