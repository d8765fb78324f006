//! The evaluation pipeline and decision orchestrator.
//!
//! A [`Pipeline`] is compiled once per project from a rule set: disabled
//! entries dropped, rules stable-sorted by descending priority. The
//! [`DecisionEngine`] then runs the fixed sequence
//! evaluate → aggregate → band → matrix lookup → assemble for each
//! context, with no state carried between calls other than the matrix
//! configuration itself.

use tracing::debug;

use verdict_core::{DecisionResult, EvaluationContext, RiskBand, RuleResult};
use verdict_rules::{CompositionDefinition, RuleDefinition, RuleSet};

use crate::composition::evaluate_composition;
use crate::evaluators::EvaluatorRegistry;
use crate::matrix::DecisionMatrix;
use crate::risk::{aggregate_risk, RiskTuning};

// ── Pipeline ────────────────────────────────────────────────────────

/// A compiled, fixed evaluation pipeline for one project.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    rules: Vec<RuleDefinition>,
    compositions: Vec<CompositionDefinition>,
}

impl Pipeline {
    /// Compile a rule set: keep enabled entries and stable-sort rules by
    /// descending priority, so higher-priority rules surface first in
    /// diagnostics. Priority orders output only; every rule is evaluated.
    pub fn compile(set: &RuleSet) -> Self {
        let mut rules: Vec<RuleDefinition> =
            set.rules.iter().filter(|r| r.enabled).cloned().collect();
        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));

        let compositions: Vec<CompositionDefinition> = set
            .compositions
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect();

        Self {
            rules,
            compositions,
        }
    }

    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    pub fn compositions(&self) -> &[CompositionDefinition] {
        &self.compositions
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.compositions.is_empty()
    }
}

// ── Decision engine ─────────────────────────────────────────────────

/// The orchestrator: owns the evaluator registry, the tunable risk
/// parameters, and the hot-swappable matrix handle.
pub struct DecisionEngine {
    registry: EvaluatorRegistry,
    matrix: DecisionMatrix,
    tuning: RiskTuning,
}

impl DecisionEngine {
    pub fn new(matrix: DecisionMatrix) -> Self {
        Self {
            registry: EvaluatorRegistry::new(),
            matrix,
            tuning: RiskTuning::default(),
        }
    }

    /// Engine whose built-in evaluators and aggregator share `tuning`.
    pub fn with_tuning(matrix: DecisionMatrix, tuning: RiskTuning) -> Self {
        Self {
            registry: EvaluatorRegistry::with_tuning(tuning.clone()),
            matrix,
            tuning,
        }
    }

    /// Mutable access to the registry, for registering custom kinds.
    pub fn registry_mut(&mut self) -> &mut EvaluatorRegistry {
        &mut self.registry
    }

    /// The matrix handle, for reloads and runtime entry edits.
    pub fn matrix(&self) -> &DecisionMatrix {
        &self.matrix
    }

    /// Evaluate every rule and composition in the pipeline.
    ///
    /// Results come back in pipeline order: rules by descending priority,
    /// then compositions. Compositions see the results evaluated before
    /// them, so they may reference earlier compositions.
    pub fn evaluate_rules(
        &self,
        pipeline: &Pipeline,
        ctx: &EvaluationContext,
    ) -> Vec<RuleResult> {
        let mut results: Vec<RuleResult> = Vec::with_capacity(
            pipeline.rules().len() + pipeline.compositions().len(),
        );

        for rule in pipeline.rules() {
            results.push(self.registry.evaluate(rule, ctx));
        }

        for comp in pipeline.compositions() {
            let result = evaluate_composition(comp, &results);
            results.push(result);
        }

        results
    }

    /// Run the full decision sequence for one context.
    pub fn decide(&self, pipeline: &Pipeline, ctx: &EvaluationContext) -> DecisionResult {
        let results = self.evaluate_rules(pipeline, ctx);

        let risk_score = aggregate_risk(&results, &self.tuning);
        let band = RiskBand::from_score(risk_score);

        let mut decision =
            self.matrix
                .decide(&ctx.event, band, &ctx.customer_segment, ctx.current_fpr);

        // Matrix-derived reasons and names come first, then the fired
        // rules in pipeline order.
        decision.risk_score = risk_score;
        for result in results.iter().filter(|r| r.fired) {
            decision.reasons.push(result.reason.clone());
            if !decision.rules_fired.contains(&result.rule_name) {
                decision.rules_fired.push(result.rule_name.clone());
            }
        }

        decision.metadata.insert(
            "evaluated_at".to_string(),
            ctx.event.created_at.to_rfc3339().into(),
        );
        decision.metadata.insert(
            "event_type".to_string(),
            ctx.event.event_type.as_str().into(),
        );
        if let Some(profile_id) = &ctx.event.profile_id {
            decision
                .metadata
                .insert("profile_id".to_string(), profile_id.as_str().into());
        }

        debug!(
            event_id = %ctx.event.id,
            action = %decision.action,
            risk_score,
            band = %band,
            fired = decision.rules_fired.len(),
            "decision assembled"
        );

        decision
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_core::{Action, EventContext, EventType, SCOPE_IP};
    use verdict_rules::{default_matrix, Combinator, RuleDefinition};

    fn engine() -> DecisionEngine {
        DecisionEngine::new(DecisionMatrix::new(&default_matrix()).unwrap())
    }

    fn rate_limit_rule(name: &str, priority: i32) -> RuleDefinition {
        RuleDefinition::new(name, "rate_limit")
            .with_conditions(serde_json::json!({"scope": "ip", "max_events": 5}))
            .with_priority(priority)
    }

    #[test]
    fn pipeline_sorts_by_descending_priority_stably() {
        let set = RuleSet {
            rules: vec![
                rate_limit_rule("low-a", 1),
                rate_limit_rule("high", 10),
                rate_limit_rule("low-b", 1),
            ],
            compositions: vec![],
        };
        let pipeline = Pipeline::compile(&set);
        let names: Vec<&str> = pipeline.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low-a", "low-b"]);
    }

    #[test]
    fn pipeline_drops_disabled_entries() {
        let set = RuleSet {
            rules: vec![
                rate_limit_rule("on", 0),
                rate_limit_rule("off", 0).disabled(),
            ],
            compositions: vec![CompositionDefinition {
                name: "dead".to_string(),
                operator: Combinator::Or,
                members: vec!["on".to_string()],
                priority: 0,
                enabled: false,
                description: String::new(),
            }],
        };
        let pipeline = Pipeline::compile(&set);
        assert_eq!(pipeline.rules().len(), 1);
        assert!(pipeline.compositions().is_empty());
    }

    #[test]
    fn priority_orders_diagnostics_not_evaluation() {
        let set = RuleSet {
            rules: vec![rate_limit_rule("low", 1), rate_limit_rule("high", 9)],
            compositions: vec![],
        };
        let pipeline = Pipeline::compile(&set);

        let ctx = EvaluationContext::builder(EventContext::new(EventType::Login, "p"))
            .counter(SCOPE_IP, 10)
            .build();
        let results = engine().evaluate_rules(&pipeline, &ctx);

        // Both evaluated, higher priority first.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rule_name, "high");
        assert!(results.iter().all(|r| r.fired));
    }

    #[test]
    fn compositions_fold_into_result_list() {
        let set = RuleSet {
            rules: vec![rate_limit_rule("burst", 0)],
            compositions: vec![CompositionDefinition::new(
                "burst-or",
                Combinator::Or,
                vec!["burst".to_string()],
            )],
        };
        let pipeline = Pipeline::compile(&set);

        let ctx = EvaluationContext::builder(EventContext::new(EventType::Login, "p"))
            .counter(SCOPE_IP, 10)
            .build();
        let results = engine().evaluate_rules(&pipeline, &ctx);
        assert_eq!(results.len(), 2);
        assert!(results[1].fired);
        assert_eq!(results[1].rule_name, "burst-or");
    }

    #[test]
    fn decide_merges_matrix_reasons_first() {
        let set = RuleSet {
            rules: vec![rate_limit_rule("burst", 0)],
            compositions: vec![],
        };
        let pipeline = Pipeline::compile(&set);

        let ctx = EvaluationContext::builder(EventContext::new(EventType::Payment, "p"))
            .counter(SCOPE_IP, 10)
            .customer_segment("new_user")
            .current_fpr(0.0001)
            .build();

        let decision = engine().decide(&pipeline, &ctx);

        // Rate limit fires at 0.9 → critical band → deny for new_user.
        assert_eq!(decision.action, Action::Deny);
        assert!((decision.risk_score - 0.9).abs() < 1e-9);
        // Matrix reason first, then the fired rule's reason.
        assert!(decision.reasons[0].starts_with("Risk band:"));
        assert!(decision
            .reasons
            .iter()
            .any(|r| r.contains("Rate limit exceeded")));
        // Matrix pseudo-name first, then the fired rule.
        assert_eq!(decision.rules_fired[0], "matrix_payment_critical");
        assert!(decision.rules_fired.contains(&"burst".to_string()));
    }

    #[test]
    fn decide_with_no_rules_uses_low_band() {
        let pipeline = Pipeline::compile(&RuleSet::default());
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Login, "p"))
            .customer_segment("returning")
            .current_fpr(0.001)
            .build();

        let decision = engine().decide(&pipeline, &ctx);
        assert_eq!(decision.risk_score, 0.0);
        assert_eq!(
            decision.metadata.get("risk_band").and_then(|v| v.as_str()),
            Some("low")
        );
        // login:low:returning exists in the default matrix → allow.
        assert_eq!(decision.action, Action::Allow);
    }

    #[test]
    fn decide_is_idempotent_for_identical_context() {
        let set = RuleSet {
            rules: vec![rate_limit_rule("burst", 0)],
            compositions: vec![],
        };
        let pipeline = Pipeline::compile(&set);
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Payment, "p"))
            .counter(SCOPE_IP, 10)
            .build();

        let engine = engine();
        let first = engine.decide(&pipeline, &ctx);
        let second = engine.decide(&pipeline, &ctx);
        assert_eq!(first, second);
    }

    #[test]
    fn evaluator_diagnostics_never_abort_decision() {
        let set = RuleSet {
            rules: vec![
                RuleDefinition::new("broken", "rate_limit")
                    .with_conditions(serde_json::json!({"max_events": "many"})),
                RuleDefinition::new("exotic", "quantum_entanglement"),
                rate_limit_rule("working", 0),
            ],
            compositions: vec![],
        };
        let pipeline = Pipeline::compile(&set);
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Login, "p"))
            .counter(SCOPE_IP, 100)
            .build();

        let decision = engine().decide(&pipeline, &ctx);
        // The working rule still fires and drives the decision.
        assert!(decision.rules_fired.contains(&"working".to_string()));
        assert!((decision.risk_score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn metadata_carries_evaluation_context() {
        let pipeline = Pipeline::compile(&RuleSet::default());
        let event = EventContext::new(EventType::Signup, "p").with_profile_id("user-7");
        let ctx = EvaluationContext::builder(event).build();

        let decision = engine().decide(&pipeline, &ctx);
        assert_eq!(
            decision.metadata.get("event_type").and_then(|v| v.as_str()),
            Some("signup")
        );
        assert_eq!(
            decision.metadata.get("profile_id").and_then(|v| v.as_str()),
            Some("user-7")
        );
        assert!(decision.metadata.contains_key("evaluated_at"));
    }
}
