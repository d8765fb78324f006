//! AND/OR/MAJORITY composition evaluation over member results.

use verdict_core::RuleResult;
use verdict_rules::{Combinator, CompositionDefinition};

/// Evaluate a composition against already-evaluated member results.
///
/// Members are resolved by name from `results`; a member with no result
/// (misconfigured name, or a rule that was disabled) counts as non-firing
/// and never aborts the composition. Compositions evaluated earlier in the
/// pipeline appear in `results` too, so members may reference them.
pub fn evaluate_composition(def: &CompositionDefinition, results: &[RuleResult]) -> RuleResult {
    let member_results: Vec<RuleResult> = def
        .members
        .iter()
        .map(|member| {
            results
                .iter()
                .find(|r| &r.rule_name == member)
                .cloned()
                .unwrap_or_else(|| {
                    RuleResult::pass(member, format!("No result for member '{}'", member))
                })
        })
        .collect();

    let fired: Vec<&RuleResult> = member_results.iter().filter(|r| r.fired).collect();
    let fired_names = || {
        fired
            .iter()
            .map(|r| r.rule_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let max_fired_risk = || fired.iter().map(|r| r.risk).fold(0.0_f64, f64::max);

    match def.operator {
        Combinator::And => {
            if !member_results.is_empty() && fired.len() == member_results.len() {
                RuleResult::fire(
                    &def.name,
                    format!("All members fired: {}", fired_names()),
                    max_fired_risk(),
                )
            } else {
                RuleResult::pass(&def.name, "Not all members fired")
            }
        }
        Combinator::Or => {
            if !fired.is_empty() {
                RuleResult::fire(
                    &def.name,
                    format!("Member fired: {}", fired_names()),
                    max_fired_risk(),
                )
            } else {
                RuleResult::pass(&def.name, "No members fired")
            }
        }
        Combinator::Majority => {
            if fired.len() * 2 > member_results.len() {
                let avg = fired.iter().map(|r| r.risk).sum::<f64>() / fired.len() as f64;
                RuleResult::fire(
                    &def.name,
                    format!("Majority of members fired: {}", fired_names()),
                    avg,
                )
            } else {
                RuleResult::pass(&def.name, "Majority of members did not fire")
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
