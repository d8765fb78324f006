//! Risk aggregation and the tunable risk constants.

use serde::{Deserialize, Serialize};

use verdict_core::{clamp_unit, RuleResult};

// ── Tuning ──────────────────────────────────────────────────────────

/// Tunable risk parameters used by the built-in evaluators and the
/// aggregator. The defaults are the long-standing production values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskTuning {
    /// Cap on the rate-limit contribution.
    pub rate_limit_cap: f64,
    /// Cap on the velocity contribution.
    pub velocity_cap: f64,
    /// Cap on the device-reuse contribution.
    pub device_cap: f64,
    /// Divisor applied to the device usage count before capping.
    pub device_usage_divisor: f64,
    /// Fixed contribution of a keyword match.
    pub keyword_risk: f64,
    /// Fixed contribution of a VPN detection.
    pub vpn_risk: f64,
    /// Cap on the location-change contribution.
    pub location_cap: f64,
    /// Divisor applied to the location-change count before capping.
    pub location_divisor: f64,
    /// Cap on the behavior-score contribution.
    pub behavior_cap: f64,
    /// Cap on the amount-ratio contribution.
    pub amount_cap: f64,
    /// Amplification added per extra fired rule.
    pub amplification_step: f64,
    /// Upper bound on the amplification multiplier.
    pub amplification_cap: f64,
}

impl Default for RiskTuning {
    fn default() -> Self {
        Self {
            rate_limit_cap: 0.9,
            velocity_cap: 0.8,
            device_cap: 0.7,
            device_usage_divisor: 10.0,
            keyword_risk: 0.6,
            vpn_risk: 0.5,
            location_cap: 0.6,
            location_divisor: 10.0,
            behavior_cap: 0.8,
            amount_cap: 0.8,
            amplification_step: 0.1,
            amplification_cap: 1.2,
        }
    }
}

// ── Aggregation ─────────────────────────────────────────────────────

/// Reduce a result list to a single risk score in [0, 1].
///
/// Takes the maximum contribution among fired results (0 if none fired).
/// When more than one fired, multiplies by
/// `min(amplification_cap, 1 + amplification_step × (fired − 1))` and
/// clamps back to 1.0, so corroborating signals raise the score without
/// letting many weak signals dwarf a single strong one.
pub fn aggregate_risk(results: &[RuleResult], tuning: &RiskTuning) -> f64 {
    let fired_count = results.iter().filter(|r| r.fired).count();
    let max_risk = results
        .iter()
        .filter(|r| r.fired)
        .map(|r| r.risk)
        .fold(0.0_f64, f64::max);

    if fired_count > 1 {
        let multiplier = (1.0 + tuning.amplification_step * (fired_count as f64 - 1.0))
            .min(tuning.amplification_cap);
        clamp_unit(max_risk * multiplier)
    } else {
        clamp_unit(max_risk)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
