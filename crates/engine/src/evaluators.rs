//! Per-kind rule evaluators behind a string-keyed registry.
//!
//! Every evaluator is pure and total: configuration or input problems
//! produce a non-firing [`RuleResult`] carrying a diagnostic reason, never
//! an error. Each evaluator deserializes its typed parameters from the
//! rule's opaque conditions map, falling back to per-field defaults.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use verdict_core::{
    EvaluationContext, RuleResult, SCOPE_DEVICE, SCOPE_PROFILE, SCOPE_PROFILE_VELOCITY,
};
use verdict_rules::{RuleDefinition, RuleKind};

use crate::risk::RiskTuning;

// ── Evaluator trait and registry ────────────────────────────────────

/// A pure evaluator for one rule kind.
pub trait Evaluate: Send + Sync {
    /// Evaluate `rule` against `ctx`.
    ///
    /// Must be total: implementations report problems through a
    /// non-firing result, never by panicking.
    fn evaluate(&self, rule: &RuleDefinition, ctx: &EvaluationContext) -> RuleResult;
}

/// Registry mapping rule kind strings to evaluators.
///
/// The built-in kinds are registered at construction; projects may
/// [`register`](EvaluatorRegistry::register) additional kinds. Rules whose
/// kind has no evaluator produce a non-firing diagnostic.
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Box<dyn Evaluate>>,
}

impl EvaluatorRegistry {
    /// Registry with the built-in evaluators and default tuning.
    pub fn new() -> Self {
        Self::with_tuning(RiskTuning::default())
    }

    /// Registry with the built-in evaluators sharing the given tuning.
    pub fn with_tuning(tuning: RiskTuning) -> Self {
        let mut registry = Self {
            evaluators: HashMap::new(),
        };
        registry.register(
            RuleKind::RateLimit.as_str(),
            Box::new(RateLimitEvaluator {
                tuning: tuning.clone(),
            }),
        );
        registry.register(
            RuleKind::Velocity.as_str(),
            Box::new(VelocityEvaluator {
                tuning: tuning.clone(),
            }),
        );
        registry.register(
            RuleKind::Device.as_str(),
            Box::new(DeviceEvaluator {
                tuning: tuning.clone(),
            }),
        );
        registry.register(
            RuleKind::Keyword.as_str(),
            Box::new(KeywordEvaluator {
                tuning: tuning.clone(),
            }),
        );
        registry.register(
            RuleKind::Geolocation.as_str(),
            Box::new(GeolocationEvaluator {
                tuning: tuning.clone(),
            }),
        );
        registry.register(
            RuleKind::Behavior.as_str(),
            Box::new(BehaviorEvaluator {
                tuning: tuning.clone(),
            }),
        );
        registry.register(
            RuleKind::Amount.as_str(),
            Box::new(AmountEvaluator { tuning }),
        );
        registry
    }

    /// Register an evaluator for a kind, replacing any existing one.
    pub fn register(&mut self, kind: impl Into<String>, evaluator: Box<dyn Evaluate>) {
        self.evaluators.insert(kind.into(), evaluator);
    }

    /// Kinds with a registered evaluator, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.evaluators.keys().map(|k| k.as_str()).collect();
        kinds.sort();
        kinds
    }

    /// Evaluate one rule. Unknown kinds degrade to a non-firing diagnostic.
    pub fn evaluate(&self, rule: &RuleDefinition, ctx: &EvaluationContext) -> RuleResult {
        match self.evaluators.get(&rule.kind) {
            Some(evaluator) => {
                let result = evaluator.evaluate(rule, ctx);
                debug!(
                    rule = %rule.name,
                    kind = %rule.kind,
                    fired = result.fired,
                    risk = result.risk,
                    "evaluated rule"
                );
                result
            }
            None => RuleResult::pass(
                &rule.name,
                format!("Unknown rule kind: {}", rule.kind),
            ),
        }
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize the kind-specific parameters from a rule's conditions map.
///
/// Null conditions mean "all defaults"; a malformed map is reported as an
/// error string for the evaluator to fold into a diagnostic result.
fn params<T: DeserializeOwned + Default>(rule: &RuleDefinition) -> Result<T, String> {
    match &rule.conditions {
        serde_json::Value::Null => Ok(T::default()),
        value => serde_json::from_value(value.clone()).map_err(|e| e.to_string()),
    }
}

// ── Rate limit ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RateLimitParams {
    scope: String,
    time_window_minutes: u32,
    max_events: u64,
}

impl Default for RateLimitParams {
    fn default() -> Self {
        Self {
            scope: "ip".to_string(),
            time_window_minutes: 60,
            max_events: 100,
        }
    }
}

/// Fires when the pre-aggregated count for the configured scope exceeds
/// `max_events`. The window is informational: counters arrive already
/// windowed by the context-assembly service.
struct RateLimitEvaluator {
    tuning: RiskTuning,
}

impl Evaluate for RateLimitEvaluator {
    fn evaluate(&self, rule: &RuleDefinition, ctx: &EvaluationContext) -> RuleResult {
        let params: RateLimitParams = match params(rule) {
            Ok(p) => p,
            Err(e) => {
                return RuleResult::pass(&rule.name, format!("Invalid rate limit conditions: {}", e))
            }
        };

        if !["ip", "profile", "device"].contains(&params.scope.as_str()) {
            return RuleResult::pass(
                &rule.name,
                format!("Invalid rate limit scope: {}", params.scope),
            );
        }

        if params.scope == SCOPE_PROFILE && ctx.profile.is_none() {
            return RuleResult::pass(&rule.name, "No profile for profile-scoped rate limit");
        }

        if params.max_events == 0 {
            return RuleResult::pass(&rule.name, "max_events must be positive");
        }

        let count = ctx.counter(&params.scope);
        if count > params.max_events {
            let risk = (count as f64 / params.max_events as f64).min(self.tuning.rate_limit_cap);
            return RuleResult::fire(
                &rule.name,
                format!(
                    "Rate limit exceeded: {} events in {} minutes",
                    count, params.time_window_minutes
                ),
                risk,
            );
        }

        RuleResult::pass(
            &rule.name,
            format!("Rate limit OK: {}/{} events", count, params.max_events),
        )
    }
}

// ── Velocity ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(default)]
struct VelocityParams {
    scope: String,
    time_window_minutes: u32,
    max_velocity: u64,
}

impl Default for VelocityParams {
    fn default() -> Self {
        Self {
            scope: SCOPE_PROFILE.to_string(),
            time_window_minutes: 60,
            max_velocity: 10,
        }
    }
}

/// Fires when the profile's velocity counter exceeds `max_velocity`.
/// Velocity is restricted to profile scope.
struct VelocityEvaluator {
    tuning: RiskTuning,
}

impl Evaluate for VelocityEvaluator {
    fn evaluate(&self, rule: &RuleDefinition, ctx: &EvaluationContext) -> RuleResult {
        let params: VelocityParams = match params(rule) {
            Ok(p) => p,
            Err(e) => {
                return RuleResult::pass(&rule.name, format!("Invalid velocity conditions: {}", e))
            }
        };

        if params.scope != SCOPE_PROFILE || ctx.profile.is_none() {
            return RuleResult::pass(&rule.name, "Velocity check requires profile scope");
        }

        if params.max_velocity == 0 {
            return RuleResult::pass(&rule.name, "max_velocity must be positive");
        }

        let count = ctx.counter(SCOPE_PROFILE_VELOCITY);
        if count > params.max_velocity {
            let risk = (count as f64 / params.max_velocity as f64).min(self.tuning.velocity_cap);
            return RuleResult::fire(
                &rule.name,
                format!(
                    "Velocity exceeded: {} events in {} minutes",
                    count, params.time_window_minutes
                ),
                risk,
            );
        }

        RuleResult::pass(
            &rule.name,
            format!("Velocity OK: {}/{} events", count, params.max_velocity),
        )
    }
}

// ── Device ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DeviceParams {
    check_device_reuse: bool,
    max_device_uses: u64,
}

impl Default for DeviceParams {
    fn default() -> Self {
        Self {
            check_device_reuse: false,
            max_device_uses: 5,
        }
    }
}

/// Fires when a fingerprinted device has been seen more than
/// `max_device_uses` times, if reuse checking is enabled.
struct DeviceEvaluator {
    tuning: RiskTuning,
}

impl Evaluate for DeviceEvaluator {
    fn evaluate(&self, rule: &RuleDefinition, ctx: &EvaluationContext) -> RuleResult {
        let params: DeviceParams = match params(rule) {
            Ok(p) => p,
            Err(e) => {
                return RuleResult::pass(&rule.name, format!("Invalid device conditions: {}", e))
            }
        };

        let has_fingerprint = ctx
            .event
            .device_fingerprint
            .as_deref()
            .map(|fp| !fp.is_empty())
            .unwrap_or(false);
        if !has_fingerprint {
            return RuleResult::pass(&rule.name, "No device fingerprint available");
        }

        if params.check_device_reuse {
            let count = ctx.counter(SCOPE_DEVICE);
            if count > params.max_device_uses {
                let risk =
                    (count as f64 / self.tuning.device_usage_divisor).min(self.tuning.device_cap);
                return RuleResult::fire(
                    &rule.name,
                    format!("Device overuse: {} events from same device", count),
                    risk,
                );
            }
        }

        RuleResult::pass(&rule.name, "Device fingerprint OK")
    }
}

// ── Keyword ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeywordParams {
    check_event_data: bool,
    suspicious_keywords: Vec<String>,
}

/// Scans string-valued event data entries case-insensitively and fires on
/// the first suspicious keyword match.
struct KeywordEvaluator {
    tuning: RiskTuning,
}

impl Evaluate for KeywordEvaluator {
    fn evaluate(&self, rule: &RuleDefinition, ctx: &EvaluationContext) -> RuleResult {
        let params: KeywordParams = match params(rule) {
            Ok(p) => p,
            Err(e) => {
                return RuleResult::pass(&rule.name, format!("Invalid keyword conditions: {}", e))
            }
        };

        if !params.check_event_data {
            return RuleResult::pass(&rule.name, "Event data screening not enabled");
        }

        if params.suspicious_keywords.is_empty() {
            return RuleResult::pass(&rule.name, "No suspicious keywords configured");
        }

        for value in ctx.event.event_data.values() {
            if let Some(text) = value.as_str() {
                let lowered = text.to_lowercase();
                for keyword in &params.suspicious_keywords {
                    if lowered.contains(&keyword.to_lowercase()) {
                        return RuleResult::fire(
                            &rule.name,
                            format!("Suspicious keyword detected: {}", keyword),
                            self.tuning.keyword_risk,
                        );
                    }
                }
            }
        }

        RuleResult::pass(&rule.name, "No suspicious keywords matched")
    }
}

// ── Geolocation ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeolocationParams {
    enable_vpn_detection: bool,
    enable_location_consistency: bool,
    max_location_changes: u32,
}

impl Default for GeolocationParams {
    fn default() -> Self {
        Self {
            enable_vpn_detection: false,
            enable_location_consistency: false,
            max_location_changes: 3,
        }
    }
}

/// Fires on a VPN flag or on too many recent location changes, depending
/// on which checks the rule enables.
struct GeolocationEvaluator {
    tuning: RiskTuning,
}

impl Evaluate for GeolocationEvaluator {
    fn evaluate(&self, rule: &RuleDefinition, ctx: &EvaluationContext) -> RuleResult {
        let params: GeolocationParams = match params(rule) {
            Ok(p) => p,
            Err(e) => {
                return RuleResult::pass(
                    &rule.name,
                    format!("Invalid geolocation conditions: {}", e),
                )
            }
        };

        let geo = match &ctx.geo {
            Some(geo) => geo,
            None => return RuleResult::pass(&rule.name, "No geolocation data available"),
        };

        if params.enable_vpn_detection && geo.is_vpn {
            return RuleResult::fire(&rule.name, "VPN detected", self.tuning.vpn_risk);
        }

        if params.enable_location_consistency && geo.location_changes > params.max_location_changes
        {
            let risk = (geo.location_changes as f64 / self.tuning.location_divisor)
                .min(self.tuning.location_cap);
            return RuleResult::fire(
                &rule.name,
                format!("Too many location changes: {}", geo.location_changes),
                risk,
            );
        }

        RuleResult::pass(&rule.name, "Geolocation checks passed")
    }
}

// ── Behavior ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BehaviorParams {
    enable_behavioral_analysis: bool,
    behavior_threshold: f64,
}

impl Default for BehaviorParams {
    fn default() -> Self {
        Self {
            enable_behavioral_analysis: false,
            behavior_threshold: 0.7,
        }
    }
}

/// Fires when the context's behavior anomaly score exceeds the threshold.
struct BehaviorEvaluator {
    tuning: RiskTuning,
}

impl Evaluate for BehaviorEvaluator {
    fn evaluate(&self, rule: &RuleDefinition, ctx: &EvaluationContext) -> RuleResult {
        let params: BehaviorParams = match params(rule) {
            Ok(p) => p,
            Err(e) => {
                return RuleResult::pass(&rule.name, format!("Invalid behavior conditions: {}", e))
            }
        };

        if !params.enable_behavioral_analysis {
            return RuleResult::pass(&rule.name, "Behavioral analysis not enabled");
        }

        if ctx.behavior_score > params.behavior_threshold {
            let risk = ctx.behavior_score.min(self.tuning.behavior_cap);
            return RuleResult::fire(
                &rule.name,
                format!("Unusual behavior detected: score {:.2}", ctx.behavior_score),
                risk,
            );
        }

        RuleResult::pass(
            &rule.name,
            format!("Behavior normal: score {:.2}", ctx.behavior_score),
        )
    }
}

// ── Amount ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AmountParams {
    max_amount: Option<f64>,
}

/// Fires when the event's monetary amount exceeds `max_amount`.
struct AmountEvaluator {
    tuning: RiskTuning,
}

impl Evaluate for AmountEvaluator {
    fn evaluate(&self, rule: &RuleDefinition, ctx: &EvaluationContext) -> RuleResult {
        let params: AmountParams = match params(rule) {
            Ok(p) => p,
            Err(e) => {
                return RuleResult::pass(&rule.name, format!("Invalid amount conditions: {}", e))
            }
        };

        let max_amount = match params.max_amount {
            Some(max) if max > 0.0 => max,
            Some(_) => return RuleResult::pass(&rule.name, "max_amount must be positive"),
            None => return RuleResult::pass(&rule.name, "No max_amount configured"),
        };

        let amount = match ctx.event.amount {
            Some(amount) => amount,
            None => return RuleResult::pass(&rule.name, "No amount on event"),
        };

        if amount > max_amount {
            let risk = (amount / max_amount).min(self.tuning.amount_cap);
            return RuleResult::fire(
                &rule.name,
                format!("Amount exceeds limit: {} > {}", amount, max_amount),
                risk,
            );
        }

        RuleResult::pass(
            &rule.name,
            format!("Amount OK: {} <= {}", amount, max_amount),
        )
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_core::{
        EvaluationContext, EventContext, EventType, GeoContext, ProfileContext, SCOPE_IP,
    };

    fn registry() -> EvaluatorRegistry {
        EvaluatorRegistry::new()
    }

    fn login_ctx() -> EvaluationContext {
        EvaluationContext::builder(EventContext::new(EventType::Login, "proj-1")).build()
    }

    fn rule(name: &str, kind: &str, conditions: serde_json::Value) -> RuleDefinition {
        RuleDefinition::new(name, kind).with_conditions(conditions)
    }

    // ── Rate limit ──────────────────────────────────────────────────

    #[test]
    fn rate_limit_fires_over_threshold() {
        // 6 events against max 5 → fires at the 0.9 cap since 6/5 > 0.9.
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Login, "p"))
            .counter(SCOPE_IP, 6)
            .build();
        let r = rule(
            "ip-burst",
            "rate_limit",
            serde_json::json!({"scope": "ip", "max_events": 5, "time_window_minutes": 10}),
        );

        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        assert!((result.risk - 0.9).abs() < 1e-9);
        assert!(result.reason.contains("Rate limit exceeded"));
    }

    #[test]
    fn rate_limit_under_threshold_passes() {
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Login, "p"))
            .counter(SCOPE_IP, 3)
            .build();
        let r = rule(
            "ip-burst",
            "rate_limit",
            serde_json::json!({"scope": "ip", "max_events": 5}),
        );

        let result = registry().evaluate(&r, &ctx);
        assert!(!result.fired);
        assert_eq!(result.risk, 0.0);
        assert!(result.reason.contains("3/5"));
    }

    #[test]
    fn rate_limit_fired_risk_always_hits_cap() {
        // count > max_events implies count/max > 1, so a fired rate limit
        // always lands on the cap.
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Login, "p"))
            .counter(SCOPE_IP, 150)
            .build();
        let r = rule(
            "ip-burst",
            "rate_limit",
            serde_json::json!({"scope": "ip", "max_events": 100}),
        );
        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        assert!((result.risk - 0.9).abs() < 1e-9);
    }

    #[test]
    fn rate_limit_invalid_scope_is_diagnostic() {
        let r = rule(
            "bad-scope",
            "rate_limit",
            serde_json::json!({"scope": "galaxy"}),
        );
        let result = registry().evaluate(&r, &login_ctx());
        assert!(!result.fired);
        assert!(result.reason.contains("Invalid rate limit scope"));
    }

    #[test]
    fn rate_limit_profile_scope_requires_profile() {
        let r = rule(
            "profile-burst",
            "rate_limit",
            serde_json::json!({"scope": "profile", "max_events": 5}),
        );
        let result = registry().evaluate(&r, &login_ctx());
        assert!(!result.fired);
        assert!(result.reason.contains("No profile"));
    }

    #[test]
    fn rate_limit_malformed_conditions_degrade() {
        let r = rule(
            "mangled",
            "rate_limit",
            serde_json::json!({"max_events": "lots"}),
        );
        let result = registry().evaluate(&r, &login_ctx());
        assert!(!result.fired);
        assert!(result.reason.contains("Invalid rate limit conditions"));
    }

    // ── Velocity ────────────────────────────────────────────────────

    #[test]
    fn velocity_fires_with_profile() {
        let profile = ProfileContext::new("user-1", chrono::Utc::now());
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Payment, "p"))
            .profile(profile)
            .counter(SCOPE_PROFILE_VELOCITY, 25)
            .build();
        let r = rule(
            "fast-profile",
            "velocity",
            serde_json::json!({"max_velocity": 10}),
        );

        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        // 25/10 = 2.5 capped at 0.8.
        assert!((result.risk - 0.8).abs() < 1e-9);
    }

    #[test]
    fn velocity_requires_profile() {
        let r = rule("fast-profile", "velocity", serde_json::json!({}));
        let result = registry().evaluate(&r, &login_ctx());
        assert!(!result.fired);
        assert!(result.reason.contains("requires profile scope"));
    }

    #[test]
    fn velocity_rejects_other_scopes() {
        let profile = ProfileContext::new("user-1", chrono::Utc::now());
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Payment, "p"))
            .profile(profile)
            .counter(SCOPE_PROFILE_VELOCITY, 25)
            .build();
        let r = rule(
            "ip-velocity",
            "velocity",
            serde_json::json!({"scope": "ip", "max_velocity": 10}),
        );
        let result = registry().evaluate(&r, &ctx);
        assert!(!result.fired);
    }

    // ── Device ──────────────────────────────────────────────────────

    #[test]
    fn device_requires_fingerprint() {
        let r = rule(
            "device-reuse",
            "device",
            serde_json::json!({"check_device_reuse": true}),
        );
        let result = registry().evaluate(&r, &login_ctx());
        assert!(!result.fired);
        assert!(result.reason.contains("No device fingerprint"));
    }

    #[test]
    fn device_overuse_fires() {
        let event = EventContext::new(EventType::Login, "p").with_device_fingerprint("fp-1");
        let ctx = EvaluationContext::builder(event)
            .counter(SCOPE_DEVICE, 8)
            .build();
        let r = rule(
            "device-reuse",
            "device",
            serde_json::json!({"check_device_reuse": true, "max_device_uses": 5}),
        );

        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        // 8 / 10 = 0.8 capped at 0.7.
        assert!((result.risk - 0.7).abs() < 1e-9);
    }

    #[test]
    fn device_reuse_check_disabled_passes() {
        let event = EventContext::new(EventType::Login, "p").with_device_fingerprint("fp-1");
        let ctx = EvaluationContext::builder(event)
            .counter(SCOPE_DEVICE, 80)
            .build();
        let r = rule("device-reuse", "device", serde_json::json!({}));
        let result = registry().evaluate(&r, &ctx);
        assert!(!result.fired);
        assert_eq!(result.reason, "Device fingerprint OK");
    }

    #[test]
    fn device_below_divisor_keeps_ratio() {
        let event = EventContext::new(EventType::Login, "p").with_device_fingerprint("fp-1");
        let ctx = EvaluationContext::builder(event)
            .counter(SCOPE_DEVICE, 6)
            .build();
        let r = rule(
            "device-reuse",
            "device",
            serde_json::json!({"check_device_reuse": true, "max_device_uses": 5}),
        );
        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        // 6 / 10 = 0.6, under the 0.7 cap.
        assert!((result.risk - 0.6).abs() < 1e-9);
    }

    // ── Keyword ─────────────────────────────────────────────────────

    #[test]
    fn keyword_match_fires() {
        // Scenario: keyword "test" in a description fires at 0.6.
        let event = EventContext::new(EventType::Payment, "p")
            .with_data("description", "a test transaction");
        let ctx = EvaluationContext::builder(event).build();
        let r = rule(
            "keyword-screen",
            "keyword",
            serde_json::json!({
                "check_event_data": true,
                "suspicious_keywords": ["test"]
            }),
        );

        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        assert_eq!(result.risk, 0.6);
        assert!(result.reason.contains("test"));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let event = EventContext::new(EventType::Signup, "p").with_data("email", "FRAUD@example.com");
        let ctx = EvaluationContext::builder(event).build();
        let r = rule(
            "keyword-screen",
            "keyword",
            serde_json::json!({
                "check_event_data": true,
                "suspicious_keywords": ["fraud"]
            }),
        );
        assert!(registry().evaluate(&r, &ctx).fired);
    }

    #[test]
    fn keyword_ignores_non_string_values() {
        let event = EventContext::new(EventType::Payment, "p").with_data("retries", 42);
        let ctx = EvaluationContext::builder(event).build();
        let r = rule(
            "keyword-screen",
            "keyword",
            serde_json::json!({
                "check_event_data": true,
                "suspicious_keywords": ["42"]
            }),
        );
        assert!(!registry().evaluate(&r, &ctx).fired);
    }

    #[test]
    fn keyword_disabled_or_empty_is_diagnostic() {
        let r = rule("kw", "keyword", serde_json::json!({}));
        let result = registry().evaluate(&r, &login_ctx());
        assert!(result.reason.contains("not enabled"));

        let r = rule(
            "kw",
            "keyword",
            serde_json::json!({"check_event_data": true}),
        );
        let result = registry().evaluate(&r, &login_ctx());
        assert!(result.reason.contains("No suspicious keywords configured"));
    }

    // ── Geolocation ─────────────────────────────────────────────────

    #[test]
    fn geolocation_requires_geo_data() {
        let r = rule(
            "geo",
            "geolocation",
            serde_json::json!({"enable_vpn_detection": true}),
        );
        let result = registry().evaluate(&r, &login_ctx());
        assert!(!result.fired);
        assert!(result.reason.contains("No geolocation data"));
    }

    #[test]
    fn vpn_detection_fires() {
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Login, "p"))
            .geo(GeoContext {
                is_vpn: true,
                location_changes: 0,
            })
            .build();
        let r = rule(
            "geo",
            "geolocation",
            serde_json::json!({"enable_vpn_detection": true}),
        );

        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        assert_eq!(result.risk, 0.5);
        assert_eq!(result.reason, "VPN detected");
    }

    #[test]
    fn location_changes_fire() {
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Login, "p"))
            .geo(GeoContext {
                is_vpn: false,
                location_changes: 5,
            })
            .build();
        let r = rule(
            "geo",
            "geolocation",
            serde_json::json!({
                "enable_location_consistency": true,
                "max_location_changes": 3
            }),
        );

        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        // 5 / 10 = 0.5, under the 0.6 cap.
        assert!((result.risk - 0.5).abs() < 1e-9);
    }

    #[test]
    fn geolocation_all_checks_disabled_passes() {
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Login, "p"))
            .geo(GeoContext {
                is_vpn: true,
                location_changes: 9,
            })
            .build();
        let r = rule("geo", "geolocation", serde_json::json!({}));
        let result = registry().evaluate(&r, &ctx);
        assert!(!result.fired);
        assert_eq!(result.reason, "Geolocation checks passed");
    }

    // ── Behavior ────────────────────────────────────────────────────

    #[test]
    fn behavior_fires_over_threshold() {
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Checkout, "p"))
            .behavior_score(0.75)
            .build();
        let r = rule(
            "behavior",
            "behavior",
            serde_json::json!({"enable_behavioral_analysis": true}),
        );

        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        assert!((result.risk - 0.75).abs() < 1e-9);
    }

    #[test]
    fn behavior_score_capped() {
        let ctx = EvaluationContext::builder(EventContext::new(EventType::Checkout, "p"))
            .behavior_score(0.95)
            .build();
        let r = rule(
            "behavior",
            "behavior",
            serde_json::json!({"enable_behavioral_analysis": true, "behavior_threshold": 0.5}),
        );
        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        assert!((result.risk - 0.8).abs() < 1e-9);
    }

    #[test]
    fn behavior_not_enabled_is_diagnostic() {
        let r = rule("behavior", "behavior", serde_json::json!({}));
        let result = registry().evaluate(&r, &login_ctx());
        assert!(!result.fired);
        assert!(result.reason.contains("not enabled"));
    }

    // ── Amount ──────────────────────────────────────────────────────

    #[test]
    fn amount_over_limit_fires() {
        let event = EventContext::new(EventType::Payment, "p").with_amount(15_000.0);
        let ctx = EvaluationContext::builder(event).build();
        let r = rule(
            "amount-ceiling",
            "amount",
            serde_json::json!({"max_amount": 10_000.0}),
        );

        let result = registry().evaluate(&r, &ctx);
        assert!(result.fired);
        // 1.5 capped at 0.8.
        assert!((result.risk - 0.8).abs() < 1e-9);
    }

    #[test]
    fn amount_missing_on_event_is_diagnostic() {
        let r = rule(
            "amount-ceiling",
            "amount",
            serde_json::json!({"max_amount": 100.0}),
        );
        let result = registry().evaluate(&r, &login_ctx());
        assert!(!result.fired);
        assert!(result.reason.contains("No amount on event"));
    }

    #[test]
    fn amount_unconfigured_is_diagnostic() {
        let r = rule("amount-ceiling", "amount", serde_json::json!({}));
        let result = registry().evaluate(&r, &login_ctx());
        assert!(!result.fired);
        assert!(result.reason.contains("No max_amount configured"));
    }

    // ── Registry ────────────────────────────────────────────────────

    #[test]
    fn unknown_kind_is_non_firing_diagnostic() {
        let r = rule("exotic", "ml_embedding_distance", serde_json::json!({}));
        let result = registry().evaluate(&r, &login_ctx());
        assert!(!result.fired);
        assert_eq!(result.risk, 0.0);
        assert!(result.reason.contains("Unknown rule kind"));
    }

    #[test]
    fn custom_evaluator_can_be_registered() {
        struct AlwaysFire;
        impl Evaluate for AlwaysFire {
            fn evaluate(&self, rule: &RuleDefinition, _ctx: &EvaluationContext) -> RuleResult {
                RuleResult::fire(&rule.name, "always", 0.42)
            }
        }

        let mut registry = EvaluatorRegistry::new();
        registry.register("always_fire", Box::new(AlwaysFire));

        let r = rule("canary", "always_fire", serde_json::json!({}));
        let result = registry.evaluate(&r, &login_ctx());
        assert!(result.fired);
        assert_eq!(result.risk, 0.42);
    }

    #[test]
    fn registry_lists_builtin_kinds() {
        let registry = registry();
        let kinds = registry.kinds();
        for expected in [
            "amount",
            "behavior",
            "device",
            "geolocation",
            "keyword",
            "rate_limit",
            "velocity",
        ] {
            assert!(kinds.contains(&expected), "missing {}", expected);
        }
    }
}
