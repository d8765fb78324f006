//! The per-evaluation input bundle.
//!
//! An [`EvaluationContext`] carries everything the engine needs already
//! resolved: the event, an optional profile snapshot, pre-aggregated
//! counters, geolocation flags, and a behavior anomaly score. It is built
//! fresh for each evaluation and never mutated afterwards; the engine
//! performs no I/O of its own.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::decision::clamp_unit;
use crate::event::{EventContext, ProfileContext};

// ── Counter scopes ──────────────────────────────────────────────────

/// Events from the same IP within the rate-limit window.
pub const SCOPE_IP: &str = "ip";
/// Events from the same profile within the rate-limit window.
pub const SCOPE_PROFILE: &str = "profile";
/// Events from the same device fingerprint.
pub const SCOPE_DEVICE: &str = "device";
/// Events from the same profile within the velocity window.
pub const SCOPE_PROFILE_VELOCITY: &str = "profile_velocity";

/// Segment assumed when the caller does not supply one.
pub const DEFAULT_SEGMENT: &str = "new_user";
/// FPR assumed when no live measurement is available.
pub const DEFAULT_CURRENT_FPR: f64 = 0.01;

// ── Geolocation descriptor ──────────────────────────────────────────

/// Geolocation signals resolved by the context-assembly service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoContext {
    /// The source IP resolved to a known VPN or proxy exit.
    #[serde(default)]
    pub is_vpn: bool,
    /// Distinct location changes observed in the recent window.
    #[serde(default)]
    pub location_changes: u32,
}

// ── Evaluation context ──────────────────────────────────────────────

/// All inputs for one decision, resolved ahead of time by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub event: EventContext,
    #[serde(default)]
    pub profile: Option<ProfileContext>,
    /// Pre-aggregated event counts keyed by scope name (`ip`, `profile`,
    /// `device`, `profile_velocity`).
    #[serde(default)]
    pub counters: HashMap<String, u64>,
    #[serde(default)]
    pub geo: Option<GeoContext>,
    /// Behavior anomaly score in [0, 1].
    #[serde(default)]
    pub behavior_score: f64,
    /// Customer segment used for the matrix lookup.
    #[serde(default = "default_segment")]
    pub customer_segment: String,
    /// Latest observed false-positive rate for this segment.
    #[serde(default = "default_current_fpr")]
    pub current_fpr: f64,
}

fn default_segment() -> String {
    DEFAULT_SEGMENT.to_string()
}

fn default_current_fpr() -> f64 {
    DEFAULT_CURRENT_FPR
}

impl EvaluationContext {
    pub fn builder(event: EventContext) -> ContextBuilder {
        ContextBuilder::new(event)
    }

    /// Counter for a scope; missing scopes read as 0.
    pub fn counter(&self, scope: &str) -> u64 {
        self.counters.get(scope).copied().unwrap_or(0)
    }
}

/// Builder for [`EvaluationContext`].
///
/// Clamps the behavior score at construction so downstream code can rely
/// on the [0, 1] invariant.
#[derive(Debug)]
pub struct ContextBuilder {
    event: EventContext,
    profile: Option<ProfileContext>,
    counters: HashMap<String, u64>,
    geo: Option<GeoContext>,
    behavior_score: f64,
    customer_segment: String,
    current_fpr: f64,
}

impl ContextBuilder {
    pub fn new(event: EventContext) -> Self {
        Self {
            event,
            profile: None,
            counters: HashMap::new(),
            geo: None,
            behavior_score: 0.0,
            customer_segment: DEFAULT_SEGMENT.to_string(),
            current_fpr: DEFAULT_CURRENT_FPR,
        }
    }

    pub fn profile(mut self, profile: ProfileContext) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set a single counter scope.
    pub fn counter(mut self, scope: impl Into<String>, count: u64) -> Self {
        self.counters.insert(scope.into(), count);
        self
    }

    /// Replace the whole counter map.
    pub fn counters(mut self, counters: HashMap<String, u64>) -> Self {
        self.counters = counters;
        self
    }

    pub fn geo(mut self, geo: GeoContext) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn behavior_score(mut self, score: f64) -> Self {
        self.behavior_score = clamp_unit(score);
        self
    }

    pub fn customer_segment(mut self, segment: impl Into<String>) -> Self {
        self.customer_segment = segment.into();
        self
    }

    pub fn current_fpr(mut self, fpr: f64) -> Self {
        self.current_fpr = clamp_unit(fpr);
        self
    }

    pub fn build(self) -> EvaluationContext {
        EvaluationContext {
            event: self.event,
            profile: self.profile,
            counters: self.counters,
            geo: self.geo,
            behavior_score: self.behavior_score,
            customer_segment: self.customer_segment,
            current_fpr: self.current_fpr,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
