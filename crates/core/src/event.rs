//! Event and profile snapshots submitted for evaluation.
//!
//! Both types are snapshots assembled by the caller from its stores; the
//! engine never mutates them and never follows references back to storage.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VerdictError;

// ── Event type ──────────────────────────────────────────────────────

/// Behavioral event categories accepted for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Login,
    Signup,
    Checkout,
    Payment,
    /// Project-defined event type; evaluated like any other.
    Custom,
}

impl EventType {
    /// Wire label, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Login => "login",
            EventType::Signup => "signup",
            EventType::Checkout => "checkout",
            EventType::Payment => "payment",
            EventType::Custom => "custom",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = VerdictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(EventType::Login),
            "signup" => Ok(EventType::Signup),
            "checkout" => Ok(EventType::Checkout),
            "payment" => Ok(EventType::Payment),
            "custom" => Ok(EventType::Custom),
            other => Err(VerdictError::UnknownEventType(other.to_string())),
        }
    }
}

// ── Event context ───────────────────────────────────────────────────

/// A single observed event, immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    /// Event ID assigned by the ingesting collaborator.
    pub id: Uuid,
    pub event_type: EventType,
    /// Free-form event payload (key → JSON value).
    #[serde(default)]
    pub event_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Monetary amount for checkout/payment events.
    #[serde(default)]
    pub amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    /// Owning project.
    pub project_id: String,
}

impl EventContext {
    /// Create an event with a fresh ID and the current timestamp.
    ///
    /// Intended for tests and tooling; production callers carry IDs and
    /// timestamps from ingestion.
    pub fn new(event_type: EventType, project_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            event_data: HashMap::new(),
            profile_id: None,
            device_fingerprint: None,
            ip_address: None,
            amount: None,
            created_at: Utc::now(),
            project_id: project_id.into(),
        }
    }

    pub fn with_profile_id(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = Some(profile_id.into());
        self
    }

    pub fn with_device_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.device_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Insert a payload entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.event_data.insert(key.into(), value.into());
        self
    }
}

// ── Profile context ─────────────────────────────────────────────────

/// Profile snapshot at evaluation time, not a live reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileContext {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

impl ProfileContext {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            last_activity: None,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
