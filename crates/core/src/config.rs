//! Environment-driven configuration.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::{DEFAULT_CURRENT_FPR, DEFAULT_SEGMENT};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_f64(key: &str, default: f64) -> f64 {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, "invalid float in env var, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Process-level configuration for tooling around the engine.
///
/// The engine itself takes everything through explicit arguments; this
/// only tells the CLI and loaders where the configuration documents live
/// and which fallbacks to assume when a caller omits segment/FPR inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory scanned for rule and composition documents.
    pub rules_dir: PathBuf,
    /// Path of the decision matrix document.
    pub matrix_path: PathBuf,
    /// Segment assumed when the caller does not supply one.
    pub default_segment: String,
    /// FPR assumed when no live measurement is available.
    pub default_fpr: f64,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            rules_dir: PathBuf::from(env_or("VERDICT_RULES_DIR", "data/rules/examples")),
            matrix_path: PathBuf::from(env_or("VERDICT_MATRIX_PATH", "data/matrix/default.yml")),
            default_segment: env_or("VERDICT_DEFAULT_SEGMENT", DEFAULT_SEGMENT),
            default_fpr: env_f64("VERDICT_DEFAULT_FPR", DEFAULT_CURRENT_FPR),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules_dir: PathBuf::from("data/rules/examples"),
            matrix_path: PathBuf::from("data/matrix/default.yml"),
            default_segment: DEFAULT_SEGMENT.to_string(),
            default_fpr: DEFAULT_CURRENT_FPR,
        }
    }
}
