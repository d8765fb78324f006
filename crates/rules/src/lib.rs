//! Configuration documents for the verdict decision engine.
//!
//! This crate provides:
//! - The `apiVersion`/`kind`/`metadata`/`spec` document schema with serde
//!   deserialization (detection rules, compositions, decision matrix)
//! - Compilation of documents into flat runtime definitions
//! - A filesystem loader with hot-reload via `notify` watcher
//! - Structured validation with errors and warnings

pub mod loader;
pub mod matrix_doc;
pub mod schema;
pub mod validation;

pub use loader::{LoadResult, LoadStatus, RuleError, RuleLoader};
pub use matrix_doc::{default_matrix, matrix_from_flat_json, MatrixDocument};
pub use schema::{
    rule_set_from_flat_json, Combinator, CommonMetadata, CompositionDefinition,
    CompositionDocument, DetectionRuleDocument, DocumentEnvelope, DocumentKind, RuleDefinition,
    RuleDocument, RuleKind, RuleSet,
};
pub use validation::{
    validate_matrix, validate_rule_set, ValidationError, ValidationResult, ValidationWarning,
};
