//! The verdict evaluation engine.
//!
//! Pure, synchronous decision logic:
//! - Per-kind rule evaluators behind a string-keyed registry
//! - AND/OR/MAJORITY composition evaluation
//! - Risk aggregation with multi-violation amplification
//! - The decision matrix runtime with copy-on-write hot reload
//! - The pipeline + orchestrator tying it all together
//!
//! Nothing in this crate performs I/O or blocks; all inputs arrive
//! pre-resolved inside an `EvaluationContext`.

pub mod composition;
pub mod evaluators;
pub mod matrix;
pub mod pipeline;
pub mod risk;

pub use composition::evaluate_composition;
pub use evaluators::{Evaluate, EvaluatorRegistry};
pub use matrix::DecisionMatrix;
pub use pipeline::{DecisionEngine, Pipeline};
pub use risk::{aggregate_risk, RiskTuning};
