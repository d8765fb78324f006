//! Core data contracts for the verdict fraud decision engine.
//!
//! This crate defines the types that flow through an evaluation:
//! - Event and profile snapshots ([`EventContext`], [`ProfileContext`])
//! - The per-evaluation input bundle ([`EvaluationContext`])
//! - Decision-side contracts: actions, risk bands, rule results, the
//!   decision matrix configuration, and the final [`DecisionResult`]
//!
//! Everything here is plain data; the evaluation logic lives in
//! `verdict-engine` and the configuration documents in `verdict-rules`.

pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod event;

pub use config::Config;
pub use context::*;
pub use decision::*;
pub use error::*;
pub use event::*;
