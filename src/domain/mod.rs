//! Domain types for the rule engine.
//!
//! This module contains the plain data structures:
//! - Definitions: what the admin layer hands the engine to load
//! - Outcomes: what a dispatch produced per rule

pub mod definition;
pub mod outcome;

// Re-export commonly used types
pub use definition::{
    make_id, AppDefinition, DataModel, DeviceDefinition, EvaluatorKind, GoodsDefinition,
    InEndDefinition, OutEndDefinition, RuleDefinition,
};
pub use outcome::{Branch, DispatchReport, Effect, PredicateResult, RuleOutcome};
