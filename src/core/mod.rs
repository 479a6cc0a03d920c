//! Rule engine core.
//!
//! This module contains:
//! - Registry: id → live resource tables and the rule binding index
//! - Dispatcher: the `work` pipeline
//! - RuleEngine: load/remove/reload/pause and graceful shutdown
//! - Bootstrap: loading a configuration file into an engine

pub mod bootstrap;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod resource;

// Re-export commonly used types
pub use bootstrap::{bootstrap, check, BootReport, CheckIssue};
pub use dispatch::Dispatcher;
pub use engine::RuleEngine;
pub use error::{EngineError, ResourceKind};
pub use lifecycle::{ResourceState, StateCell};
pub use registry::{Registry, RegistrySummary, Table};
pub use resource::{Device, InEnd, OutEnd};
