//! rulegate - Edge gateway rule engine
//!
//! Ingests payloads from heterogeneous sources, evaluates small rule
//! scripts against them, and forwards results to outputs and devices.
//! Resources can be loaded, paused, reloaded and removed while the engine
//! keeps running.
//!
//! # Architecture
//!
//! ```text
//! Source driver ─▶ IngestQueue ─▶ lane consumer ─▶ Dispatcher::work
//!                                                     │
//!                                     CompiledRule (predicate → Actions → Success | Failed)
//!                                                     │
//!                                         effects ─▶ Output | Device | log
//! ```
//!
//! - The registry is the sole owner of live resources; dispatch resolves
//!   ids through it on every call
//! - Admin operations go through [`RuleEngine`], which validates, starts and
//!   publishes resources, and tears them down in reverse
//!
//! # Modules
//!
//! - `core`: Registry, dispatch pipeline, lifecycle, bootstrap
//! - `script`: Rule evaluators (Rhai scripts, evalexpr expressions)
//! - `ingest`: Bounded ingest queue and per-producer dispatch consumers
//! - `drivers`: Driver contracts and built-in drivers
//! - `plugins`: Process-level extensions
//! - `apps`: External application and goods processes
//! - `domain`: Definitions and dispatch outcomes
//! - `config`: Configuration file and schema binding
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Validate a configuration
//! rulegate check --config gateway.yaml
//!
//! # Run until Ctrl-C
//! rulegate run --config gateway.yaml
//! ```

pub mod apps;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod drivers;
pub mod ingest;
pub mod plugins;
pub mod script;

// Re-export main types at crate root for convenience
pub use crate::config::EngineSettings;
pub use crate::core::{EngineError, ResourceKind, ResourceState, RuleEngine};
pub use domain::{
    DeviceDefinition, DispatchReport, Effect, InEndDefinition, OutEndDefinition, RuleDefinition,
};
pub use drivers::{DriverCatalog, MemoryDevice, MemorySink, MemorySource};
pub use ingest::QueueMode;
