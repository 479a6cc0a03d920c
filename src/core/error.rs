//! Error taxonomy for the engine's public operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::lifecycle::ResourceState;
use crate::config::binder::ValidationError;
use crate::script::ScriptError;

/// Kinds of resources the registry tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    InEnd,
    OutEnd,
    Device,
    Rule,
    Plugin,
    App,
    Goods,
}

impl ResourceKind {
    /// Prefix used for generated ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::InEnd => "INEND",
            Self::OutEnd => "OUTEND",
            Self::Device => "DEVICE",
            Self::Rule => "RULE",
            Self::Plugin => "PLUGIN",
            Self::App => "APP",
            Self::Goods => "GOODS",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InEnd => "input",
            Self::OutEnd => "output",
            Self::Device => "device",
            Self::Rule => "rule",
            Self::Plugin => "plugin",
            Self::App => "app",
            Self::Goods => "goods",
        };
        f.write_str(name)
    }
}

/// Errors returned by registry, lifecycle and dispatch operations.
///
/// None of these mutate engine state: a failed load leaves nothing behind,
/// a failed transition leaves the resource where it was.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: ResourceKind, id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    /// Target absent, or present but not `Up`
    #[error("Resource unavailable: {id}{}", state.map(|s| format!(" ({})", s)).unwrap_or_default())]
    ResourceUnavailable {
        id: String,
        state: Option<ResourceState>,
    },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Ingest queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid state transition for {id}: {from} → {to}")]
    InvalidTransition {
        id: String,
        from: ResourceState,
        to: ResourceState,
    },

    #[error("Driver error on {id}: {message}")]
    Driver { id: String, message: String },

    #[error("Delivery to {id} timed out after {timeout_ms}ms")]
    EffectTimeout { id: String, timeout_ms: u64 },

    #[error("Plugins can only be registered during startup")]
    PluginsSealed,
}

impl EngineError {
    pub(crate) fn driver(id: &str, err: &anyhow::Error) -> Self {
        Self::Driver {
            id: id.to_string(),
            message: format!("{:#}", err),
        }
    }

    /// Whether the error means the target cannot take payloads right now
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ResourceUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message() {
        let absent = EngineError::ResourceUnavailable {
            id: "in-1".to_string(),
            state: None,
        };
        assert_eq!(absent.to_string(), "Resource unavailable: in-1");

        let paused = EngineError::ResourceUnavailable {
            id: "in-1".to_string(),
            state: Some(ResourceState::Paused),
        };
        assert_eq!(paused.to_string(), "Resource unavailable: in-1 (paused)");
    }

    #[test]
    fn test_driver_error_keeps_context_chain() {
        let err = anyhow::anyhow!("port busy").context("Failed to start listener");
        let err = EngineError::driver("in-1", &err);
        assert_eq!(
            err.to_string(),
            "Driver error on in-1: Failed to start listener: port busy"
        );
    }
}
