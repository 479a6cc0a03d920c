//! Resource definitions handed to the engine by the admin/persistence layer.
//!
//! Definitions are plain data: they carry identity, the driver type tag and
//! the free-form configuration blob. The engine turns them into live
//! resources on load and never mutates them afterwards; reconfiguration is
//! always remove-then-load with a new definition.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::binder::ValidationError;

/// Generate a fresh resource id with a kind prefix (e.g. `INEND3f2a...`)
pub fn make_id(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4().simple())
}

/// Declared shape of one field of an input payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModel {
    pub name: String,

    #[serde(rename = "type", default)]
    pub field_type: String,

    #[serde(default)]
    pub description: String,
}

/// Definition of an input endpoint (ingress point backed by a source driver)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InEndDefinition {
    #[serde(default)]
    pub id: String,

    /// Driver type tag (selects the source driver family)
    #[serde(rename = "type")]
    pub kind: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Free-form driver configuration, validated against the driver schema
    #[serde(default)]
    pub config: serde_json::Value,

    /// Optional declared payload shape
    #[serde(default)]
    pub data_models: Vec<DataModel>,
}

impl InEndDefinition {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            name: name.into(),
            description: String::new(),
            config: serde_json::Value::Null,
            data_models: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// Definition of an output endpoint (egress point backed by a sink driver)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutEndDefinition {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub config: serde_json::Value,
}

impl OutEndDefinition {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            name: name.into(),
            description: String::new(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// Definition of a device (stateful peripheral backed by a device driver)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefinition {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub config: serde_json::Value,
}

impl DeviceDefinition {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            name: name.into(),
            description: String::new(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// Which evaluator runs a rule's predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    /// General scripting (Rhai)
    #[default]
    #[serde(alias = "lua", alias = "rhai")]
    Script,

    /// Restricted expression language
    Expr,
}

/// Definition of a rule bound to inputs and/or devices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDefinition {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Evaluator for `expression`; callbacks always use general scripting
    #[serde(rename = "type", default)]
    pub evaluator: EvaluatorKind,

    /// Input endpoint ids feeding this rule
    #[serde(default)]
    pub from_source: Vec<String>,

    /// Device ids feeding this rule
    #[serde(default)]
    pub from_device: Vec<String>,

    /// Predicate/transform source (empty = always passes)
    #[serde(default)]
    pub expression: String,

    /// Always runs after the predicate
    #[serde(default)]
    pub actions: String,

    /// Runs when the predicate is truthy
    #[serde(default)]
    pub success: String,

    /// Runs when the predicate is falsy or fails
    #[serde(default)]
    pub failed: String,
}

impl RuleDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Every target id (inputs first, then devices) this rule is bound to
    pub fn targets(&self) -> impl Iterator<Item = &String> {
        self.from_source.iter().chain(self.from_device.iter())
    }
}

/// Definition of an application: an external script/executable tracked by
/// the engine and optionally started at boot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDefinition {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub version: String,

    pub path: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub auto_start: bool,

    #[serde(default)]
    pub description: String,
}

/// Definition of goods: an external companion process started on load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoodsDefinition {
    #[serde(default)]
    pub id: String,

    /// Executable path or address
    pub addr: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub description: String,
}

/// Fill an empty id with a generated one
pub(crate) fn normalize_id(id: &mut String, prefix: &str) {
    if id.trim().is_empty() {
        *id = make_id(prefix);
    }
}

pub(crate) fn require_field(value: &str, what: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Definition(format!("{} cannot be empty", what)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_id_prefix() {
        let id = make_id("RULE");
        assert!(id.starts_with("RULE"));
        assert_eq!(id.len(), 4 + 32);
        assert_ne!(id, make_id("RULE"));
    }

    #[test]
    fn test_rule_yaml_parsing() {
        let yaml = r#"
id: r-1
name: overheat
type: lua
from_source: [in-1]
from_device: [dev-1]
expression: "temperature > 30"
actions: 'output("out-1", data)'
"#;
        let rule: RuleDefinition = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(rule.evaluator, EvaluatorKind::Script);
        assert_eq!(rule.targets().collect::<Vec<_>>(), vec!["in-1", "dev-1"]);
        assert!(rule.success.is_empty());
    }

    #[test]
    fn test_expr_evaluator_kind() {
        let rule: RuleDefinition = serde_yaml::from_str("name: r\ntype: expr\n").unwrap();
        assert_eq!(rule.evaluator, EvaluatorKind::Expr);
    }

    #[test]
    fn test_normalize_id() {
        let mut id = String::new();
        normalize_id(&mut id, "INEND");
        assert!(id.starts_with("INEND"));

        let mut kept = "in-1".to_string();
        normalize_id(&mut kept, "INEND");
        assert_eq!(kept, "in-1");
    }
}
