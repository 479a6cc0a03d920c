//! Script evaluation for rules.
//!
//! A rule's predicate runs through one of two evaluators behind the
//! [`ScriptEvaluator`] contract:
//! - `script`: general scripting (Rhai), may also transform the payload
//! - `expr`: restricted expression language (evalexpr), boolean-ish only
//!
//! Callbacks (Actions/Success/Failed) always run as general scripts. Each
//! compiled script owns its interpreter; the scope and the recorded effects
//! are built per evaluation, so concurrent evaluations of the same rule
//! share nothing mutable.

pub mod expr;
pub mod rhai_script;
pub mod rule;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Effect, EvaluatorKind};

pub use expr::ExprScript;
pub use rhai_script::RhaiScript;
pub use rule::{CompiledRule, RuleExecution};

/// Names bound by the engine itself; payload fields never shadow them
const RESERVED_NAMES: &[&str] = &["data", "payload", "source", "error"];

/// Limits applied to every script evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLimits {
    /// Maximum interpreter operations per script run (default: 100k)
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    /// Maximum function call depth (default: 32)
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,
}

fn default_max_operations() -> u64 {
    100_000
}
fn default_max_call_levels() -> usize {
    32
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
        }
    }
}

/// Stage of rule execution a script belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    Compile,
    Predicate,
    Actions,
    Success,
    Failed,
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Compile => "compile",
            Self::Predicate => "predicate",
            Self::Actions => "actions",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A script fault, contained at the evaluator boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Rule {rule} {phase} script failed: {message}")]
pub struct ScriptError {
    pub rule: String,
    pub phase: ScriptPhase,
    pub message: String,
}

impl ScriptError {
    pub fn new(rule: &str, phase: ScriptPhase, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            phase,
            message: message.into(),
        }
    }
}

/// Values bound into a script's evaluation scope
#[derive(Debug, Clone)]
pub struct Bindings {
    /// Id of the endpoint or device the payload came from
    pub source: String,

    /// Raw payload text
    pub data: String,

    /// Parsed payload (`Null` when the payload is not JSON)
    pub payload: Value,

    /// Predicate error text, bound for the Failed callback
    pub error: Option<String>,
}

impl Bindings {
    pub fn new(source: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        let payload = serde_json::from_str(&data).unwrap_or(Value::Null);
        Self {
            source: source.into(),
            data,
            payload,
            error: None,
        }
    }

    /// Replace the payload with a transform result
    pub fn with_payload(&self, payload: Value) -> Self {
        match payload {
            Value::String(text) => Self {
                error: self.error.clone(),
                ..Self::new(self.source.clone(), text)
            },
            other => Self {
                source: self.source.clone(),
                data: other.to_string(),
                payload: other,
                error: self.error.clone(),
            },
        }
    }

    pub fn with_error(&self, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..self.clone()
        }
    }

    /// Top-level payload fields usable as bare variable names
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.payload
            .as_object()
            .into_iter()
            .flat_map(|map| map.iter())
            .filter(|(key, _)| is_identifier(key) && !RESERVED_NAMES.contains(&key.as_str()))
    }
}

/// Result of a predicate evaluation
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub truthy: bool,

    /// Replacement payload for the callbacks, if the predicate transformed it
    pub transformed: Option<Value>,

    /// Effects requested while evaluating
    pub effects: Vec<Effect>,
}

impl Evaluation {
    /// Result of an empty predicate
    pub fn pass() -> Self {
        Self {
            truthy: true,
            ..Default::default()
        }
    }
}

/// Evaluate predicate/transform source against bound payload
pub trait ScriptEvaluator: Send + Sync + fmt::Debug {
    fn kind(&self) -> EvaluatorKind;

    /// Evaluate against `bindings`; `Err` carries the fault message
    fn evaluate(&self, bindings: &Bindings) -> Result<Evaluation, String>;
}

/// Compile predicate source for the given evaluator kind
pub fn compile_predicate(
    kind: EvaluatorKind,
    source: &str,
    limits: &ScriptLimits,
) -> Result<Box<dyn ScriptEvaluator>, String> {
    Ok(match kind {
        EvaluatorKind::Script => Box::new(RhaiScript::compile(source, limits)?),
        EvaluatorKind::Expr => Box::new(ExprScript::compile(source)?),
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bindings_parse_json() {
        let bindings = Bindings::new("in-1", r#"{"temperature": 40, "unit": "C"}"#);
        assert_eq!(bindings.payload["temperature"], json!(40));

        let names: Vec<&str> = bindings.fields().map(|(k, _)| k.as_str()).collect();
        assert!(names.contains(&"temperature"));
        assert!(names.contains(&"unit"));
    }

    #[test]
    fn test_bindings_non_json() {
        let bindings = Bindings::new("in-1", "raw bytes here");
        assert_eq!(bindings.payload, Value::Null);
        assert_eq!(bindings.fields().count(), 0);
    }

    #[test]
    fn test_fields_skip_reserved_and_invalid_names() {
        let bindings = Bindings::new("in-1", r#"{"data": 1, "two words": 2, "9lives": 3, "ok_1": 4}"#);
        let names: Vec<&str> = bindings.fields().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["ok_1"]);
    }

    #[test]
    fn test_with_payload_string_reparses() {
        let bindings = Bindings::new("in-1", "{}").with_payload(json!(r#"{"a": 1}"#));
        assert_eq!(bindings.payload["a"], json!(1));

        let bindings = Bindings::new("in-1", "{}").with_payload(json!({ "b": 2 }));
        assert_eq!(bindings.data, r#"{"b":2}"#);
    }
}
