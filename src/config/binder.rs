//! Configuration binder for driver and plugin settings.
//!
//! Every driver kind declares a [`ConfigSchema`]: a flat list of fields with
//! a type, a required flag and a human label. The binder checks an incoming
//! free-form configuration blob against that schema before any resource is
//! loaded, then maps it onto the driver's typed settings struct.
//!
//! ```rust,ignore
//! let schema = ConfigSchema::new("ticker", "Ticker")
//!     .required("interval_ms", FieldType::Integer, "Tick interval (ms)")
//!     .optional("label", FieldType::String, "Payload label");
//!
//! let settings: TickerConfig = bind(&schema, &config)?;
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while validating or binding configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{schema}: configuration must be an object")]
    NotAnObject { schema: String },

    #[error("{schema}: missing required field '{field}' ({label})")]
    MissingField {
        schema: String,
        field: String,
        label: String,
    },

    #[error("{schema}: field '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        schema: String,
        field: String,
        expected: FieldType,
        actual: String,
    },

    #[error("{schema}: {message}")]
    Bind { schema: String, message: String },

    #[error("Unknown {kind} type: {type_tag}")]
    UnknownType { kind: String, type_tag: String },

    #[error("Invalid definition: {0}")]
    Definition(String),
}

/// Value type of a configuration field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    /// Check whether a JSON value satisfies this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            // Integers are acceptable wherever a float is expected
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// One declared configuration field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Key in the configuration object
    pub name: String,

    /// Expected value type
    pub field_type: FieldType,

    /// Whether the field must be present
    pub required: bool,

    /// Human-readable label for admin surfaces
    pub label: String,
}

/// Self-describing configuration shape of a driver or plugin kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSchema {
    /// Type tag the schema belongs to
    pub kind: String,

    /// Display name
    pub label: String,

    /// Declared fields, in declaration order
    pub fields: Vec<FieldSpec>,
}

impl ConfigSchema {
    pub fn new(kind: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: label.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a required field
    pub fn required(self, name: &str, field_type: FieldType, label: &str) -> Self {
        self.field(name, field_type, true, label)
    }

    /// Declare an optional field
    pub fn optional(self, name: &str, field_type: FieldType, label: &str) -> Self {
        self.field(name, field_type, false, label)
    }

    fn field(mut self, name: &str, field_type: FieldType, required: bool, label: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            field_type,
            required,
            label: label.to_string(),
        });
        self
    }

    /// Validate a configuration blob against the declared fields.
    ///
    /// `null` is treated as an empty object so that kinds without required
    /// fields can be loaded with no configuration at all. Undeclared keys are
    /// allowed and left for the driver to ignore.
    pub fn validate(&self, config: &Value) -> Result<(), ValidationError> {
        let empty = serde_json::Map::new();
        let object = match config {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(ValidationError::NotAnObject {
                    schema: self.kind.clone(),
                })
            }
        };

        for spec in &self.fields {
            match object.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(ValidationError::MissingField {
                        schema: self.kind.clone(),
                        field: spec.name.clone(),
                        label: spec.label.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.field_type.accepts(value) => {
                    return Err(ValidationError::TypeMismatch {
                        schema: self.kind.clone(),
                        field: spec.name.clone(),
                        expected: spec.field_type,
                        actual: json_type_name(value).to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// Validate `config` against `schema`, then deserialize it into `T`
pub fn bind<T: DeserializeOwned>(schema: &ConfigSchema, config: &Value) -> Result<T, ValidationError> {
    schema.validate(config)?;

    let source = match config {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };

    serde_json::from_value(source).map_err(|e| ValidationError::Bind {
        schema: schema.kind.clone(),
        message: e.to_string(),
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
