use crate::error::EvalError;
use crate::exports::ExportArtifact;
use crate::model::ModelInstance;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Runtime value flowing through pipes during a workflow run.
///
/// Compound values (`Sequence`, `Object`) hold their children behind
/// [`SharedValue`] handles, so two pipes fed from the same source variable
/// alias the same underlying value. In-place mutation performed by a model
/// method is therefore visible to every downstream holder.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Sequence(Vec<SharedValue>),
    Object(ModelInstance),
    Artifact(ExportArtifact),
}

/// Shared-ownership handle to a runtime value. Pipes copy these handles, not
/// the values behind them; the lifetime of a value is the lifetime of its
/// longest holder.
pub type SharedValue = Rc<RefCell<Value>>;

/// Wraps a plain value into a [`SharedValue`] handle.
pub fn shared(value: Value) -> SharedValue {
    Rc::new(RefCell::new(value))
}

impl Value {
    /// Short name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Str(_) => "Str",
            Value::Sequence(_) => "Sequence",
            Value::Object(_) => "Object",
            Value::Artifact(_) => "Artifact",
        }
    }

    /// Convenience constructor for a sequence of plain values.
    pub fn sequence(values: impl IntoIterator<Item = Value>) -> Value {
        Value::Sequence(values.into_iter().map(shared).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{}.0", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Sequence(items) => write!(f, "sequence of {} values", items.len()),
            Value::Object(instance) => write!(f, "{} object", instance.class),
            Value::Artifact(artifact) => {
                write!(f, "artifact '{}.{}'", artifact.export_name, artifact.extension)
            }
        }
    }
}

/// Declared type of a variable slot. Used by pipe-compatible callers for
/// validation and exposed through the schema boundary; the engine itself
/// never coerces values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Typing {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    Str,
    Sequence,
    Class(String),
}

impl Typing {
    /// Checks whether a runtime value satisfies this declared type.
    /// `Float` accepts integer values; `Any` accepts everything.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Typing::Any, _) => true,
            (Typing::Bool, Value::Bool(_)) => true,
            (Typing::Int, Value::Int(_)) => true,
            (Typing::Float, Value::Float(_) | Value::Int(_)) => true,
            (Typing::Str, Value::Str(_)) => true,
            (Typing::Sequence, Value::Sequence(_)) => true,
            (Typing::Class(class), Value::Object(instance)) => &instance.class == class,
            _ => false,
        }
    }

    /// The JSON-schema primitive this type maps to, for the external schema
    /// generator.
    pub fn json_type(&self) -> &'static str {
        match self {
            Typing::Any => "any",
            Typing::Bool => "boolean",
            Typing::Int => "integer",
            Typing::Float => "number",
            Typing::Str => "string",
            Typing::Sequence => "array",
            Typing::Class(_) => "object",
        }
    }
}

impl fmt::Display for Typing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Typing::Class(class) => write!(f, "{}", class),
            other => write!(f, "{}", other.json_type()),
        }
    }
}

/// Resolves a `/`-separated attribute path against a value: object segments
/// name fields, sequence segments are numeric indices. The returned handle is
/// shared with the source, never a copy.
pub fn resolve_attribute_path(root: &SharedValue, path: &str) -> Result<SharedValue, EvalError> {
    let mut current = root.clone();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let next = {
            let value = current.borrow();
            match &*value {
                Value::Object(instance) => {
                    instance
                        .get(segment)
                        .ok_or_else(|| EvalError::AttributeNotFound {
                            class: instance.class.clone(),
                            attribute: segment.to_string(),
                        })?
                }
                Value::Sequence(items) => {
                    let index: usize =
                        segment.parse().map_err(|_| EvalError::TypeMismatch {
                            operation: format!("attribute path '{}'", path),
                            expected: "numeric sequence index".to_string(),
                            found: format!("'{}'", segment),
                        })?;
                    items
                        .get(index)
                        .cloned()
                        .ok_or(EvalError::IndexOutOfRange {
                            index,
                            length: items.len(),
                        })?
                }
                other => {
                    return Err(EvalError::TypeMismatch {
                        operation: format!("attribute path '{}'", path),
                        expected: "Object or Sequence".to_string(),
                        found: other.kind().to_string(),
                    });
                }
            }
        };
        current = next;
    }
    Ok(current)
}
