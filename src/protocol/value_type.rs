//! Runtime value types used to declare method signatures.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::codec::{Key, Value};

/// Declared type of an argument or return value.
///
/// Validation is structural and works on decoded [`Value`]s, so the same
/// declaration checks both outbound arguments and inbound requests.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    // ---
    /// Any value, including nil.
    Any,
    Nil,
    Bool,
    /// Integer values only.
    Int,
    /// Any number; integers are accepted.
    Float,
    Str,
    Bytes,
    /// Homogeneous sequence.
    Array(Box<ValueType>),
    /// Fixed-length sequence with one type per position.
    Tuple(Vec<ValueType>),
    /// Map with string keys and homogeneous values.
    Map(Box<ValueType>),
    /// Map with named fields; undeclared fields are allowed.
    Struct(BTreeMap<String, ValueType>),
    /// The inner type or nil. A missing struct field counts as nil.
    Optional(Box<ValueType>),
    /// The first matching alternative wins.
    OneOf(Vec<ValueType>),
}

/// A value did not match its declared type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("at {path}: expected {expected}, found {found}")]
pub struct ValidationError {
    // ---
    /// Location inside the value, e.g. `$.items[2]`.
    pub path: String,
    pub expected: String,
    pub found: String,
}

impl ValueType {
    // ---
    pub fn array(item: ValueType) -> Self {
        ValueType::Array(Box::new(item))
    }

    pub fn tuple(items: impl IntoIterator<Item = ValueType>) -> Self {
        ValueType::Tuple(items.into_iter().collect())
    }

    pub fn map(value: ValueType) -> Self {
        ValueType::Map(Box::new(value))
    }

    pub fn structure<K: Into<String>>(fields: impl IntoIterator<Item = (K, ValueType)>) -> Self {
        ValueType::Struct(fields.into_iter().map(|(k, t)| (k.into(), t)).collect())
    }

    pub fn optional(inner: ValueType) -> Self {
        ValueType::Optional(Box::new(inner))
    }

    pub fn one_of(alternatives: impl IntoIterator<Item = ValueType>) -> Self {
        ValueType::OneOf(alternatives.into_iter().collect())
    }

    /// Check `value` against this type.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        // ---
        self.validate_at(value, &mut String::from("$"))
    }

    fn validate_at(&self, value: &Value, path: &mut String) -> Result<(), ValidationError> {
        // ---
        let mismatch = |path: &String| ValidationError {
            path: path.clone(),
            expected: self.to_string(),
            found: value.kind().to_string(),
        };

        match (self, value) {
            (ValueType::Any, _)
            | (ValueType::Nil, Value::Nil)
            | (ValueType::Bool, Value::Bool(_))
            | (ValueType::Int, Value::Int(_))
            | (ValueType::Float, Value::Int(_) | Value::Float(_))
            | (ValueType::Str, Value::Str(_))
            | (ValueType::Bytes, Value::Bytes(_))
            | (ValueType::Optional(_), Value::Nil) => Ok(()),

            (ValueType::Optional(inner), _) => inner.validate_at(value, path),

            (ValueType::Array(item), Value::Array(items)) => {
                for (i, element) in items.iter().enumerate() {
                    with_segment(path, &format!("[{i}]"), |p| item.validate_at(element, p))?;
                }
                Ok(())
            }

            (ValueType::Tuple(types), Value::Array(items)) => {
                if types.len() != items.len() {
                    return Err(ValidationError {
                        path: path.clone(),
                        expected: self.to_string(),
                        found: format!("array of length {}", items.len()),
                    });
                }
                for (i, (ty, element)) in types.iter().zip(items).enumerate() {
                    with_segment(path, &format!("[{i}]"), |p| ty.validate_at(element, p))?;
                }
                Ok(())
            }

            (ValueType::Map(item), Value::Map(entries)) => {
                for (key, element) in entries {
                    with_segment(path, &format!("[{key}]"), |p| match key {
                        Key::Str(_) => item.validate_at(element, p),
                        Key::Int(_) => Err(ValidationError {
                            path: p.clone(),
                            expected: "string key".to_string(),
                            found: "int key".to_string(),
                        }),
                    })?;
                }
                Ok(())
            }

            (ValueType::Struct(fields), Value::Map(entries)) => {
                for (name, ty) in fields {
                    let element = entries
                        .get(&Key::Str(name.clone()))
                        .unwrap_or(&Value::Nil);
                    with_segment(path, &format!(".{name}"), |p| ty.validate_at(element, p))?;
                }
                Ok(())
            }

            (ValueType::OneOf(alternatives), _) => {
                if alternatives
                    .iter()
                    .any(|alt| alt.validate_at(value, &mut path.clone()).is_ok())
                {
                    Ok(())
                } else {
                    Err(mismatch(path))
                }
            }

            _ => Err(mismatch(path)),
        }
    }
}

// Push a path segment for the duration of `f`.
fn with_segment<R>(path: &mut String, segment: &str, f: impl FnOnce(&mut String) -> R) -> R {
    let len = path.len();
    path.push_str(segment);
    let out = f(path);
    path.truncate(len);
    out
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => f.write_str("any"),
            ValueType::Nil => f.write_str("nil"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int => f.write_str("int"),
            ValueType::Float => f.write_str("number"),
            ValueType::Str => f.write_str("string"),
            ValueType::Bytes => f.write_str("bytes"),
            ValueType::Array(item) => write!(f, "array<{item}>"),
            ValueType::Tuple(items) => {
                f.write_str("tuple(")?;
                write_joined(f, items, ", ")?;
                f.write_str(")")
            }
            ValueType::Map(item) => write!(f, "map<{item}>"),
            ValueType::Struct(fields) => {
                f.write_str("struct{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                f.write_str("}")
            }
            ValueType::Optional(inner) => write!(f, "optional<{inner}>"),
            ValueType::OneOf(alternatives) => write_joined(f, alternatives, " | "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[ValueType], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
