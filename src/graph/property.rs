//! Scalar property values for nodes and relationships

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Keys that are node attributes rather than properties.
pub const RESERVED_KEYS: [&str; 2] = ["id", "name"];

/// Property value. Only scalars are stored; structured values are rejected
/// at the boundary by [`PropertyValue::from_json`].
///
/// Serialized untagged so snapshot documents and CSV `properties` columns read
/// as plain JSON (`"text"`, `42`, `0.5`, `true`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    /// Convert a JSON value, rejecting null, arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        match value {
            serde_json::Value::Bool(b) => Ok(PropertyValue::Boolean(*b)),
            serde_json::Value::String(s) => Ok(PropertyValue::String(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(PropertyValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(PropertyValue::Float(f))
                } else {
                    Err(format!("number {} is out of range", n))
                }
            }
            other => Err(format!(
                "property values must be scalar, got {}",
                json_kind(other)
            )),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Boolean(b) => serde_json::Value::Bool(*b),
            PropertyValue::Integer(i) => serde_json::Value::from(*i),
            PropertyValue::Float(f) => serde_json::Value::from(*f),
            PropertyValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "String",
            PropertyValue::Integer(_) => "Integer",
            PropertyValue::Float(_) => "Float",
            PropertyValue::Boolean(_) => "Boolean",
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "\"{}\"", s),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Float(fl) => write!(f, "{}", fl),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Integer(i)
    }
}

impl From<i32> for PropertyValue {
    fn from(i: i32) -> Self {
        PropertyValue::Integer(i as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        PropertyValue::Float(f)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

/// Property map for nodes and relationships. Ordered so that listings and
/// snapshot documents are deterministic.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Check that `key` can be used as a property key.
///
/// Keys must be identifier-like (letters, digits or `_`, not starting with a
/// digit) and must not shadow the `id`/`name` attributes.
pub fn validate_key(key: &str) -> Result<(), String> {
    let mut chars = key.chars();
    let first = chars.next().ok_or_else(|| "property key is empty".to_string())?;
    if first.is_ascii_digit() || !(first.is_alphanumeric() || first == '_') {
        return Err(format!("invalid property key '{}'", key));
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_') {
        return Err(format!("invalid property key '{}'", key));
    }
    if RESERVED_KEYS.contains(&key) {
        return Err(format!("'{}' is a reserved attribute, not a property", key));
    }
    Ok(())
}

/// Check that `value` can be stored. Non-finite floats have no JSON form and
/// would not survive a snapshot.
pub fn validate_value(key: &str, value: &PropertyValue) -> Result<(), String> {
    match value {
        PropertyValue::Float(f) if !f.is_finite() => {
            Err(format!("{}: float value {} is not finite", key, f))
        }
        _ => Ok(()),
    }
}

/// Validate a key and its value together.
pub fn validate_entry(key: &str, value: &PropertyValue) -> Result<(), String> {
    validate_key(key)?;
    validate_value(key, value)
}

/// Parse a JSON object into a property map, validating every key and value.
pub fn properties_from_json(value: &serde_json::Value) -> Result<PropertyMap, String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("properties must be a JSON object, got {}", json_kind(value)))?;
    let mut props = PropertyMap::new();
    for (key, raw) in object {
        validate_key(key)?;
        let value = PropertyValue::from_json(raw).map_err(|e| format!("{}: {}", key, e))?;
        props.insert(key.clone(), value);
    }
    Ok(props)
}
