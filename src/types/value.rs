//! Typed field values
//!
//! Records are schemaless: every field holds a [`TypedValue`] whose variant is
//! its runtime type tag. The user-facing kinds are listed in [`ValueKind`];
//! `Blob` only carries uploaded file bytes through the store.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::core::error::{Error, Result, ValidationError};
use crate::types::key::Key;

/// Field value with an explicit type tag
#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    /// UTF-8 text
    String(String),
    /// Boolean flag
    Bool(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit float
    Float(f64),
    /// Point in time (UTC)
    Timestamp(DateTime<Utc>),
    /// Reference to another record
    Key(Key),
    /// Raw bytes (file content)
    Blob(Vec<u8>),
}

/// Supported field kinds, as named by the record editor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `string`
    String,
    /// `bool`
    Bool,
    /// `integer`
    Integer,
    /// `float`
    Float,
    /// `time`
    Time,
    /// `key`
    Key,
}

impl ValueKind {
    /// Every supported kind, in editor order
    pub const ALL: [ValueKind; 6] = [
        ValueKind::String,
        ValueKind::Bool,
        ValueKind::Integer,
        ValueKind::Float,
        ValueKind::Time,
        ValueKind::Key,
    ];

    /// Editor name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Bool => "bool",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Time => "time",
            ValueKind::Key => "key",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(ValueKind::String),
            "bool" => Ok(ValueKind::Bool),
            "integer" => Ok(ValueKind::Integer),
            "float" => Ok(ValueKind::Float),
            "time" | "timestamp" => Ok(ValueKind::Time),
            "key" => Ok(ValueKind::Key),
            other => Err(ValidationError::InvalidFieldType(other.to_string()).into()),
        }
    }
}

/// Determine the kind of a runtime value
pub fn classify(value: &TypedValue) -> Result<ValueKind> {
    match value {
        TypedValue::String(_) => Ok(ValueKind::String),
        TypedValue::Bool(_) => Ok(ValueKind::Bool),
        TypedValue::Integer(_) => Ok(ValueKind::Integer),
        TypedValue::Float(_) => Ok(ValueKind::Float),
        TypedValue::Timestamp(_) => Ok(ValueKind::Time),
        TypedValue::Key(_) => Ok(ValueKind::Key),
        TypedValue::Blob(_) => Err(ValidationError::UnsupportedType("blob".to_string()).into()),
    }
}

/// Parse raw string input into a value of `kind`.
///
/// `Time` ignores the input and yields the current time: the editor can only
/// stamp a field with "now".
pub fn coerce(input: &str, kind: ValueKind) -> Result<TypedValue> {
    let parse_error = |reason: String| ValidationError::Parse {
        kind: kind.as_str(),
        input: input.to_string(),
        reason,
    };
    match kind {
        ValueKind::String => Ok(TypedValue::String(input.to_string())),
        ValueKind::Bool => parse_bool(input)
            .map(TypedValue::Bool)
            .ok_or_else(|| parse_error("invalid syntax".to_string()).into()),
        ValueKind::Integer => input
            .parse::<i64>()
            .map(TypedValue::Integer)
            .map_err(|e| parse_error(e.to_string()).into()),
        ValueKind::Float => input
            .parse::<f64>()
            .map(TypedValue::Float)
            .map_err(|e| parse_error(e.to_string()).into()),
        ValueKind::Time => Ok(TypedValue::Timestamp(Utc::now())),
        ValueKind::Key => Key::decode(input).map(TypedValue::Key),
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

impl TypedValue {
    fn rank(&self) -> u8 {
        match self {
            TypedValue::Integer(_) => 0,
            TypedValue::Timestamp(_) => 1,
            TypedValue::Bool(_) => 2,
            TypedValue::String(_) => 3,
            TypedValue::Blob(_) => 4,
            TypedValue::Float(_) => 5,
            TypedValue::Key(_) => 6,
        }
    }

    /// Total order used by field-ordered queries: kind rank, then value
    pub fn order_cmp(&self, other: &TypedValue) -> Ordering {
        match (self, other) {
            (TypedValue::Integer(a), TypedValue::Integer(b)) => a.cmp(b),
            (TypedValue::Timestamp(a), TypedValue::Timestamp(b)) => a.cmp(b),
            (TypedValue::Bool(a), TypedValue::Bool(b)) => a.cmp(b),
            (TypedValue::String(a), TypedValue::String(b)) => a.cmp(b),
            (TypedValue::Blob(a), TypedValue::Blob(b)) => a.cmp(b),
            (TypedValue::Float(a), TypedValue::Float(b)) => a.total_cmp(b),
            (TypedValue::Key(a), TypedValue::Key(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Borrow the text of a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the key of a key value
    pub fn as_key(&self) -> Option<&Key> {
        match self {
            TypedValue::Key(key) => Some(key),
            _ => None,
        }
    }

    /// Borrow the bytes of a blob value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TypedValue::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::String(s) => f.write_str(s),
            TypedValue::Bool(b) => write!(f, "{b}"),
            TypedValue::Integer(i) => write!(f, "{i}"),
            TypedValue::Float(x) => write!(f, "{x}"),
            TypedValue::Timestamp(t) => f.write_str(&t.to_rfc3339()),
            TypedValue::Key(key) => f.write_str(&key.encode()),
            TypedValue::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        TypedValue::String(s.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        TypedValue::String(s)
    }
}

impl From<i64> for TypedValue {
    fn from(i: i64) -> Self {
        TypedValue::Integer(i)
    }
}

impl From<bool> for TypedValue {
    fn from(b: bool) -> Self {
        TypedValue::Bool(b)
    }
}

impl From<Key> for TypedValue {
    fn from(key: Key) -> Self {
        TypedValue::Key(key)
    }
}

// Wire form: {"type": "<kind>", "value": ...}. Bare JSON scalars are accepted
// on input so archives written by older exports still load.

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
enum Tagged {
    String(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
    Time(DateTime<Utc>),
    Key(Key),
    Blob(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Wire {
    Tagged(Tagged),
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Serialize for TypedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let tagged = match self {
            TypedValue::String(s) => Tagged::String(s.clone()),
            TypedValue::Bool(b) => Tagged::Bool(*b),
            TypedValue::Integer(i) => Tagged::Integer(*i),
            TypedValue::Float(x) => Tagged::Float(*x),
            TypedValue::Timestamp(t) => Tagged::Time(*t),
            TypedValue::Key(key) => Tagged::Key(key.clone()),
            TypedValue::Blob(bytes) => Tagged::Blob(STANDARD.encode(bytes)),
        };
        tagged.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TypedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = match Wire::deserialize(deserializer)? {
            Wire::Tagged(Tagged::String(s)) | Wire::String(s) => TypedValue::String(s),
            Wire::Tagged(Tagged::Bool(b)) | Wire::Bool(b) => TypedValue::Bool(b),
            Wire::Tagged(Tagged::Integer(i)) | Wire::Integer(i) => TypedValue::Integer(i),
            Wire::Tagged(Tagged::Float(x)) | Wire::Float(x) => TypedValue::Float(x),
            Wire::Tagged(Tagged::Time(t)) => TypedValue::Timestamp(t),
            Wire::Tagged(Tagged::Key(key)) => TypedValue::Key(key),
            Wire::Tagged(Tagged::Blob(encoded)) => TypedValue::Blob(
                STANDARD
                    .decode(encoded)
                    .map_err(serde::de::Error::custom)?,
            ),
        };
        Ok(value)
    }
}
