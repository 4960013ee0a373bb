//! Global functions available to page templates

use minijinja::value::{Value, ValueKind as JinjaKind};
use minijinja::{Environment, Error};

use crate::core::error::ValidationError;
use crate::template::context::template_error;
use crate::template::objects::{KeyObject, TimestampObject};
use crate::types::ValueKind;

/// Register `Type` and `EqualString`
pub fn register(env: &mut Environment<'_>) {
    env.add_function("Type", type_of);
    env.add_function("EqualString", equal_string);
}

/// Kind of a template value, as named by the record editor
fn kind_of(value: &Value) -> Result<ValueKind, ValidationError> {
    match value.kind() {
        JinjaKind::String => Ok(ValueKind::String),
        JinjaKind::Bool => Ok(ValueKind::Bool),
        JinjaKind::Number if value.is_integer() => Ok(ValueKind::Integer),
        JinjaKind::Number => Ok(ValueKind::Float),
        _ if value.downcast_object_ref::<TimestampObject>().is_some() => Ok(ValueKind::Time),
        _ if value.downcast_object_ref::<KeyObject>().is_some() => Ok(ValueKind::Key),
        other => Err(ValidationError::UnsupportedType(format!("{other:?}").to_lowercase())),
    }
}

/// `Type(value, "integer")`: whether `value` is of the named kind
pub fn type_of(value: Value, kind: String) -> Result<bool, Error> {
    let expected: ValueKind = kind.parse().map_err(template_error)?;
    let actual = kind_of(&value).map_err(|e| template_error(e.into()))?;
    Ok(actual == expected)
}

/// `EqualString(a, b)`: string equality; both sides must be strings
pub fn equal_string(a: Value, b: Value) -> Result<bool, Error> {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => Ok(a == b),
        _ => {
            let offender = if a.as_str().is_none() { &a } else { &b };
            Err(template_error(
                ValidationError::InvalidArgumentType {
                    operation: "EqualString",
                    parameter: if a.as_str().is_none() { "a" } else { "b" },
                    expected: "string",
                    got: format!("{:?}", offender.kind()).to_lowercase(),
                }
                .into(),
            ))
        }
    }
}
