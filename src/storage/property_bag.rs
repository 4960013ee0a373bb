//! Mapping between typed records and schemaless field maps

use crate::core::error::{Result, StorageError};
use crate::types::{Fields, Key, TypedValue};

/// A typed record that can be stored as a field map
pub trait PropertyBag: Sized {
    /// Kind the record is stored under
    const KIND: &'static str;

    /// Convert into stored fields
    fn to_fields(&self) -> Fields;

    /// Rebuild from stored fields. Missing fields take their zero value.
    fn from_fields(fields: &Fields) -> Result<Self>;
}

/// Read a string field; absent means ""
pub fn string_field(fields: &Fields, name: &str) -> Result<String> {
    match fields.get(name) {
        None => Ok(String::new()),
        Some(TypedValue::String(s)) => Ok(s.clone()),
        Some(other) => Err(mismatch(name, "string", other)),
    }
}

/// Read a byte field; absent means empty
pub fn bytes_field(fields: &Fields, name: &str) -> Result<Vec<u8>> {
    match fields.get(name) {
        None => Ok(Vec::new()),
        Some(TypedValue::Blob(bytes)) => Ok(bytes.clone()),
        // imported archives may carry text content as a plain string
        Some(TypedValue::String(s)) => Ok(s.clone().into_bytes()),
        Some(other) => Err(mismatch(name, "blob", other)),
    }
}

/// Read an optional key field
pub fn key_field(fields: &Fields, name: &str) -> Result<Option<Key>> {
    match fields.get(name) {
        None => Ok(None),
        Some(TypedValue::Key(key)) => Ok(Some(key.clone())),
        Some(other) => Err(mismatch(name, "key", other)),
    }
}

fn mismatch(name: &str, expected: &str, got: &TypedValue) -> crate::core::Error {
    StorageError::Corruption(format!(
        "field {name:?} holds {got:?}, expected {expected}",
        got = got.to_string()
    ))
    .into()
}
