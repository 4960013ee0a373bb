//! Data types shared by the store, the query engine and the templates

pub mod key;
pub mod value;

use std::collections::BTreeMap;

pub use key::{Key, KeyId};
pub use value::{classify, coerce, TypedValue, ValueKind};

/// Schemaless record body: field name to typed value
pub type Fields = BTreeMap<String, TypedValue>;

/// Reserved kind holding uploaded files
pub const FILES_KIND: &str = "$Files";
/// Reserved kind holding page definitions
pub const PAGES_KIND: &str = "$Pages";
/// Reserved kind holding group names
pub const GROUPS_KIND: &str = "$Groups";
/// Reserved kind holding the site configuration
pub const CONFIG_KIND: &str = "$Config";
