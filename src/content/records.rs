//! Typed records stored under the reserved `$` kinds

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::storage::property_bag::{bytes_field, key_field, string_field};
use crate::storage::{EntityStore, PropertyBag, Query};
use crate::types::{Fields, Key, TypedValue, CONFIG_KIND, FILES_KIND, GROUPS_KIND, PAGES_KIND};

/// Uploaded file: templates, stylesheets, images
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct File {
    /// File name; also the URL path it is served under
    pub name: String,
    /// Raw content
    pub data: Vec<u8>,
}

/// Page definition: route name plus the two templates composing it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Page {
    /// URL path segment and route name
    pub name: String,
    /// File name of the base (layout) template
    #[serde(default)]
    pub base: String,
    /// File name of the content template
    #[serde(default)]
    pub template: String,
}

/// Group: records of kind `name` are edited as one tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    /// Group name, which is also the record kind
    pub name: String,
}

/// Site-wide settings singleton
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteConfig {
    /// Page served at the site root
    pub default: Option<Key>,
}

impl File {
    /// Key of the file named `name`
    pub fn key(name: &str) -> Key {
        Key::named(FILES_KIND, name)
    }
}

impl Page {
    /// Key of the page named `name`
    pub fn key(name: &str) -> Key {
        Key::named(PAGES_KIND, name)
    }
}

impl Group {
    /// Key of the group named `name`
    pub fn key(name: &str) -> Key {
        Key::named(GROUPS_KIND, name)
    }
}

impl SiteConfig {
    /// Key of the singleton
    pub fn key() -> Key {
        Key::named(CONFIG_KIND, "config")
    }
}

impl PropertyBag for File {
    const KIND: &'static str = FILES_KIND;

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("Name".to_string(), TypedValue::String(self.name.clone()));
        fields.insert("Data".to_string(), TypedValue::Blob(self.data.clone()));
        fields
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            name: string_field(fields, "Name")?,
            data: bytes_field(fields, "Data")?,
        })
    }
}

impl PropertyBag for Page {
    const KIND: &'static str = PAGES_KIND;

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("Name".to_string(), TypedValue::String(self.name.clone()));
        fields.insert("Base".to_string(), TypedValue::String(self.base.clone()));
        fields.insert("Template".to_string(), TypedValue::String(self.template.clone()));
        fields
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            name: string_field(fields, "Name")?,
            base: string_field(fields, "Base")?,
            template: string_field(fields, "Template")?,
        })
    }
}

impl PropertyBag for Group {
    const KIND: &'static str = GROUPS_KIND;

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("Name".to_string(), TypedValue::String(self.name.clone()));
        fields
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            name: string_field(fields, "Name")?,
        })
    }
}

impl PropertyBag for SiteConfig {
    const KIND: &'static str = CONFIG_KIND;

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        if let Some(default) = &self.default {
            fields.insert("Default".to_string(), TypedValue::Key(default.clone()));
        }
        fields
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            default: key_field(fields, "Default")?,
        })
    }
}

/// Load one typed record
pub fn load<T: PropertyBag>(store: &dyn EntityStore, key: &Key) -> Result<T> {
    T::from_fields(&store.get(key)?)
}

/// Load every record of the type's kind, in key order
pub fn load_all<T: PropertyBag>(store: &dyn EntityStore) -> Result<Vec<T>> {
    store
        .query(&Query::new(T::KIND))?
        .iter()
        .map(|(_, fields)| T::from_fields(fields))
        .collect()
}

/// Store one typed record
pub fn save<T: PropertyBag>(store: &dyn EntityStore, key: Key, value: &T) -> Result<Key> {
    store.put(key, value.to_fields())
}
