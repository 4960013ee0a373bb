//! Query results: records, cursors, paging links and request parameters

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::types::{Fields, Key};

/// One query result: key, field map and (optionally) materialized children
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record key; `None` for the zero record returned by a failed lookup
    #[serde(rename = "$Key", alias = "Key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Key>,

    /// Field values
    #[serde(rename = "$Data", alias = "Data", default, skip_serializing_if = "Fields::is_empty")]
    pub data: Fields,

    /// Direct children, filled only by tree materialization
    #[serde(
        rename = "$Children",
        alias = "Children",
        default,
        skip_serializing_if = "Cursor::is_empty"
    )]
    pub children: Cursor,
}

impl Record {
    /// Record with a key and data and no children
    pub fn new(key: Key, data: Fields) -> Self {
        Self {
            key: Some(key),
            data,
            children: Cursor::default(),
        }
    }

    /// True for the "not found" record
    pub fn is_zero(&self) -> bool {
        self.key.is_none() && self.data.is_empty()
    }
}

/// Ordered sequence of records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Cursor(Vec<Record>);

impl Cursor {
    /// Number of records
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the cursor is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Distinct field names used by the records, sorted
    pub fn fields(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|record| record.data.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Iterate over the records
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.0.iter()
    }

    /// Mutable access for filling in children
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Record> {
        self.0.iter_mut()
    }

    /// Record at `index`
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.0.get(index)
    }
}

impl From<Vec<Record>> for Cursor {
    fn from(records: Vec<Record>) -> Self {
        Self(records)
    }
}

impl FromIterator<Record> for Cursor {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Cursor {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Cursor {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// older exports write an empty cursor as `null`
impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(Option::<Vec<Record>>::deserialize(deserializer)?.unwrap_or_default()))
    }
}

/// One pagination link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Paging {
    /// 1-based page number
    pub number: usize,
    /// Query string selecting the page, `offset=<n>&limit=<n>`
    pub query: String,
}

/// Query-string parameters of the request being rendered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams(HashMap<String, String>);

impl RequestParams {
    /// Parse a raw query string. The first occurrence of a name wins.
    pub fn parse(raw: &str) -> Self {
        Self::from_pairs(serde_urlencoded::from_str(raw))
    }

    /// Parse an `application/x-www-form-urlencoded` body
    pub fn from_bytes(raw: &[u8]) -> Self {
        Self::from_pairs(serde_urlencoded::from_bytes(raw))
    }

    fn from_pairs(pairs: Result<Vec<(String, String)>, serde_urlencoded::de::Error>) -> Self {
        let pairs = pairs.unwrap_or_else(|e| {
            debug!("Ignoring malformed parameters: {}", e);
            Vec::new()
        });
        let mut params = HashMap::new();
        for (name, value) in pairs {
            params.entry(name).or_insert(value);
        }
        Self(params)
    }

    /// Parameter value, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Parameter value or "" when absent
    pub fn value(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }
}

impl From<HashMap<String, String>> for RequestParams {
    fn from(params: HashMap<String, String>) -> Self {
        Self(params)
    }
}
