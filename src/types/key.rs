//! Hierarchical record keys
//!
//! A [`Key`] names one record: a kind, an identifier inside that kind and an
//! optional parent key. Parents form the ancestor scopes used for query
//! filtering and tree materialization. Keys travel through URLs and archives
//! as an opaque token produced by [`Key::encode`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::fmt;

use crate::core::error::{Result, ValidationError};

/// Identifier part of a key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyId {
    /// Identifier still to be assigned by the store
    Incomplete,
    /// Store-assigned or caller-chosen numeric identifier (never 0)
    Id(i64),
    /// Natural string identifier (never empty)
    Name(String),
}

/// Record key: kind, identifier and optional parent
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    kind: String,
    id: KeyId,
    parent: Option<Box<Key>>,
}

impl Key {
    /// Build a key from its components.
    ///
    /// A non-empty `string_id` wins, then a non-zero `int_id`; with neither the
    /// key is incomplete.
    pub fn new(kind: impl Into<String>, string_id: &str, int_id: i64, parent: Option<Key>) -> Self {
        let id = if !string_id.is_empty() {
            KeyId::Name(string_id.to_string())
        } else if int_id != 0 {
            KeyId::Id(int_id)
        } else {
            KeyId::Incomplete
        };
        Self {
            kind: kind.into(),
            id,
            parent: parent.map(Box::new),
        }
    }

    /// Top-level key with a string identifier
    pub fn named(kind: impl Into<String>, name: &str) -> Self {
        Self::new(kind, name, 0, None)
    }

    /// Incomplete key under an optional parent
    pub fn incomplete(kind: impl Into<String>, parent: Option<Key>) -> Self {
        Self::new(kind, "", 0, parent)
    }

    /// Kind (category) of the record
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Identifier of the record
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    /// String identifier, or "" when the key has none
    pub fn string_id(&self) -> &str {
        match &self.id {
            KeyId::Name(name) => name,
            _ => "",
        }
    }

    /// Numeric identifier, or 0 when the key has none
    pub fn int_id(&self) -> i64 {
        match self.id {
            KeyId::Id(id) => id,
            _ => 0,
        }
    }

    /// Parent key, if any
    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// Whether the identifier is assigned
    pub fn is_complete(&self) -> bool {
        !matches!(self.id, KeyId::Incomplete)
    }

    /// Copy of an incomplete key with the store-assigned numeric id
    pub fn with_id(&self, id: i64) -> Self {
        Self {
            kind: self.kind.clone(),
            id: KeyId::Id(id),
            parent: self.parent.clone(),
        }
    }

    /// True when `ancestor` appears anywhere in this key's parent chain
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = self.parent();
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }

    /// Number of ancestors above this key
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(key) = current {
            depth += 1;
            current = key.parent();
        }
        depth
    }

    /// Path segments from the root ancestor down to this key
    pub fn path(&self) -> Vec<&Key> {
        let mut path = Vec::with_capacity(self.depth() + 1);
        let mut current = Some(self);
        while let Some(key) = current {
            path.push(key);
            current = key.parent();
        }
        path.reverse();
        path
    }

    /// Opaque, URL-safe token that [`Key::decode`] turns back into this key
    pub fn encode(&self) -> String {
        let segments: Vec<Json> = self
            .path()
            .into_iter()
            .map(|key| {
                let id = match &key.id {
                    KeyId::Incomplete => Json::Null,
                    KeyId::Id(id) => Json::from(*id),
                    KeyId::Name(name) => Json::from(name.as_str()),
                };
                Json::Array(vec![Json::from(key.kind.as_str()), id])
            })
            .collect();
        // Serializing a Vec<Json> cannot fail.
        let raw = serde_json::to_vec(&segments).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Parse a token produced by [`Key::encode`]
    pub fn decode(token: &str) -> Result<Self> {
        let invalid = |reason: &str| ValidationError::InvalidKey(format!("{token:?}: {reason}"));

        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| invalid(&e.to_string()))?;
        let segments: Vec<(String, Json)> =
            serde_json::from_slice(&raw).map_err(|e| invalid(&e.to_string()))?;
        if segments.is_empty() {
            return Err(invalid("empty key path").into());
        }

        let last = segments.len() - 1;
        let mut key: Option<Key> = None;
        for (index, (kind, id)) in segments.into_iter().enumerate() {
            if kind.is_empty() {
                return Err(invalid("empty kind").into());
            }
            let id = match id {
                Json::Null if index == last => KeyId::Incomplete,
                Json::Null => return Err(invalid("incomplete ancestor").into()),
                Json::String(name) if !name.is_empty() => KeyId::Name(name),
                Json::Number(n) => match n.as_i64() {
                    Some(id) if id != 0 => KeyId::Id(id),
                    _ => return Err(invalid("numeric id must be a non-zero integer").into()),
                },
                _ => return Err(invalid("bad identifier").into()),
            };
            key = Some(Key {
                kind,
                id,
                parent: key.map(Box::new),
            });
        }
        key.ok_or_else(|| invalid("empty key path").into())
    }
}

impl KeyId {
    fn rank(&self) -> u8 {
        match self {
            KeyId::Incomplete => 0,
            KeyId::Id(_) => 1,
            KeyId::Name(_) => 2,
        }
    }
}

impl Ord for KeyId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyId::Id(a), KeyId::Id(b)) => a.cmp(b),
            (KeyId::Name(a), KeyId::Name(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keys order by their root-first path: kind, then id, segment by segment
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.path();
        let right = other.path();
        for (a, b) in left.iter().zip(right.iter()) {
            let ordering = a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        left.len().cmp(&right.len())
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for key in self.path() {
            match &key.id {
                KeyId::Incomplete => write!(f, "/{},?", key.kind)?,
                KeyId::Id(id) => write!(f, "/{},{}", key.kind, id)?,
                KeyId::Name(name) => write!(f, "/{},{:?}", key.kind, name)?,
            }
        }
        Ok(())
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Key::decode(&token).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn nested() -> Key {
        let root = Key::named("Blog", "news");
        let mid = Key::new("Blog", "", 7, Some(root));
        Key::new("Blog", "", 42, Some(mid))
    }

    #[test]
    fn test_new_key_id_precedence() {
        assert_eq!(Key::new("K", "a", 5, None).id(), &KeyId::Name("a".into()));
        assert_eq!(Key::new("K", "", 5, None).id(), &KeyId::Id(5));
        assert_eq!(Key::new("K", "", 0, None).id(), &KeyId::Incomplete);
        assert!(!Key::incomplete("K", None).is_complete());
    }

    #[test]
    fn test_round_trip_variants() {
        let keys = [
            Key::named("$Pages", "home"),
            Key::new("Item", "", 12, None),
            nested(),
            Key::incomplete("Item", Some(Key::named("Item", "root"))),
        ];
        for key in keys {
            assert_eq!(Key::decode(&key.encode()).unwrap(), key);
        }
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = Key::named("Weird Kind/?", "a&b=c").encode();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for token in ["", "!!!", "bm90IGpzb24", "W10"] {
            let err = Key::decode(token).unwrap_err();
            assert!(matches!(
                err,
                crate::core::Error::Validation(ValidationError::InvalidKey(_))
            ));
        }
    }

    #[test]
    fn test_decode_rejects_incomplete_ancestor() {
        let raw = br#"[["A",null],["B",1]]"#;
        assert!(Key::decode(&URL_SAFE_NO_PAD.encode(raw)).is_err());
    }

    #[test]
    fn test_ancestry() {
        let key = nested();
        let root = Key::named("Blog", "news");
        assert!(key.has_ancestor(&root));
        assert!(!root.has_ancestor(&key));
        assert_eq!(key.depth(), 2);
        assert_eq!(key.parent().unwrap().int_id(), 7);
        assert_eq!(key.path().first().unwrap().string_id(), "news");
    }

    #[test]
    fn test_ordering_numeric_before_named() {
        let mut keys = vec![
            Key::named("K", "b"),
            Key::new("K", "", 3, None),
            Key::named("K", "a"),
            Key::new("K", "", 1, None),
        ];
        keys.sort();
        let labels: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(labels, vec!["/K,1", "/K,3", "/K,\"a\"", "/K,\"b\""]);
    }

    #[test]
    fn test_serde_as_token() {
        let key = nested();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.encode()));
        let back: Key = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    fn arb_segment() -> impl Strategy<Value = (String, String, i64)> {
        (
            "[A-Za-z$][A-Za-z0-9_]{0,8}",
            prop_oneof!["", ".{1,12}"],
            prop_oneof![Just(0i64), any::<i64>()],
        )
    }

    proptest! {
        #[test]
        fn test_decode_inverts_encode(segments in prop::collection::vec(arb_segment(), 1..4)) {
            let mut key: Option<Key> = None;
            let count = segments.len();
            for (index, (kind, sid, iid)) in segments.into_iter().enumerate() {
                // ancestors must be complete
                let iid = if index + 1 < count && sid.is_empty() && iid == 0 { 1 } else { iid };
                key = Some(Key::new(kind, &sid, iid, key));
            }
            let key = key.unwrap();
            prop_assert_eq!(Key::decode(&key.encode()).unwrap(), key);
        }
    }
}
