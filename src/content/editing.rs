//! Editor workflows over files, pages, groups and group records
//!
//! Handlers in `api::editor` stay thin: they read the form and call one of
//! these functions, which validate input and talk to the store.

use std::collections::HashMap;
use tracing::info;

use crate::content::records::{load, save, File, Group, Page, SiteConfig};
use crate::core::error::{Error, Result, ValidationError};
use crate::query::{QueryEngine, RequestParams};
use crate::storage::{EntityStore, Query};
use crate::types::{classify, coerce, Key, ValueKind, PAGES_KIND};

/// Select value meaning "use the free-text field name instead"
pub const NEW_FIELD_MARKER: &str = "NewName";

/// Source of submitted form values; absent names read as ""
pub trait FormValues {
    /// Value of one form field
    fn form_value(&self, name: &str) -> String;
}

impl FormValues for RequestParams {
    fn form_value(&self, name: &str) -> String {
        self.value(name)
    }
}

impl FormValues for HashMap<String, String> {
    fn form_value(&self, name: &str) -> String {
        self.get(name).cloned().unwrap_or_default()
    }
}

/// Reject content at or above `max` bytes
pub fn check_file_size(name: &str, size: usize, max: usize) -> Result<()> {
    if size >= max {
        return Err(ValidationError::FileTooLarge {
            name: name.to_string(),
            size,
            max,
        }
        .into());
    }
    Ok(())
}

/// Escape a name for use as a URL path segment (space becomes `+`)
pub fn query_escape(name: &str) -> String {
    urlencoding::encode(name).replace("%20", "+")
}

/// Store a new file (or replace the file with the same name)
pub fn new_file(store: &dyn EntityStore, name: &str, data: &[u8], max_size: usize) -> Result<Key> {
    if name.is_empty() {
        return Err(Error::empty_field("Name"));
    }
    check_file_size(name, data.len(), max_size)?;
    let file = File {
        name: name.to_string(),
        data: data.to_vec(),
    };
    let key = save(store, File::key(name), &file)?;
    info!("Stored file {:?} ({} bytes)", name, data.len());
    Ok(key)
}

/// Replace the content of an existing file. No upload leaves it unchanged.
pub fn edit_file(
    store: &dyn EntityStore,
    key: &Key,
    data: Option<&[u8]>,
    max_size: usize,
) -> Result<()> {
    let Some(data) = data else {
        return Ok(());
    };
    let mut file: File = load(store, key)?;
    check_file_size(&file.name, data.len(), max_size)?;
    file.data = data.to_vec();
    save(store, key.clone(), &file)?;
    Ok(())
}

/// Create a page; the name is escaped into a URL path segment
pub fn new_page(store: &dyn EntityStore, name: &str, base: &str, template: &str) -> Result<Key> {
    let name = query_escape(name);
    if name.is_empty() {
        return Err(Error::empty_field("Name"));
    }
    if base.is_empty() {
        return Err(Error::empty_field("Base template"));
    }
    if template.is_empty() {
        return Err(Error::empty_field("Template"));
    }
    let page = Page {
        name: name.clone(),
        base: base.to_string(),
        template: template.to_string(),
    };
    info!("New page {:?}", page);
    save(store, Page::key(&name), &page)
}

/// Point an existing page at other templates
pub fn edit_page(store: &dyn EntityStore, key: &Key, base: &str, template: &str) -> Result<()> {
    let mut page: Page = load(store, key)?;
    page.base = base.to_string();
    page.template = template.to_string();
    info!("Changed page {:?}", page);
    save(store, key.clone(), &page)?;
    Ok(())
}

/// Template file name of a page
pub fn page_template(store: &dyn EntityStore, key: &Key) -> Result<String> {
    if key.kind() != PAGES_KIND {
        return Err(Error::invalid_argument("it is not a page"));
    }
    let page: Page = load(store, key)?;
    Ok(page.template)
}

/// Make the page behind `token` the site root
pub fn set_default(store: &dyn EntityStore, token: &str) -> Result<()> {
    let key = Key::decode(token)?;
    info!("New default page: {}", key);
    save(
        store,
        SiteConfig::key(),
        &SiteConfig {
            default: Some(key),
        },
    )?;
    Ok(())
}

/// Name of the default page, provided it still exists
pub fn default_page(store: &dyn EntityStore) -> Result<String> {
    let config = match load::<SiteConfig>(store, &SiteConfig::key()) {
        Ok(config) => config,
        Err(e) if e.is_not_found() => return Err(Error::NoDefaultPage),
        Err(e) => return Err(e),
    };
    let key = config.default.ok_or(Error::NoDefaultPage)?;
    match store.get(&key) {
        Ok(_) => Ok(key.string_id().to_string()),
        Err(e) if e.is_not_found() => Err(Error::NoDefaultPage),
        Err(e) => Err(e),
    }
}

/// Create a group; the name is escaped like page names
pub fn new_group(store: &dyn EntityStore, name: &str) -> Result<Key> {
    let name = query_escape(name);
    if name.is_empty() {
        return Err(Error::empty_field("Name"));
    }
    info!("New group {:?}", name);
    save(store, Group::key(&name), &Group { name: name.clone() })
}

/// Record kind of the group behind `token`
pub fn group_kind(store: &dyn EntityStore, token: &str) -> Result<String> {
    let group: Group = load(store, &Key::decode(token)?)?;
    if group.name.is_empty() {
        return Err(Error::empty_field("Name"));
    }
    Ok(group.name)
}

/// Delete a file, page or group record itself. Groups also lose their records.
pub fn delete_entry(store: &dyn EntityStore, key: &Key) -> Result<usize> {
    let mut removed = 0;
    if key.kind() == crate::types::GROUPS_KIND {
        let group: Group = load(store, key)?;
        if !group.name.is_empty() {
            for (record, _) in store.query(&Query::new(group.name.as_str()))? {
                store.delete(&record)?;
                removed += 1;
            }
        }
    }
    store.delete(key)?;
    info!("Deleted {} and {} dependent records", key, removed);
    Ok(removed + 1)
}

/// Add a record with one field to a group, at the top level or under `parent`
pub fn new_record(
    store: &dyn EntityStore,
    kind: &str,
    parent: Option<Key>,
    form: &dyn FormValues,
) -> Result<Key> {
    let mut name = form.form_value("name");
    if name == NEW_FIELD_MARKER {
        name = form.form_value("newname");
    }
    if name.is_empty() {
        return Err(Error::empty_field("Name"));
    }
    let field_kind: ValueKind = form.form_value("type").parse()?;
    let value = coerce(&form.form_value("value"), field_kind)?;

    let mut fields = crate::types::Fields::new();
    fields.insert(name, value);
    let key = store.put(Key::incomplete(kind, parent), fields)?;
    info!("New record {}", key);
    Ok(key)
}

/// Re-coerce every field of a record from `type_<f>`/`value_<f>` and
/// optionally add or overwrite one field named by `name`/`newname`.
///
/// An existing field name takes its type from the first sibling record
/// holding that field.
pub fn edit_record(engine: &QueryEngine, key: &Key, form: &dyn FormValues) -> Result<()> {
    let mut name = form.form_value("name");
    let value = form.form_value("value");
    let mut added = None;

    if name == NEW_FIELD_MARKER {
        name = form.form_value("newname");
        if !name.is_empty() {
            let field_kind: ValueKind = form.form_value("type").parse()?;
            added = Some(coerce(&value, field_kind)?);
        }
    } else {
        let siblings = engine.get(key.kind(), "", key.parent(), 0, 0)?;
        let existing = siblings
            .iter()
            .find_map(|record| record.data.get(&name))
            .ok_or_else(|| ValidationError::InvalidFieldType(name.clone()))?;
        added = Some(coerce(&value, classify(existing)?)?);
    }

    let mut data = engine.store().get(key)?;
    for (field, slot) in data.iter_mut() {
        let field_kind: ValueKind = form.form_value(&format!("type_{field}")).parse()?;
        *slot = coerce(&form.form_value(&format!("value_{field}")), field_kind)?;
    }
    if let Some(value) = added {
        data.insert(name, value);
    }
    engine.store().put(key.clone(), data)?;
    info!("Edited record {}", key);
    Ok(())
}

/// Delete a record together with all of its descendants
pub fn delete_record(store: &dyn EntityStore, key: &Key) -> Result<usize> {
    let doomed = store.query(&Query::new(key.kind()).ancestor(Some(key.clone())))?;
    for (record, _) in &doomed {
        store.delete(record)?;
    }
    info!("Deleted record {} with {} records in its subtree", key, doomed.len());
    Ok(doomed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryLimits;
    use crate::storage::MemStore;
    use crate::types::TypedValue;
    use std::sync::Arc;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_file_size_boundary() {
        let store = MemStore::new();
        let max = 0x100000;
        assert!(new_file(&store, "ok.bin", &vec![0u8; max - 1], max).is_ok());
        let err = new_file(&store, "big.bin", &vec![0u8; max], max).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_edit_file_without_upload_is_noop() {
        let store = MemStore::new();
        let key = new_file(&store, "a.txt", b"one", 100).unwrap();
        edit_file(&store, &key, None, 100).unwrap();
        edit_file(&store, &key, Some(b"two"), 100).unwrap();
        let file: File = load(&store, &key).unwrap();
        assert_eq!(file.data, b"two");
    }

    #[test]
    fn test_new_page_validates_and_escapes() {
        let store = MemStore::new();
        assert!(new_page(&store, "", "b", "t").unwrap_err().is_client_error());
        assert!(new_page(&store, "x", "", "t").is_err());
        let key = new_page(&store, "my page", "base.html", "t.html").unwrap();
        assert_eq!(key.string_id(), "my+page");
        assert_eq!(page_template(&store, &key).unwrap(), "t.html");
        assert!(page_template(&store, &File::key("t.html")).is_err());
    }

    #[test]
    fn test_default_page_fails_closed() {
        let store = MemStore::new();
        assert!(matches!(default_page(&store), Err(Error::NoDefaultPage)));

        let key = new_page(&store, "home", "b", "t").unwrap();
        set_default(&store, &key.encode()).unwrap();
        assert_eq!(default_page(&store).unwrap(), "home");

        store.delete(&key).unwrap();
        assert!(matches!(default_page(&store), Err(Error::NoDefaultPage)));
    }

    #[test]
    fn test_new_record_coerces_value() {
        let store = MemStore::new();
        let key = new_record(
            &store,
            "Post",
            None,
            &form(&[("name", "NewName"), ("newname", "Views"), ("type", "integer"), ("value", "12")]),
        )
        .unwrap();
        assert_eq!(store.get(&key).unwrap()["Views"], TypedValue::Integer(12));

        let err = new_record(&store, "Post", None, &form(&[("name", "NewName")])).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyField(_))));

        let err = new_record(
            &store,
            "Post",
            None,
            &form(&[("name", "X"), ("type", "blob"), ("value", "1")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::InvalidFieldType(_))));
    }

    #[test]
    fn test_edit_record_uses_sibling_types() {
        let store = Arc::new(MemStore::new());
        let engine = QueryEngine::new(store.clone(), QueryLimits::default());
        let first = new_record(
            store.as_ref(),
            "Post",
            None,
            &form(&[("name", "Score"), ("type", "float"), ("value", "1.5")]),
        )
        .unwrap();
        let second = new_record(
            store.as_ref(),
            "Post",
            None,
            &form(&[("name", "Title"), ("type", "string"), ("value", "hi")]),
        )
        .unwrap();

        edit_record(
            &engine,
            &second,
            &form(&[
                ("name", "Score"),
                ("value", "2.25"),
                ("type_Title", "string"),
                ("value_Title", "hello"),
            ]),
        )
        .unwrap();
        let data = store.get(&second).unwrap();
        assert_eq!(data["Score"], TypedValue::Float(2.25));
        assert_eq!(data["Title"], TypedValue::from("hello"));

        // every existing field needs its type
        let err = edit_record(&engine, &first, &form(&[("name", "NewName")])).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::InvalidFieldType(_))));
    }

    #[test]
    fn test_delete_record_removes_subtree() {
        let store = MemStore::new();
        let values = form(&[("name", "N"), ("type", "string"), ("value", "v")]);
        let root = new_record(&store, "Post", None, &values).unwrap();
        let child = new_record(&store, "Post", Some(root.clone()), &values).unwrap();
        new_record(&store, "Post", Some(child), &values).unwrap();
        let other = new_record(&store, "Post", None, &values).unwrap();

        assert_eq!(delete_record(&store, &root).unwrap(), 3);
        assert_eq!(store.count("Post").unwrap(), 1);
        assert!(store.get(&other).is_ok());
    }

    #[test]
    fn test_delete_group_removes_records() {
        let store = MemStore::new();
        let group = new_group(&store, "News").unwrap();
        assert_eq!(group_kind(&store, &group.encode()).unwrap(), "News");
        let values = form(&[("name", "N"), ("type", "bool"), ("value", "true")]);
        new_record(&store, "News", None, &values).unwrap();
        new_record(&store, "News", None, &values).unwrap();

        assert_eq!(delete_entry(&store, &group).unwrap(), 3);
        assert_eq!(store.count("News").unwrap(), 0);
        assert_eq!(store.count("$Groups").unwrap(), 0);
    }
}
