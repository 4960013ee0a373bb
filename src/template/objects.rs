//! Template-side views of query results.
//!
//! Every object keeps a clone of the [`TemplateContext`] it came from, so
//! results can be chained straight into further queries:
//! `{% for c in post.Get("Comment", "", post.Key, 0, 0) %}`.

use chrono::{DateTime, Utc};
use minijinja::value::{Enumerator, Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind, State};
use std::fmt;
use std::sync::Arc;

use crate::query::{Cursor, Record};
use crate::template::context::{arity, key_arg, template_error, TemplateContext};
use crate::types::{Fields, Key, TypedValue};

fn unknown_method(target: &str, method: &str) -> Error {
    Error::new(
        ErrorKind::UnknownMethod,
        format!("{target} has no method named {method}"),
    )
}

impl Object for TemplateContext {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        self.invoke(method, args)
            .unwrap_or_else(|| Err(unknown_method("site", method)))
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("site")
    }
}

/// Iterable list of records
#[derive(Debug)]
pub struct CursorObject {
    records: Cursor,
    ctx: TemplateContext,
}

impl CursorObject {
    pub(crate) fn new(records: Cursor, ctx: TemplateContext) -> Self {
        Self { records, ctx }
    }
}

impl Object for CursorObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Seq
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let index = key.as_usize()?;
        let record = self.records.get(index)?.clone();
        Some(self.ctx.record_value(record))
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Seq(self.records.len())
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "Len" => {
                arity("Len", args, 0).map_err(template_error)?;
                Ok(Value::from(self.records.len()))
            }
            "Fields" => {
                arity("Fields", args, 0).map_err(template_error)?;
                Ok(Value::from(self.records.fields()))
            }
            _ => Err(unknown_method("cursor", method)),
        }
    }
}

/// One record: `Key`, `Data` and `Children`, plus every `site` method
#[derive(Debug)]
pub struct RecordObject {
    record: Record,
    ctx: TemplateContext,
}

impl RecordObject {
    pub(crate) fn new(record: Record, ctx: TemplateContext) -> Self {
        Self { record, ctx }
    }
}

impl Object for RecordObject {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "Key" => Some(match &self.record.key {
                Some(key) => Value::from_object(KeyObject::new(key.clone())),
                None => Value::from(()),
            }),
            "Data" => Some(Value::from_object(DataObject(self.record.data.clone()))),
            "Children" => Some(self.ctx.cursor_value(self.record.children.clone())),
            _ => None,
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["Key", "Data", "Children"])
    }

    fn is_true(self: &Arc<Self>) -> bool {
        !self.record.is_zero()
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        self.ctx
            .invoke(method, args)
            .unwrap_or_else(|| Err(unknown_method("record", method)))
    }
}

/// Field map of a record
#[derive(Debug)]
pub struct DataObject(Fields);

impl Object for DataObject {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        self.0.get(key.as_str()?).map(typed_to_value)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.0.keys().map(|name| Value::from(name.as_str())).collect())
    }

    fn is_true(self: &Arc<Self>) -> bool {
        !self.0.is_empty()
    }
}

/// Template value for a stored field
pub fn typed_to_value(value: &TypedValue) -> Value {
    match value {
        TypedValue::String(s) => Value::from(s.as_str()),
        TypedValue::Bool(b) => Value::from(*b),
        TypedValue::Integer(i) => Value::from(*i),
        TypedValue::Float(x) => Value::from(*x),
        TypedValue::Timestamp(t) => Value::from_object(TimestampObject(*t)),
        TypedValue::Key(key) => Value::from_object(KeyObject::new(key.clone())),
        TypedValue::Blob(bytes) => Value::from_bytes(bytes.clone()),
    }
}

/// Record key; renders as its token
#[derive(Debug)]
pub struct KeyObject(Key);

impl KeyObject {
    /// Wrap a key for templates
    pub fn new(key: Key) -> Self {
        Self(key)
    }

    /// Wrapped key
    pub fn key(&self) -> &Key {
        &self.0
    }
}

impl Object for KeyObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let no_args = || arity(method, args, 0).map_err(template_error);
        match method {
            "Encode" => no_args().map(|_| Value::from(self.0.encode())),
            "Kind" => no_args().map(|_| Value::from(self.0.kind())),
            "StringID" => no_args().map(|_| Value::from(self.0.string_id())),
            "IntID" => no_args().map(|_| Value::from(self.0.int_id())),
            "Parent" => no_args().map(|_| match self.0.parent() {
                Some(parent) => Value::from_object(KeyObject::new(parent.clone())),
                None => Value::from(()),
            }),
            "Equal" => {
                arity("Equal", args, 1).map_err(template_error)?;
                let other = key_arg("Equal", "other", &args[0]).map_err(template_error)?;
                Ok(Value::from(other.as_ref() == Some(&self.0)))
            }
            _ => Err(unknown_method("key", method)),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.encode())
    }
}

/// Point in time; renders as RFC 3339
#[derive(Debug)]
pub struct TimestampObject(pub DateTime<Utc>);

impl Object for TimestampObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "Unix" => {
                arity("Unix", args, 0).map_err(template_error)?;
                Ok(Value::from(self.0.timestamp()))
            }
            _ => Err(unknown_method("time", method)),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryEngine, QueryLimits, RequestParams};
    use crate::storage::{EntityStore, MemStore};
    use chrono::TimeZone;
    use minijinja::{context, Environment};

    fn render(store: Arc<MemStore>, source: &str) -> String {
        let engine = QueryEngine::new(store, QueryLimits::default());
        let ctx = TemplateContext::new(engine, RequestParams::default());
        let env = Environment::new();
        env.render_str(source, context! { site => Value::from_object(ctx) })
            .unwrap()
    }

    fn seed() -> (Arc<MemStore>, Key) {
        let store = Arc::new(MemStore::new());
        let mut fields = Fields::new();
        fields.insert("Title".into(), TypedValue::from("Hello"));
        fields.insert("Views".into(), TypedValue::Integer(3));
        fields.insert(
            "Posted".into(),
            TypedValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        );
        let post = store.put(Key::incomplete("Post", None), fields).unwrap();

        let mut reply = Fields::new();
        reply.insert("Title".into(), TypedValue::from("Re"));
        store
            .put(Key::incomplete("Post", Some(post.clone())), reply)
            .unwrap();
        (store, post)
    }

    #[test]
    fn test_cursor_iteration_and_fields() {
        let (store, _) = seed();
        let out = render(
            store,
            r#"{% set posts = site.Get("Post", "", none, 0, 0) %}{{ posts.Len() }}|{{ posts.Fields()|join(",") }}|{% for p in posts %}{{ p.Data.Title }}={{ p.Data.Views }}{% endfor %}"#,
        );
        assert_eq!(out, "1|Posted,Title,Views|Hello=3");
    }

    #[test]
    fn test_record_chaining_and_key_methods() {
        let (store, post) = seed();
        let source = r#"{% for p in site.Get("Post", "", none, 0, 0) %}{% for r in p.Get("Post", "", p.Key, 0, 0) %}{{ r.Data.Title }} {{ r.Key.Parent().Equal(p.Key) }} {{ r.Key.Kind() }}{% endfor %}|{{ p.Key }}{% endfor %}"#;
        let out = render(store, source);
        assert_eq!(out, format!("Re true Post|{}", post.encode()));
    }

    #[test]
    fn test_timestamp_renders_rfc3339() {
        let (store, _) = seed();
        let out = render(
            store,
            r#"{% for p in site.Get("Post", "", none, 0, 0) %}{{ p.Data.Posted }}{% endfor %}"#,
        );
        assert_eq!(out, "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_missing_record_is_falsy() {
        let (store, _) = seed();
        let token = Key::named("Post", "nope").encode();
        let source = format!(r#"{{% if site.GetByKey("{token}") %}}found{{% else %}}missing{{% endif %}}"#);
        assert_eq!(render(store, &source), "missing");
    }

    #[test]
    fn test_tree_children() {
        let (store, _) = seed();
        let out = render(
            store,
            r#"{% for p in site.GetTree("Post") %}{{ p.Data.Title }}[{% for c in p.Children %}{{ c.Data.Title }}{% endfor %}]{% endfor %}"#,
        );
        assert_eq!(out, "Hello[Re]");
    }
}
