//! Per-request query surface exposed to page templates as `site`

use minijinja::value::{Value, ValueKind as JinjaKind};
use minijinja::ErrorKind;
use std::fmt;
use std::sync::Arc;

use crate::core::error::{Error, Result, ValidationError};
use crate::query::{Cursor, Paging, QueryEngine, Record, RequestParams};
use crate::template::objects::{CursorObject, KeyObject, RecordObject};
use crate::types::Key;

/// Query engine bound to the parameters of the request being rendered
#[derive(Clone)]
pub struct TemplateContext {
    engine: QueryEngine,
    params: Arc<RequestParams>,
}

impl fmt::Debug for TemplateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateContext")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl TemplateContext {
    /// Bind `engine` to one request's query parameters
    pub fn new(engine: QueryEngine, params: RequestParams) -> Self {
        Self {
            engine,
            params: Arc::new(params),
        }
    }

    /// Engine answering the queries
    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Records of `kind` directly under `parent`
    pub fn get(
        &self,
        kind: &str,
        order: &str,
        parent: Option<&Key>,
        offset: usize,
        limit: usize,
    ) -> Result<Cursor> {
        self.engine.get(kind, order, parent, offset, limit)
    }

    /// Record under `key`, or the zero record
    pub fn get_by_key(&self, key: &Key) -> Result<Record> {
        self.engine.get_by_key(key)
    }

    /// Pagination links for `kind`
    pub fn get_pages(&self, kind: &str, limit: usize) -> Result<Vec<Paging>> {
        self.engine.get_pages(kind, limit)
    }

    /// Previous-page query string for the current `offset`/`limit` parameters
    pub fn get_prev(&self) -> Result<String> {
        let (offset, limit) = (self.param("offset")?, self.param("limit")?);
        self.engine.prev_page(offset, limit)
    }

    /// Next-page query string for the current `offset`/`limit` parameters
    pub fn get_next(&self, kind: &str) -> Result<String> {
        let (offset, limit) = (self.param("offset")?, self.param("limit")?);
        self.engine.next_page(kind, offset, limit)
    }

    /// One query-string parameter, "" when absent
    pub fn get_value(&self, name: &str) -> String {
        self.params.value(name)
    }

    /// Every record of `kind` as a nested forest
    pub fn get_tree(&self, kind: &str) -> Result<Cursor> {
        self.engine.get_tree(kind)
    }

    fn param(&self, name: &str) -> Result<usize> {
        let raw = self
            .params
            .get(name)
            .ok_or_else(|| Error::invalid_argument(format!("'{name}' not found")))?;
        raw.parse().map_err(|e: std::num::ParseIntError| {
            ValidationError::Parse {
                kind: "integer",
                input: raw.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Dispatch a template method call. `None` for names that are not
    /// context methods.
    pub(crate) fn invoke(
        &self,
        method: &str,
        args: &[Value],
    ) -> Option<std::result::Result<Value, minijinja::Error>> {
        let result = match method {
            "Get" => self.call_get(args),
            "GetByKey" => self.call_get_by_key(args),
            "GetByKeyFields" => self.call_get_by_key_fields(args),
            "GetPages" => self.call_get_pages(args),
            "GetPrev" => arity("GetPrev", args, 0).and_then(|_| self.get_prev().map(Value::from)),
            "GetNext" => arity("GetNext", args, 1)
                .and_then(|_| string_arg("GetNext", "kind", &args[0]))
                .and_then(|kind| self.get_next(&kind).map(Value::from)),
            "GetValue" => arity("GetValue", args, 1)
                .and_then(|_| string_arg("GetValue", "name", &args[0]))
                .map(|name| Value::from(self.get_value(&name))),
            "GetTree" => arity("GetTree", args, 1)
                .and_then(|_| string_arg("GetTree", "kind", &args[0]))
                .and_then(|kind| self.get_tree(&kind))
                .map(|cursor| self.cursor_value(cursor)),
            _ => return None,
        };
        Some(result.map_err(template_error))
    }

    fn call_get(&self, args: &[Value]) -> Result<Value> {
        const OP: &str = "Get";
        arity(OP, args, 5)?;
        let kind = string_arg(OP, "kind", &args[0])?;
        let order = string_arg(OP, "order", &args[1])?;
        let parent = key_arg(OP, "parent", &args[2])?;
        let offset = usize_arg(OP, "offset", &args[3])?;
        let limit = usize_arg(OP, "limit", &args[4])?;
        let cursor = self.get(&kind, &order, parent.as_ref(), offset, limit)?;
        Ok(self.cursor_value(cursor))
    }

    fn call_get_by_key(&self, args: &[Value]) -> Result<Value> {
        const OP: &str = "GetByKey";
        arity(OP, args, 1)?;
        let key = key_arg(OP, "key", &args[0])?.ok_or_else(|| invalid_type(OP, "key", KEY_TYPES, &args[0]))?;
        Ok(self.record_value(self.get_by_key(&key)?))
    }

    fn call_get_by_key_fields(&self, args: &[Value]) -> Result<Value> {
        const OP: &str = "GetByKeyFields";
        arity(OP, args, 4)?;
        let kind = string_arg(OP, "kind", &args[0])?;
        let string_id = string_arg(OP, "sid", &args[1])?;
        let int_id = int_arg(OP, "iid", &args[2])?;
        let parent = key_arg(OP, "parent", &args[3])?;
        let record = self
            .engine
            .get_by_key_fields(&kind, &string_id, int_id, parent)?;
        Ok(self.record_value(record))
    }

    fn call_get_pages(&self, args: &[Value]) -> Result<Value> {
        const OP: &str = "GetPages";
        arity(OP, args, 2)?;
        let kind = string_arg(OP, "kind", &args[0])?;
        let limit = usize_arg(OP, "limit", &args[1])?;
        Ok(Value::from_serialize(self.get_pages(&kind, limit)?))
    }

    pub(crate) fn cursor_value(&self, cursor: Cursor) -> Value {
        Value::from_object(CursorObject::new(cursor, self.clone()))
    }

    pub(crate) fn record_value(&self, record: Record) -> Value {
        Value::from_object(RecordObject::new(record, self.clone()))
    }
}

const KEY_TYPES: &str = "string, key or none";

/// Wrap a crate error so it surfaces from template execution
pub(crate) fn template_error(err: Error) -> minijinja::Error {
    minijinja::Error::new(ErrorKind::InvalidOperation, err.to_string()).with_source(err)
}

pub(crate) fn arity(operation: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(Error::invalid_argument(format!(
            "{operation}: expected {expected} arguments, got {}",
            args.len()
        )));
    }
    Ok(())
}

fn invalid_type(operation: &'static str, parameter: &'static str, expected: &'static str, got: &Value) -> Error {
    ValidationError::InvalidArgumentType {
        operation,
        parameter,
        expected,
        got: format!("{:?}", got.kind()).to_lowercase(),
    }
    .into()
}

pub(crate) fn string_arg(operation: &'static str, parameter: &'static str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid_type(operation, parameter, "string", value))
}

fn int_arg(operation: &'static str, parameter: &'static str, value: &Value) -> Result<i64> {
    match value.kind() {
        JinjaKind::Number => i64::try_from(value.clone())
            .map_err(|_| invalid_type(operation, parameter, "int or numeric string", value)),
        JinjaKind::String => {
            let raw = value.as_str().unwrap_or_default();
            raw.parse().map_err(|e: std::num::ParseIntError| {
                ValidationError::Parse {
                    kind: "integer",
                    input: raw.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
        }
        _ => Err(invalid_type(operation, parameter, "int or numeric string", value)),
    }
}

fn usize_arg(operation: &'static str, parameter: &'static str, value: &Value) -> Result<usize> {
    let n = int_arg(operation, parameter, value)?;
    usize::try_from(n)
        .map_err(|_| Error::invalid_argument(format!("{operation}: '{parameter}' must not be negative")))
}

/// A key given as a token, a key object, or nothing
pub(crate) fn key_arg(operation: &'static str, parameter: &'static str, value: &Value) -> Result<Option<Key>> {
    if value.is_none() || value.is_undefined() {
        return Ok(None);
    }
    if let Some(token) = value.as_str() {
        if token.is_empty() {
            return Ok(None);
        }
        return Key::decode(token).map(Some);
    }
    match value.downcast_object_ref::<KeyObject>() {
        Some(key) => Ok(Some(key.key().clone())),
        None => Err(invalid_type(operation, parameter, KEY_TYPES, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryLimits;
    use crate::storage::{EntityStore, MemStore};
    use crate::types::{Fields, TypedValue};

    fn context(query: &str) -> (Arc<MemStore>, TemplateContext) {
        let store = Arc::new(MemStore::new());
        let engine = QueryEngine::new(store.clone(), QueryLimits::default());
        (store, TemplateContext::new(engine, RequestParams::parse(query)))
    }

    fn post(store: &MemStore, title: &str) -> Key {
        let mut fields = Fields::new();
        fields.insert("Title".into(), TypedValue::from(title));
        store.put(Key::incomplete("Post", None), fields).unwrap()
    }

    #[test]
    fn test_get_accepts_numeric_strings() {
        let (store, ctx) = context("");
        post(&store, "one");
        post(&store, "two");

        let args = [
            Value::from("Post"),
            Value::from("-Title"),
            Value::from(()),
            Value::from("0"),
            Value::from(1),
        ];
        let cursor = ctx.invoke("Get", &args).unwrap().unwrap();
        assert_eq!(cursor.len(), Some(1));
    }

    #[test]
    fn test_get_rejects_wrong_argument_types() {
        let (_, ctx) = context("");
        let args = [
            Value::from(5),
            Value::from(""),
            Value::from(()),
            Value::from(0),
            Value::from(0),
        ];
        let err = ctx.invoke("Get", &args).unwrap().unwrap_err();
        assert!(err.to_string().contains("unexpected type of 'kind'"));

        let err = ctx.invoke("Get", &args[..2]).unwrap().unwrap_err();
        assert!(err.to_string().contains("expected 5 arguments"));

        assert!(ctx.invoke("Frobnicate", &[]).is_none());
    }

    #[test]
    fn test_prev_and_next_read_request_params() {
        let (store, ctx) = context("offset=10&limit=10");
        for i in 0..25 {
            post(&store, &format!("p{i}"));
        }
        assert_eq!(ctx.get_prev().unwrap(), "offset=0&limit=10");
        assert_eq!(ctx.get_next("Post").unwrap(), "offset=20&limit=10");

        let (_, bare) = context("limit=10");
        let err = bare.get_prev().unwrap_err();
        assert!(err.to_string().contains("'offset' not found"));
    }

    #[test]
    fn test_next_with_huge_offset_is_empty() {
        let (store, ctx) = context("offset=18446744073709551615&limit=1");
        post(&store, "only");
        assert_eq!(ctx.get_next("Post").unwrap(), "");
    }

    #[test]
    fn test_parent_argument_forms() {
        let key = Key::named("Post", "a");
        let token = Value::from(key.encode());
        assert_eq!(key_arg("Get", "parent", &token).unwrap(), Some(key.clone()));
        assert_eq!(key_arg("Get", "parent", &Value::from("")).unwrap(), None);
        assert_eq!(key_arg("Get", "parent", &Value::UNDEFINED).unwrap(), None);

        let object = Value::from_object(KeyObject::new(key.clone()));
        assert_eq!(key_arg("Get", "parent", &object).unwrap(), Some(key));
        assert!(key_arg("Get", "parent", &Value::from(3)).is_err());
    }

    #[test]
    fn test_get_value() {
        let (_, ctx) = context("q=hello+world&q=ignored");
        assert_eq!(ctx.get_value("q"), "hello world");
        assert_eq!(ctx.get_value("missing"), "");
    }
}
