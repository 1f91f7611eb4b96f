//! 🎯 Records: the only thing the connector needs from your data model: "give me field X".
//!
//! The connector does not care whether your record came from a DataFrame, a tuple, a struct,
//! or a fever dream. It asks two questions: "what's at this path?" and "serialize yourself,
//! please". Anything that can answer both can ride the pipeline.
//!
//! 🧠 Knowledge graph:
//! - `Record`: the trait. Field-by-path lookup + document serialization.
//! - `JsonRecord`: the stock implementation over `serde_json::Value`, remembering the raw
//!   line so `es.input.json` can ship it byte-for-byte.
//! - Paths are dotted (`user.address.city`) and descend into nested objects.

use serde_json::Value;

use crate::error::Result;

/// 🔎 Field access by name, plus the serialized form of the whole thing.
pub trait Record: Send + Sync {
    /// 📍 Look up a (possibly dotted) field path.
    fn field(&self, path: &str) -> Option<&Value>;

    /// 📦 The document body as it should appear on the bulk document line.
    fn to_document(&self) -> Result<String>;
}

/// 📦 A JSON document, with the original text kept around for verbatim pass-through.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRecord {
    raw: Option<String>,
    value: Value,
}

impl JsonRecord {
    /// 🏗️ From a parsed value. Serialization re-renders it.
    pub fn new(value: Value) -> Self {
        Self { raw: None, value }
    }

    /// 🏗️ From a raw JSON line. Parsed once for field access; the text is kept for `es.input.json`.
    pub fn from_json_line(line: &str) -> Result<Self> {
        let value = serde_json::from_str(line)?;
        Ok(Self {
            raw: Some(line.to_string()),
            value,
        })
    }

    /// 🔁 Drop the raw text so `to_document` re-serializes from the parsed value.
    pub fn without_raw(mut self) -> Self {
        self.raw = None;
        self
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl Record for JsonRecord {
    fn field(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.value, path)
    }

    fn to_document(&self) -> Result<String> {
        match &self.raw {
            Some(raw) => Ok(raw.trim().to_string()),
            None => Ok(serde_json::to_string(&self.value)?),
        }
    }
}

impl Record for Value {
    fn field(&self, path: &str) -> Option<&Value> {
        lookup_path(self, path)
    }

    fn to_document(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 🧭 Walk a dotted path. An exact key match wins over descent, so `"@timestamp"` and
/// `"a.b"` literal keys still resolve.
pub(crate) fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let object = value.as_object()?;
    if let Some(found) = object.get(path) {
        return Some(found);
    }
    let (head, tail) = path.split_once('.')?;
    lookup_path(object.get(head)?, tail)
}

/// ✂️ Render a scalar field value as the plain string the action line wants.
/// Strings lose their quotes; numbers and bools keep their text; objects are refused.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_dotted_paths_descend_into_nested_objects() {
        let record = JsonRecord::new(json!({
            "user": {"address": {"city": "Lisbon"}},
            "@timestamp": "2026-10-19T08:00:00Z",
            "a.b": "literal dotted key"
        }));
        assert_eq!(record.field("user.address.city"), Some(&json!("Lisbon")));
        assert_eq!(record.field("@timestamp"), Some(&json!("2026-10-19T08:00:00Z")));
        assert_eq!(record.field("a.b"), Some(&json!("literal dotted key")));
        assert_eq!(record.field("user.phone"), None);
    }

    #[test]
    fn the_one_where_raw_json_ships_byte_for_byte() -> Result<()> {
        let line = r#"{"b":1,  "a":2}"#;
        let record = JsonRecord::from_json_line(line)?;
        assert_eq!(record.to_document()?, line);
        assert_eq!(record.clone().without_raw().to_document()?, r#"{"a":2,"b":1}"#);
        Ok(())
    }

    #[test]
    fn the_one_where_scalars_lose_their_quotes_but_objects_get_refused() {
        assert_eq!(scalar_to_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(scalar_to_string(&json!(42)), Some("42".to_string()));
        assert_eq!(scalar_to_string(&json!(true)), Some("true".to_string()));
        assert_eq!(scalar_to_string(&json!({"nope": 1})), None);
        assert_eq!(scalar_to_string(&json!(null)), None);
    }
}
