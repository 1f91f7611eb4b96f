//! 🧾 Script params: `delta:inc, source:<batch>` plus a JSON object of constants.
//!
//! Constants from `es.update.script.params.json` form the base map; each `name:field` entry
//! is read per record and written on top. A `<literal>` value is a constant too.

use std::fmt;

use serde_json::{Map, Value};

use super::constant_literal;
use crate::error::ConfigError;
use crate::record::Record;
use crate::settings::keys;

#[derive(Debug, Clone, PartialEq)]
enum ParamSource {
    Field(String),
    Constant(Value),
}

/// 📐 The parsed params list, ready to run against records.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsTemplate {
    source: String,
    entries: Vec<(String, ParamSource)>,
    constants: Map<String, Value>,
}

impl ParamsTemplate {
    pub fn parse(source: &str, constants: Map<String, Value>) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for item in source.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (name, value) = item
                .split_once(':')
                .map(|(name, value)| (name.trim(), value.trim()))
                .filter(|(name, value)| !name.is_empty() && !value.is_empty())
                .ok_or_else(|| ConfigError::Invalid {
                    key: keys::UPDATE_SCRIPT_PARAMS.to_string(),
                    value: source.to_string(),
                    expected: "comma separated name:field or name:<constant> pairs",
                })?;
            let param = match constant_literal(value) {
                Some(constant) => ParamSource::Constant(constant),
                None => ParamSource::Field(value.to_string()),
            };
            entries.push((name.to_string(), param));
        }
        Ok(Self {
            source: source.to_string(),
            entries,
            constants,
        })
    }

    pub fn resolve(&self, record: &dyn Record) -> Result<Map<String, Value>, String> {
        let mut params = self.constants.clone();
        for (name, param) in &self.entries {
            let value = match param {
                ParamSource::Constant(value) => value.clone(),
                ParamSource::Field(path) => record
                    .field(path)
                    .cloned()
                    .ok_or_else(|| format!("param '{name}' wants field '{path}', which is missing"))?,
            };
            params.insert(name.clone(), value);
        }
        Ok(params)
    }
}

impl fmt::Display for ParamsTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(f, "{} constant(s)", self.constants.len())
        } else {
            f.write_str(&self.source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::JsonRecord;
    use serde_json::json;

    #[test]
    fn the_one_where_fields_override_constants_with_the_same_name() {
        let constants = json!({"delta": 0, "unit": "clicks"})
            .as_object()
            .cloned()
            .unwrap_or_default();
        let template = ParamsTemplate::parse("delta:inc, tag:<7>", constants).expect("💀 should parse");
        let params = template
            .resolve(&JsonRecord::new(json!({"inc": 5})))
            .expect("💀 should resolve");
        assert_eq!(Value::Object(params), json!({"delta": 5, "unit": "clicks", "tag": 7}));
    }

    #[test]
    fn the_one_where_a_missing_param_field_is_loud() {
        let template = ParamsTemplate::parse("delta:inc", Map::new()).expect("💀 should parse");
        let err = template
            .resolve(&JsonRecord::new(json!({})))
            .expect_err("💀 missing field must fail");
        assert!(err.contains("inc"));
    }

    #[test]
    fn the_one_where_half_a_pair_is_not_a_pair() {
        assert!(ParamsTemplate::parse("delta", Map::new()).is_err());
        assert!(ParamsTemplate::parse(":inc", Map::new()).is_err());
    }
}
