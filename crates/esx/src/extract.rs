//! 🔍 Extraction: the customs desk where every record gets its passport stamped.
//!
//! 🎬 COLD OPEN. INT. BORDER CONTROL, 2:47 AM
//!
//! A record walks up. "Name?" "I don't have an `_id`." "Routing?" "What's routing?"
//! The officer sighs, opens the rulebook (the settings), and starts filling in blanks.
//! id from `uid`. routing from `tenant`. index from `logs-{@timestamp|yyyy.MM.dd}`.
//! The record leaves with a full set of metadata and no idea what just happened. Relatable.
//!
//! 📦 For each metadata dimension (id, parent, version, routing, ttl, timestamp, index,
//! params) exactly one rule is resolved at construction:
//! - a static field path (`es.mapping.id = uid`),
//! - a constant (`es.mapping.routing = <shard-7>`),
//! - or a named pluggable strategy from the [`ExtractorRegistry`].
//!
//! 🧠 Knowledge graph:
//! - Names resolve ONCE into the closed [`Extractor`] handle. A name nobody registered is a
//!   `ConfigError` before the first record, never a per-record surprise.
//! - Index names go through two chained stages: the index extractor (template) and the
//!   index formatter (dates). Each is independently pluggable.
//! - Same trait → concrete impls → enum dispatcher pattern as the backends. Symmetry is a lifestyle.
//!
//! 🦆 the duck's id is `<duck>`. constant. immutable. iconic.

pub mod index_name;
pub mod params;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConfigError, ConnectorError, Result};
use crate::record::{Record, scalar_to_string};
use crate::settings::{Settings, WriteOperation, keys};

pub use index_name::{DateIndexFormatter, IndexFormatterHandle, IndexTemplate};
pub use params::ParamsTemplate;

/// 🔌 A pluggable per-record strategy. Gets the record and the field mapping configured for
/// its dimension (if any). Returning `None` means "this record has no value".
pub trait FieldExtractor: Send + Sync + fmt::Debug {
    fn extract(&self, record: &dyn Record, mapping: Option<&str>) -> Option<Value>;
}

/// 🗓️ A pluggable second stage for index names: turn a value + pattern into a name fragment.
pub trait IndexFormatter: Send + Sync + fmt::Debug {
    fn format(&self, pattern: &str, value: &Value) -> Option<String>;
}

/// 📇 Named strategies, looked up once when the chain is built.
///
/// Built-ins (`index.template`, `index.formatter.date`, `index.formatter.identity`,
/// `params.default`) are always resolvable; user strategies are registered up front.
#[derive(Debug, Default, Clone)]
pub struct ExtractorRegistry {
    extractors: BTreeMap<String, Arc<dyn FieldExtractor>>,
    formatters: BTreeMap<String, Arc<dyn IndexFormatter>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📝 Register a field extractor under a name the settings can refer to.
    pub fn register_extractor(
        mut self,
        name: impl Into<String>,
        strategy: Arc<dyn FieldExtractor>,
    ) -> Self {
        self.extractors.insert(name.into(), strategy);
        self
    }

    /// 📝 Register an index formatter under a name the settings can refer to.
    pub fn register_formatter(
        mut self,
        name: impl Into<String>,
        formatter: Arc<dyn IndexFormatter>,
    ) -> Self {
        self.formatters.insert(name.into(), formatter);
        self
    }

    fn extractor(&self, key: &str, name: &str) -> std::result::Result<Arc<dyn FieldExtractor>, ConfigError> {
        self.extractors
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownExtractor {
                key: key.to_string(),
                name: name.to_string(),
            })
    }

    fn formatter(&self, name: &str) -> std::result::Result<IndexFormatterHandle, ConfigError> {
        match name {
            keys::DATE_INDEX_FORMATTER => Ok(IndexFormatterHandle::Date(DateIndexFormatter)),
            keys::IDENTITY_INDEX_FORMATTER => Ok(IndexFormatterHandle::Identity),
            custom => self
                .formatters
                .get(custom)
                .cloned()
                .map(|formatter| IndexFormatterHandle::Custom {
                    name: custom.to_string(),
                    formatter,
                })
                .ok_or_else(|| ConfigError::UnknownExtractor {
                    key: keys::MAPPING_INDEX_FORMATTER_CLASS.to_string(),
                    name: custom.to_string(),
                }),
        }
    }
}

/// 🎭 The closed, resolved handle for one dimension. Dispatch is a match, not a lookup.
#[derive(Debug, Clone)]
pub enum Extractor {
    /// 📍 read a field path from the record
    Field(String),
    /// 🪨 the same value for every record (`<literal>` in the mapping)
    Constant(Value),
    /// 🧩 built-in index name template + formatter
    IndexTemplate(IndexTemplate),
    /// 🧾 built-in `name:field` params list
    Params(ParamsTemplate),
    /// 🔌 a registered strategy, with the dimension's field mapping passed through
    Custom {
        name: String,
        mapping: Option<String>,
        strategy: Arc<dyn FieldExtractor>,
    },
}

impl Extractor {
    /// 🔧 Field mapping → handle. `<...>` is a constant, anything else is a path.
    pub fn from_mapping(mapping: &str) -> Self {
        match constant_literal(mapping) {
            Some(constant) => Extractor::Constant(constant),
            None => Extractor::Field(mapping.trim().to_string()),
        }
    }

    pub fn extract(&self, record: &dyn Record) -> std::result::Result<Option<Value>, String> {
        match self {
            Extractor::Field(path) => Ok(record.field(path).cloned()),
            Extractor::Constant(value) => Ok(Some(value.clone())),
            Extractor::IndexTemplate(template) => template.resolve(record).map(|name| Some(Value::String(name))),
            Extractor::Params(template) => template.resolve(record).map(|params| Some(Value::Object(params))),
            Extractor::Custom {
                mapping, strategy, ..
            } => Ok(strategy.extract(record, mapping.as_deref())),
        }
    }

    fn describe(&self) -> String {
        match self {
            Extractor::Field(path) => format!("field '{path}'"),
            Extractor::Constant(value) => format!("constant {value}"),
            Extractor::IndexTemplate(template) => format!("index template '{template}'"),
            Extractor::Params(template) => format!("params '{template}'"),
            Extractor::Custom { name, .. } => format!("extractor '{name}'"),
        }
    }
}

/// 🪨 `<value>` → the constant inside. JSON if it parses, otherwise a plain string.
pub(crate) fn constant_literal(mapping: &str) -> Option<Value> {
    let inner = mapping.trim().strip_prefix('<')?.strip_suffix('>')?;
    Some(serde_json::from_str(inner).unwrap_or_else(|_| Value::String(inner.to_string())))
}

/// 📋 Everything the bulk action line may need, for one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub index: String,
    pub doc_type: Option<String>,
    pub id: Option<String>,
    pub parent: Option<String>,
    pub version: Option<String>,
    pub version_type: Option<&'static str>,
    pub routing: Option<String>,
    pub ttl: Option<String>,
    pub timestamp: Option<String>,
    pub params: Option<Map<String, Value>>,
}

/// ⛓️ The per-connector chain: one resolved rule per dimension, applied to every record.
#[derive(Debug, Clone)]
pub struct ExtractorChain {
    index: Extractor,
    doc_type: Option<String>,
    id: Option<Extractor>,
    parent: Option<Extractor>,
    version: Option<Extractor>,
    routing: Option<Extractor>,
    ttl: Option<Extractor>,
    timestamp: Option<Extractor>,
    params: Option<Extractor>,
}

impl ExtractorChain {
    /// 🏗️ Resolve every dimension from settings. Unknown names fail here, before any record.
    pub fn from_settings(
        settings: &Settings,
        registry: &ExtractorRegistry,
    ) -> std::result::Result<Self, ConfigError> {
        let resource = settings.resource_write()?;
        let default_strategy = settings.get_explicit(keys::MAPPING_DEFAULT_EXTRACTOR_CLASS);

        let dimension = |mapping_key: &str, class_key: &str| -> std::result::Result<Option<Extractor>, ConfigError> {
            let mapping = settings.get_explicit(mapping_key).map(str::to_string);
            let class = settings
                .get_explicit(class_key)
                .map(|name| (class_key, name))
                .or_else(|| {
                    mapping
                        .as_ref()
                        .and(default_strategy)
                        .map(|name| (keys::MAPPING_DEFAULT_EXTRACTOR_CLASS, name))
                });
            match (class, mapping) {
                (Some((key, name)), mapping) => Ok(Some(Extractor::Custom {
                    name: name.to_string(),
                    strategy: registry.extractor(key, name)?,
                    mapping,
                })),
                (None, Some(mapping)) => Ok(Some(Extractor::from_mapping(&mapping))),
                (None, None) => Ok(None),
            }
        };

        let index = match settings.get(keys::MAPPING_INDEX_EXTRACTOR_CLASS) {
            Some(keys::INDEX_TEMPLATE_EXTRACTOR) | None => {
                let formatter = registry.formatter(
                    settings
                        .get(keys::MAPPING_INDEX_FORMATTER_CLASS)
                        .unwrap_or(keys::DATE_INDEX_FORMATTER),
                )?;
                Extractor::IndexTemplate(IndexTemplate::parse(&resource.index, formatter)?)
            }
            Some(custom) => Extractor::Custom {
                name: custom.to_string(),
                strategy: registry.extractor(keys::MAPPING_INDEX_EXTRACTOR_CLASS, custom)?,
                mapping: Some(resource.index.clone()),
            },
        };

        let params = Self::params_rule(settings, registry)?;

        let chain = Self {
            index,
            doc_type: resource.doc_type,
            id: dimension(keys::MAPPING_ID, keys::MAPPING_ID_EXTRACTOR_CLASS)?,
            parent: dimension(keys::MAPPING_PARENT, keys::MAPPING_PARENT_EXTRACTOR_CLASS)?,
            version: dimension(keys::MAPPING_VERSION, keys::MAPPING_VERSION_EXTRACTOR_CLASS)?,
            routing: dimension(keys::MAPPING_ROUTING, keys::MAPPING_ROUTING_EXTRACTOR_CLASS)?,
            ttl: dimension(keys::MAPPING_TTL, keys::MAPPING_TTL_EXTRACTOR_CLASS)?,
            timestamp: dimension(keys::MAPPING_TIMESTAMP, keys::MAPPING_TIMESTAMP_EXTRACTOR_CLASS)?,
            params,
        };
        debug!("🔍 extractor chain resolved: {}", chain.summary());
        Ok(chain)
    }

    fn params_rule(
        settings: &Settings,
        registry: &ExtractorRegistry,
    ) -> std::result::Result<Option<Extractor>, ConfigError> {
        let operation = settings.write_operation()?;
        if !operation.retries_conflicts() || settings.update_script().is_none() {
            // -- 🧾 params only mean something to a scripted update. everyone else: no params for you.
            return Ok(None);
        }
        let template = settings.get_explicit(keys::UPDATE_SCRIPT_PARAMS);
        let constants = settings.update_script_params_json()?;
        if template.is_none() && constants.is_none() {
            return Ok(None);
        }
        match settings.get(keys::MAPPING_PARAMS_EXTRACTOR_CLASS) {
            Some(keys::DEFAULT_PARAMS_EXTRACTOR) | None => Ok(Some(Extractor::Params(
                ParamsTemplate::parse(template.unwrap_or_default(), constants.unwrap_or_default())?,
            ))),
            Some(custom) => Ok(Some(Extractor::Custom {
                name: custom.to_string(),
                strategy: registry.extractor(keys::MAPPING_PARAMS_EXTRACTOR_CLASS, custom)?,
                mapping: template.map(str::to_string),
            })),
        }
    }

    /// 🎯 Run every active rule against one record. A configured rule with no value is an
    /// extraction error for this record only.
    pub fn extract(&self, record: &dyn Record) -> Result<DocumentMetadata> {
        let index = required_string("index", &self.index, record)?;
        let version = optional_string("version", self.version.as_ref(), record)?;
        let params = match &self.params {
            None => None,
            Some(rule) => match rule.extract(record).map_err(|reason| extraction("params", reason))? {
                Some(Value::Object(params)) => Some(params),
                Some(other) => {
                    return Err(extraction(
                        "params",
                        format!("{} produced {other}, expected an object", rule.describe()),
                    ));
                }
                None => {
                    return Err(extraction("params", format!("{} produced nothing", rule.describe())));
                }
            },
        };
        Ok(DocumentMetadata {
            index,
            doc_type: self.doc_type.clone(),
            id: optional_string("id", self.id.as_ref(), record)?,
            parent: optional_string("parent", self.parent.as_ref(), record)?,
            version_type: version.as_ref().map(|_| "external"),
            version,
            routing: optional_string("routing", self.routing.as_ref(), record)?,
            ttl: optional_string("ttl", self.ttl.as_ref(), record)?,
            timestamp: optional_string("timestamp", self.timestamp.as_ref(), record)?,
            params,
        })
    }

    /// 🆔 whether documents will carry an id (update/upsert/delete need one)
    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }

    fn summary(&self) -> String {
        let describe = |rule: &Option<Extractor>| {
            rule.as_ref()
                .map(Extractor::describe)
                .unwrap_or_else(|| "-".to_string())
        };
        format!(
            "index={} id={} parent={} version={} routing={} ttl={} timestamp={} params={}",
            self.index.describe(),
            describe(&self.id),
            describe(&self.parent),
            describe(&self.version),
            describe(&self.routing),
            describe(&self.ttl),
            describe(&self.timestamp),
            describe(&self.params),
        )
    }
}

fn extraction(dimension: &'static str, reason: String) -> ConnectorError {
    ConnectorError::Extraction { dimension, reason }
}

fn required_string(dimension: &'static str, rule: &Extractor, record: &dyn Record) -> Result<String> {
    optional_string(dimension, Some(rule), record)?
        .ok_or_else(|| extraction(dimension, format!("{} produced nothing", rule.describe())))
}

fn optional_string(
    dimension: &'static str,
    rule: Option<&Extractor>,
    record: &dyn Record,
) -> Result<Option<String>> {
    let Some(rule) = rule else {
        return Ok(None);
    };
    match rule.extract(record).map_err(|reason| extraction(dimension, reason))? {
        None | Some(Value::Null) => Err(extraction(
            dimension,
            format!("{} has no value in this record", rule.describe()),
        )),
        Some(value) => scalar_to_string(&value).map(Some).ok_or_else(|| {
            extraction(
                dimension,
                format!("{} produced {value}, which is not a scalar", rule.describe()),
            )
        }),
    }
}

/// 🧰 sanity hook used by the record writer: update-ish operations without an id rule.
pub(crate) fn ensure_id_for(operation: WriteOperation, chain: &ExtractorChain) -> std::result::Result<(), ConfigError> {
    if operation.requires_id() && !chain.has_id() {
        return Err(ConfigError::Incompatible(format!(
            "operation '{operation}' needs a document id; set '{}'",
            keys::MAPPING_ID
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::JsonRecord;
    use serde_json::json;

    #[derive(Debug)]
    struct ShoutingIdExtractor;

    impl FieldExtractor for ShoutingIdExtractor {
        fn extract(&self, record: &dyn Record, mapping: Option<&str>) -> Option<Value> {
            let field = record.field(mapping.unwrap_or("name"))?.as_str()?;
            Some(Value::String(field.to_uppercase()))
        }
    }

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        Settings::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn the_one_where_every_dimension_gets_its_passport_stamped() -> Result<()> {
        let settings = settings(&[
            (keys::RESOURCE_WRITE, "people/person"),
            (keys::MAPPING_ID, "uid"),
            (keys::MAPPING_PARENT, "family.id"),
            (keys::MAPPING_VERSION, "rev"),
            (keys::MAPPING_ROUTING, "<shard-7>"),
            (keys::MAPPING_TTL, "<1d>"),
            (keys::MAPPING_TIMESTAMP, "born"),
        ]);
        let chain = ExtractorChain::from_settings(&settings, &ExtractorRegistry::new())?;
        let record = JsonRecord::new(json!({
            "uid": 42, "family": {"id": "f-1"}, "rev": 3, "born": "1990-01-01"
        }));
        let metadata = chain.extract(&record)?;
        assert_eq!(metadata.index, "people");
        assert_eq!(metadata.doc_type.as_deref(), Some("person"));
        assert_eq!(metadata.id.as_deref(), Some("42"));
        assert_eq!(metadata.parent.as_deref(), Some("f-1"));
        assert_eq!(metadata.version.as_deref(), Some("3"));
        assert_eq!(metadata.version_type, Some("external"));
        assert_eq!(metadata.routing.as_deref(), Some("shard-7"));
        assert_eq!(metadata.ttl.as_deref(), Some("1d"));
        assert_eq!(metadata.timestamp.as_deref(), Some("1990-01-01"));
        assert_eq!(metadata.params, None);
        Ok(())
    }

    #[test]
    fn the_one_where_an_unregistered_extractor_fails_before_any_record() {
        let settings = settings(&[
            (keys::RESOURCE_WRITE, "people"),
            (keys::MAPPING_ID_EXTRACTOR_CLASS, "com.example.GhostExtractor"),
        ]);
        let err = ExtractorChain::from_settings(&settings, &ExtractorRegistry::new())
            .expect_err("💀 a ghost extractor must not resolve");
        assert_eq!(
            err,
            ConfigError::UnknownExtractor {
                key: keys::MAPPING_ID_EXTRACTOR_CLASS.to_string(),
                name: "com.example.GhostExtractor".to_string(),
            }
        );
    }

    #[test]
    fn the_one_where_an_unregistered_formatter_also_fails_up_front() {
        let settings = settings(&[
            (keys::RESOURCE_WRITE, "logs-{ts|yyyy}"),
            (keys::MAPPING_INDEX_FORMATTER_CLASS, "lunar.calendar"),
        ]);
        assert!(matches!(
            ExtractorChain::from_settings(&settings, &ExtractorRegistry::new()),
            Err(ConfigError::UnknownExtractor { .. })
        ));
    }

    #[test]
    fn the_one_where_a_registered_strategy_takes_the_wheel() -> Result<()> {
        let registry = ExtractorRegistry::new().register_extractor("shout", Arc::new(ShoutingIdExtractor));
        let settings = settings(&[
            (keys::RESOURCE_WRITE, "people"),
            (keys::MAPPING_ID, "nick"),
            (keys::MAPPING_ID_EXTRACTOR_CLASS, "shout"),
        ]);
        let chain = ExtractorChain::from_settings(&settings, &registry)?;
        let metadata = chain.extract(&JsonRecord::new(json!({"nick": "quiet"})))?;
        assert_eq!(metadata.id.as_deref(), Some("QUIET"));
        Ok(())
    }

    #[test]
    fn the_one_where_the_default_strategy_covers_mapped_dimensions_only() -> Result<()> {
        let registry = ExtractorRegistry::new().register_extractor("shout", Arc::new(ShoutingIdExtractor));
        let settings = settings(&[
            (keys::RESOURCE_WRITE, "people"),
            (keys::MAPPING_ROUTING, "team"),
            (keys::MAPPING_DEFAULT_EXTRACTOR_CLASS, "shout"),
        ]);
        let chain = ExtractorChain::from_settings(&settings, &registry)?;
        let metadata = chain.extract(&JsonRecord::new(json!({"team": "red"})))?;
        assert_eq!(metadata.routing.as_deref(), Some("RED"));
        assert_eq!(metadata.id, None, "unmapped dimensions stay inactive");
        Ok(())
    }

    #[test]
    fn the_one_where_a_missing_field_is_a_per_record_problem() -> Result<()> {
        let settings = settings(&[(keys::RESOURCE_WRITE, "people"), (keys::MAPPING_ID, "uid")]);
        let chain = ExtractorChain::from_settings(&settings, &ExtractorRegistry::new())?;
        let err = chain
            .extract(&JsonRecord::new(json!({"name": "no id here"})))
            .expect_err("💀 no uid, no passport");
        assert!(matches!(err, ConnectorError::Extraction { dimension: "id", .. }));
        assert!(!err.is_systemic());
        // -- ✅ the next record is fine. one bad apple does not spoil the chain.
        assert!(chain.extract(&JsonRecord::new(json!({"uid": "ok"})))?.id.is_some());
        Ok(())
    }

    #[test]
    fn the_one_where_object_ids_are_refused() -> Result<()> {
        let settings = settings(&[(keys::RESOURCE_WRITE, "people"), (keys::MAPPING_ID, "uid")]);
        let chain = ExtractorChain::from_settings(&settings, &ExtractorRegistry::new())?;
        assert!(chain.extract(&JsonRecord::new(json!({"uid": {"a": 1}}))).is_err());
        Ok(())
    }

    #[test]
    fn the_one_where_scripted_updates_get_their_params() -> Result<()> {
        let settings = settings(&[
            (keys::RESOURCE_WRITE, "counters"),
            (keys::WRITE_OPERATION, "update"),
            (keys::MAPPING_ID, "id"),
            (keys::UPDATE_SCRIPT, "ctx._source.count += params.delta"),
            (keys::UPDATE_SCRIPT_PARAMS, "delta:inc, source:<batch>"),
            (keys::UPDATE_SCRIPT_PARAMS_JSON, r#"{"unit":"clicks"}"#),
        ]);
        let chain = ExtractorChain::from_settings(&settings, &ExtractorRegistry::new())?;
        let metadata = chain.extract(&JsonRecord::new(json!({"id": "c1", "inc": 5})))?;
        let params = metadata.params.expect("💀 params should be present for a scripted update");
        assert_eq!(params["delta"], 5);
        assert_eq!(params["source"], "batch");
        assert_eq!(params["unit"], "clicks");
        Ok(())
    }

    #[test]
    fn the_one_where_ensure_id_catches_idless_deletes() -> std::result::Result<(), ConfigError> {
        let settings = settings(&[(keys::RESOURCE_WRITE, "people")]);
        let chain = ExtractorChain::from_settings(&settings, &ExtractorRegistry::new())?;
        assert!(ensure_id_for(WriteOperation::Delete, &chain).is_err());
        assert!(ensure_id_for(WriteOperation::Index, &chain).is_ok());
        Ok(())
    }
}
