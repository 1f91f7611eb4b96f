//! 🔧 Settings: the typed window onto a flat bag of strings.
//!
//! 🎬 *[a HashMap of strings sits alone in the dark. "1mb," it whispers. "10s." "yes."]*
//! *[the view arrives, squints, and turns every one of them into a real type. or an error.]*
//!
//! 📦 `Settings` wraps an immutable `key → String` map. Every accessor parses on demand and
//! falls back to the defaults table in [`keys::DEFAULTS`]. Absent keys are never an error.
//! Present-but-garbage keys are always an error. There is no third option. We checked.
//!
//! 🧠 Knowledge graph:
//! - `keys`: the constants + immutable defaults table (no mutable process-wide state)
//! - `units`: size / duration / bool / list parsing
//! - Shared across tasks as `Arc<Settings>`; read-only, so no locks, no drama.
//!
//! 🦆 The duck defaults to `localhost`. The duck has never left `localhost`.

pub mod keys;
mod units;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// 🎭 Which bulk action the write pipeline emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOperation {
    Index,
    Create,
    Update,
    Upsert,
    Delete,
}

impl WriteOperation {
    /// 📡 the action name on the bulk action line. upsert is an update wearing a hat.
    pub fn action_name(&self) -> &'static str {
        match self {
            WriteOperation::Index => "index",
            WriteOperation::Create => "create",
            WriteOperation::Update | WriteOperation::Upsert => "update",
            WriteOperation::Delete => "delete",
        }
    }

    /// 🆔 update, upsert and delete address an existing document, so they need an id.
    pub fn requires_id(&self) -> bool {
        matches!(
            self,
            WriteOperation::Update | WriteOperation::Upsert | WriteOperation::Delete
        )
    }

    /// 🔄 the operations where an optimistic concurrency conflict is worth retrying.
    pub fn retries_conflicts(&self) -> bool {
        matches!(self, WriteOperation::Update | WriteOperation::Upsert)
    }
}

impl FromStr for WriteOperation {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "index" => Ok(WriteOperation::Index),
            "create" => Ok(WriteOperation::Create),
            "update" => Ok(WriteOperation::Update),
            "upsert" => Ok(WriteOperation::Upsert),
            "delete" => Ok(WriteOperation::Delete),
            _ => Err(()),
        }
    }
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteOperation::Index => "index",
            WriteOperation::Create => "create",
            WriteOperation::Update => "update",
            WriteOperation::Upsert => "upsert",
            WriteOperation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// 🔄 How hard the batch writer tries before it gives up on a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// 🚫 first rejection is final
    None,
    /// 🔁 bounded retries with a fixed wait between rounds
    Simple { max_retries: u32, wait: Duration },
}

/// 📂 `index/type`, split once. The index part may still be a `{template}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub index: String,
    pub doc_type: Option<String>,
}

impl Resource {
    /// 🔪 Split on the first `/` that is not inside a `{...}` template section.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_matches('/');
        if raw.is_empty() {
            return None;
        }
        let mut depth = 0usize;
        for (position, c) in raw.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                '/' if depth == 0 => {
                    let index = raw[..position].to_string();
                    let doc_type = raw[position + 1..].trim_matches('/');
                    return Some(Self {
                        index,
                        doc_type: (!doc_type.is_empty()).then(|| doc_type.to_string()),
                    });
                }
                _ => {}
            }
        }
        Some(Self {
            index: raw.to_string(),
            doc_type: None,
        })
    }

    /// 🧩 whether the index name needs per-record resolution
    pub fn is_pattern(&self) -> bool {
        self.index.contains('{')
    }
}

/// 🧦 One proxy flavor: host, port, optional credentials, and whether to defer to the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub use_system_props: bool,
}

/// 📦 The immutable settings view. Cheap to clone behind an `Arc`, impossible to mutate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// 🏗️ Build a view over an owned map. The map is frozen from here on.
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// 🧪 Convenience for tests and callers with a handful of pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// 🔎 The raw value, or its documented default. Blank strings count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| keys::default_for(key))
    }

    /// 🔎 Only what the user actually set, ignoring defaults.
    pub fn get_explicit(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    fn parsed<T>(
        &self,
        key: &str,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse(raw).map(Some).ok_or_else(|| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.to_string(),
                expected,
            }),
        }
    }

    fn required<T>(
        &self,
        key: &str,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, ConfigError> {
        self.parsed(key, expected, parse)?
            .ok_or_else(|| ConfigError::Missing {
                key: key.to_string(),
                reason: "and has no default",
            })
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        self.required(key, "boolean", units::parse_bool)
    }

    pub fn get_size(&self, key: &str) -> Result<u64, ConfigError> {
        self.required(key, "byte size", units::parse_size)
    }

    pub fn get_duration(&self, key: &str) -> Result<Duration, ConfigError> {
        self.required(key, "duration", units::parse_duration)
    }

    pub fn get_u32(&self, key: &str) -> Result<u32, ConfigError> {
        self.required(key, "non-negative integer", |raw| raw.trim().parse().ok())
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(units::parse_list).unwrap_or_default()
    }

    // ===== network =====

    /// 📡 Target nodes, `host` or `host:port`, deprecated `es.host` as a fallback.
    pub fn nodes(&self) -> Vec<String> {
        match self.get_explicit(keys::NODES) {
            Some(raw) => units::parse_list(raw),
            None => match self.get_explicit(keys::HOST) {
                Some(raw) => units::parse_list(raw),
                None => self.get_list(keys::NODES),
            },
        }
    }

    pub fn port(&self) -> Result<u16, ConfigError> {
        self.required(keys::PORT, "port number", |raw| raw.trim().parse().ok())
    }

    pub fn nodes_discovery(&self) -> Result<bool, ConfigError> {
        self.get_bool(keys::NODES_DISCOVERY)
    }

    pub fn http_timeout(&self) -> Result<Duration, ConfigError> {
        self.get_duration(keys::HTTP_TIMEOUT)
    }

    pub fn http_retries(&self) -> Result<u32, ConfigError> {
        self.get_u32(keys::HTTP_RETRIES)
    }

    /// 🔒 basic auth credentials, only when a user was configured
    pub fn http_auth(&self) -> Option<(String, Option<String>)> {
        self.get_explicit(keys::HTTP_AUTH_USER).map(|user| {
            (
                user.to_string(),
                self.get_explicit(keys::HTTP_AUTH_PASS).map(str::to_string),
            )
        })
    }

    pub fn http_proxy(&self) -> Result<ProxySettings, ConfigError> {
        self.proxy(
            keys::PROXY_HTTP_HOST,
            keys::PROXY_HTTP_PORT,
            keys::PROXY_HTTP_USER,
            keys::PROXY_HTTP_PASS,
            keys::PROXY_HTTP_USE_SYSTEM_PROPS,
        )
    }

    pub fn socks_proxy(&self) -> Result<ProxySettings, ConfigError> {
        self.proxy(
            keys::PROXY_SOCKS_HOST,
            keys::PROXY_SOCKS_PORT,
            keys::PROXY_SOCKS_USER,
            keys::PROXY_SOCKS_PASS,
            keys::PROXY_SOCKS_USE_SYSTEM_PROPS,
        )
    }

    /// 🧦 Both proxy flavors at once. Only one of them may name a host: the client routes every
    /// request through a single proxy, so a second one would sit there unused.
    pub fn proxies(&self) -> Result<(ProxySettings, ProxySettings), ConfigError> {
        let (http, socks) = (self.http_proxy()?, self.socks_proxy()?);
        if let (Some(http_host), Some(socks_host)) = (&http.host, &socks.host) {
            return Err(ConfigError::Incompatible(format!(
                "both an HTTP proxy ('{http_host}') and a SOCKS proxy ('{socks_host}') are set; \
                pick one"
            )));
        }
        Ok((http, socks))
    }

    fn proxy(
        &self,
        host: &str,
        port: &str,
        user: &str,
        pass: &str,
        use_system: &str,
    ) -> Result<ProxySettings, ConfigError> {
        Ok(ProxySettings {
            host: self.get_explicit(host).map(str::to_string),
            port: self.parsed(port, "port number", |raw| raw.trim().parse().ok())?,
            user: self.get_explicit(user).map(str::to_string),
            pass: self.get_explicit(pass).map(str::to_string),
            use_system_props: self.get_bool(use_system)?,
        })
    }

    // ===== resources =====

    /// 📂 Where writes go: `es.resource.write`, else `es.resource`.
    pub fn resource_write(&self) -> Result<Resource, ConfigError> {
        self.resource(keys::RESOURCE_WRITE, "for the write path")
    }

    /// 📂 Where reads come from: `es.resource.read`, else `es.resource`.
    pub fn resource_read(&self) -> Result<Resource, ConfigError> {
        self.resource(keys::RESOURCE_READ, "for the read path")
    }

    fn resource(&self, specific: &str, reason: &'static str) -> Result<Resource, ConfigError> {
        let raw = self
            .get_explicit(specific)
            .or_else(|| self.get_explicit(keys::RESOURCE))
            .ok_or_else(|| ConfigError::Missing {
                key: specific.to_string(),
                reason,
            })?;
        Resource::parse(raw).ok_or_else(|| ConfigError::Invalid {
            key: specific.to_string(),
            value: raw.to_string(),
            expected: "index[/type] resource",
        })
    }

    pub fn query(&self) -> Option<&str> {
        self.get_explicit(keys::QUERY)
    }

    // ===== batching & retries =====

    pub fn batch_size_bytes(&self) -> Result<usize, ConfigError> {
        Ok(self.get_size(keys::BATCH_SIZE_BYTES)? as usize)
    }

    pub fn batch_size_entries(&self) -> Result<usize, ConfigError> {
        Ok(self.get_u32(keys::BATCH_SIZE_ENTRIES)? as usize)
    }

    pub fn batch_flush_manual(&self) -> Result<bool, ConfigError> {
        self.get_bool(keys::BATCH_FLUSH_MANUAL)
    }

    pub fn batch_write_refresh(&self) -> Result<bool, ConfigError> {
        self.get_bool(keys::BATCH_WRITE_REFRESH)
    }

    pub fn batch_write_ignore_existing(&self) -> Result<bool, ConfigError> {
        self.get_bool(keys::BATCH_WRITE_IGNORE_EXISTING)
    }

    /// 🔄 The batch-level retry policy, with count and wait folded in.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let name = self.required(keys::BATCH_WRITE_RETRY_POLICY, "retry policy (none|simple)", |raw| {
            match raw.trim().to_ascii_lowercase().as_str() {
                "none" => Some(false),
                "simple" => Some(true),
                _ => None,
            }
        })?;
        if !name {
            return Ok(RetryPolicy::None);
        }
        Ok(RetryPolicy::Simple {
            max_retries: self.get_u32(keys::BATCH_WRITE_RETRY_COUNT)?,
            wait: self.get_duration(keys::BATCH_WRITE_RETRY_WAIT)?,
        })
    }

    // ===== scroll =====

    pub fn scroll_keepalive(&self) -> Result<Duration, ConfigError> {
        self.get_duration(keys::SCROLL_KEEPALIVE)
    }

    pub fn scroll_size(&self) -> Result<usize, ConfigError> {
        Ok(self.get_u32(keys::SCROLL_SIZE)? as usize)
    }

    pub fn scroll_fields(&self) -> Vec<String> {
        self.get_list(keys::SCROLL_FIELDS)
    }

    pub fn heart_beat_lead(&self) -> Result<Duration, ConfigError> {
        self.get_duration(keys::HEART_BEAT_LEAD)
    }

    // ===== input / read conversion =====

    pub fn input_json(&self) -> Result<bool, ConfigError> {
        self.get_bool(keys::INPUT_JSON)
    }

    pub fn field_read_empty_as_null(&self) -> Result<bool, ConfigError> {
        self.get_bool(keys::FIELD_READ_EMPTY_AS_NULL)
    }

    pub fn index_auto_create(&self) -> Result<bool, ConfigError> {
        self.get_bool(keys::INDEX_AUTO_CREATE)
    }

    pub fn index_read_missing_as_empty(&self) -> Result<bool, ConfigError> {
        self.get_bool(keys::INDEX_READ_MISSING_AS_EMPTY)
    }

    pub fn read_metadata(&self) -> Result<bool, ConfigError> {
        self.get_bool(keys::READ_METADATA)
    }

    pub fn read_metadata_field(&self) -> &str {
        self.get(keys::READ_METADATA_FIELD).unwrap_or("_metadata")
    }

    pub fn read_metadata_version(&self) -> Result<bool, ConfigError> {
        self.get_bool(keys::READ_METADATA_VERSION)
    }

    // ===== write operation =====

    pub fn write_operation(&self) -> Result<WriteOperation, ConfigError> {
        self.required(
            keys::WRITE_OPERATION,
            "write operation (index|create|update|upsert|delete)",
            |raw| raw.parse().ok(),
        )
    }

    pub fn update_retry_on_conflict(&self) -> Result<u32, ConfigError> {
        self.get_u32(keys::UPDATE_RETRY_ON_CONFLICT)
    }

    pub fn update_script(&self) -> Option<&str> {
        self.get_explicit(keys::UPDATE_SCRIPT)
    }

    pub fn update_script_lang(&self) -> Option<&str> {
        self.get_explicit(keys::UPDATE_SCRIPT_LANG)
    }

    /// 🧾 Constant script params given as a JSON object literal.
    pub fn update_script_params_json(
        &self,
    ) -> Result<Option<serde_json::Map<String, serde_json::Value>>, ConfigError> {
        self.parsed(keys::UPDATE_SCRIPT_PARAMS_JSON, "JSON object", |raw| {
            match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(serde_json::Value::Object(map)) => Some(map),
                _ => None,
            }
        })
    }

    // ===== validation =====

    /// ✅ Touch every accessor the write path needs so parse errors surface before the first record.
    pub fn validate_for_write(&self) -> Result<(), ConfigError> {
        self.resource_write()?;
        self.port()?;
        self.nodes_discovery()?;
        self.http_timeout()?;
        self.http_retries()?;
        self.proxies()?;
        if self.batch_size_bytes()? == 0 {
            return Err(ConfigError::Invalid {
                key: keys::BATCH_SIZE_BYTES.to_string(),
                value: "0".to_string(),
                expected: "positive byte size",
            });
        }
        self.batch_size_entries()?;
        self.batch_flush_manual()?;
        self.batch_write_refresh()?;
        self.batch_write_ignore_existing()?;
        self.retry_policy()?;
        self.input_json()?;
        self.index_auto_create()?;
        self.update_retry_on_conflict()?;
        self.update_script_params_json()?;
        let operation = self.write_operation()?;
        if operation.requires_id() && self.get_explicit(keys::MAPPING_ID).is_none()
            && self.get_explicit(keys::MAPPING_ID_EXTRACTOR_CLASS).is_none()
        {
            return Err(ConfigError::Incompatible(format!(
                "operation '{operation}' needs a document id; set '{}'",
                keys::MAPPING_ID
            )));
        }
        if operation == WriteOperation::Delete && self.update_script().is_some() {
            return Err(ConfigError::Incompatible(
                "a delete cannot carry an update script".to_string(),
            ));
        }
        if self.batch_size_entries()? == 0 {
            return Err(ConfigError::Invalid {
                key: keys::BATCH_SIZE_ENTRIES.to_string(),
                value: "0".to_string(),
                expected: "positive entry count",
            });
        }
        Ok(())
    }

    /// ✅ Same idea for the read path.
    pub fn validate_for_read(&self) -> Result<(), ConfigError> {
        let resource = self.resource_read()?;
        if resource.is_pattern() {
            return Err(ConfigError::Incompatible(format!(
                "'{}' is a per-record index pattern; a read needs a concrete index",
                resource.index
            )));
        }
        self.port()?;
        self.nodes_discovery()?;
        self.http_timeout()?;
        self.http_retries()?;
        self.proxies()?;
        self.scroll_keepalive()?;
        self.heart_beat_lead()?;
        self.field_read_empty_as_null()?;
        self.index_read_missing_as_empty()?;
        self.read_metadata()?;
        self.read_metadata_version()?;
        if self.scroll_size()? == 0 {
            return Err(ConfigError::Invalid {
                key: keys::SCROLL_SIZE.to_string(),
                value: "0".to_string(),
                expected: "positive page size",
            });
        }
        Ok(())
    }
}
