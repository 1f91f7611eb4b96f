//! 📋 app_config: where the TOML file and the environment agree on what tonight's job is.
//!
//! 🧠 Knowledge graph:
//! - `settings`: the flat `es.*` table handed to the connector as a [`Settings`] view. TOML lets
//!   people write it as quoted keys (`"es.nodes" = "..."`), as nested tables (`[settings.es]`), or
//!   with real types (`port = 9200`). All of it collapses into `key → string` here.
//! - `runtime`: how many write workers and how deep their queues are.
//! - `job`: where the CLI reads from and writes to, and how it pages the input file.
//! - Environment variables win over the file: `ESX_RUNTIME__SINK_PARALLELISM=4`,
//!   `ESX_SETTINGS__ES__NODES=db1,db2`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::settings::Settings;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub job: JobConfig,
}

impl AppConfig {
    /// 🔧 Flatten the `settings` table into the string view the connector reads.
    pub fn settings_view(&self) -> Settings {
        let flat = flatten_settings(&self.settings)
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        Settings::new(flat)
    }
}

/// 🔧 `{"es.nodes": ..}` and `{es: {nodes: ..}}` both end up as `es.nodes`.
fn flatten_settings(settings: &BTreeMap<String, SettingValue>) -> BTreeMap<String, SettingValue> {
    let mut flat = BTreeMap::new();
    for (key, value) in settings {
        value.flatten_into(key, &mut flat);
    }
    flat
}

/// 🎛️ One value from the `settings` table, whatever TOML or the environment typed it as.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Table(BTreeMap<String, SettingValue>),
}

impl SettingValue {
    fn flatten_into(&self, prefix: &str, into: &mut BTreeMap<String, SettingValue>) {
        match self {
            SettingValue::Table(table) => {
                for (key, value) in table {
                    value.flatten_into(&format!("{prefix}.{key}"), into);
                }
            }
            scalar => {
                into.insert(prefix.to_string(), scalar.clone());
            }
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Flag(flag) => write!(f, "{flag}"),
            SettingValue::Integer(number) => write!(f, "{number}"),
            SettingValue::Float(number) => write!(f, "{number}"),
            SettingValue::Text(text) => f.write_str(text),
            SettingValue::Table(_) => f.write_str("<table>"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_queue_capacity", alias = "channel_size")]
    pub queue_capacity: usize,
    #[serde(default = "default_sink_parallelism", alias = "num_sink_workers")]
    pub sink_parallelism: usize,
}

fn default_queue_capacity() -> usize {
    10
}

fn default_sink_parallelism() -> usize {
    1
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            sink_parallelism: default_sink_parallelism(),
        }
    }
}

/// 📂 The CLI's side of the job: files in, files out, and how big a bite to take of the input.
#[derive(Debug, Deserialize, Clone)]
pub struct JobConfig {
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default = "default_max_page_docs")]
    pub max_page_docs: usize,
    #[serde(default = "default_max_page_bytes")]
    pub max_page_bytes: usize,
}

fn default_max_page_docs() -> usize {
    1000
}

fn default_max_page_bytes() -> usize {
    1024 * 1024
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            max_page_docs: default_max_page_docs(),
            max_page_bytes: default_max_page_bytes(),
        }
    }
}

/// 🚀 The optional TOML file, then `ESX_` variables on top, then extraction.
///
/// The `settings` table is flattened per layer before the layers meet. Figment would otherwise
/// keep a quoted `"es.nodes"` from the file and the `es → nodes` table built from
/// `ESX_SETTINGS__ES__NODES` as two different keys, and the file's spelling would win.
pub fn load_config(config_file_path: Option<&Path>) -> Result<AppConfig> {
    let mut file_layer = Figment::new();
    if let Some(path) = config_file_path {
        file_layer = file_layer.merge(Toml::file(path));
    }
    let env_layer = Figment::from(Env::prefixed("ESX_").split("__"));

    let mut app_config: AppConfig = file_layer.clone().merge(env_layer.clone()).extract().context(
        "💀 The config would not extract. Check the TOML for typos, and check ESX_* variables \
        for values that do not fit their slot (a word where a number should be, for one).",
    )?;
    let mut settings = layer_settings(&file_layer).context("💀 the config file's settings table")?;
    settings.extend(layer_settings(&env_layer).context("💀 the ESX_SETTINGS__* variables")?);
    app_config.settings = settings;

    info!(
        "📋 config loaded: {} settings, {} write workers, queue capacity {}",
        app_config.settings.len(),
        app_config.runtime.sink_parallelism,
        app_config.runtime.queue_capacity
    );
    Ok(app_config)
}

#[derive(Debug, Deserialize, Default)]
struct SettingsLayer {
    #[serde(default)]
    settings: BTreeMap<String, SettingValue>,
}

fn layer_settings(layer: &Figment) -> Result<BTreeMap<String, SettingValue>> {
    let layer: SettingsLayer = layer.extract()?;
    Ok(flatten_settings(&layer.settings))
}
