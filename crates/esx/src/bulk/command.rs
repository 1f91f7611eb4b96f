//! 🧾 Bulk commands: one action line, maybe one document line, per record.
//!
//! ```text
//! {"update":{"_index":"counters","_id":"c1"}}
//! {"script":{"source":"ctx._source.n += params.d","params":{"d":5}},"upsert":{"n":5}}
//! ```
//!
//! The document body is spliced in as text, never re-parsed. With `es.input.json` the record's
//! raw line goes straight through; otherwise the record serializes itself once.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::extract::DocumentMetadata;
use crate::record::Record;
use crate::settings::{Settings, WriteOperation};

/// 📦 One rendered bulk entry. `size` is what it adds to the payload, newlines included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkEntry {
    action: String,
    document: Option<String>,
    index: String,
    id: Option<String>,
}

impl BulkEntry {
    pub fn new(action: String, document: Option<String>, index: String, id: Option<String>) -> Self {
        Self {
            action,
            document,
            index,
            id,
        }
    }

    /// 📏 bytes this entry contributes to an NDJSON payload
    pub fn size(&self) -> usize {
        self.action.len() + 1 + self.document.as_ref().map_or(0, |document| document.len() + 1)
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// 🧵 Append both lines to an NDJSON payload.
    pub fn write_to(&self, payload: &mut String) {
        payload.push_str(&self.action);
        payload.push('\n');
        if let Some(document) = &self.document {
            payload.push_str(document);
            payload.push('\n');
        }
    }
}

#[derive(Serialize)]
struct ActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'a str>,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    routing: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version_type: Option<&'a str>,
    #[serde(rename = "_ttl", skip_serializing_if = "Option::is_none")]
    ttl: Option<&'a str>,
    #[serde(rename = "_timestamp", skip_serializing_if = "Option::is_none")]
    timestamp: Option<&'a str>,
}

#[derive(Serialize)]
struct Script<'a> {
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    lang: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Map<String, Value>>,
}

/// 🏭 Renders entries for one write operation, configured once per task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCommandFactory {
    operation: WriteOperation,
    script: Option<String>,
    script_lang: Option<String>,
}

impl BulkCommandFactory {
    pub fn new(operation: WriteOperation) -> Self {
        Self {
            operation,
            script: None,
            script_lang: None,
        }
    }

    /// 📜 Attach an update script. Ignored by index, create and delete.
    pub fn with_script(mut self, script: impl Into<String>, lang: Option<String>) -> Self {
        self.script = Some(script.into());
        self.script_lang = lang;
        self
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let factory = Self::new(settings.write_operation()?);
        Ok(match settings.update_script() {
            Some(script) => factory.with_script(script, settings.update_script_lang().map(str::to_string)),
            None => factory,
        })
    }

    pub fn operation(&self) -> WriteOperation {
        self.operation
    }

    pub fn render(&self, metadata: &DocumentMetadata, record: &dyn Record) -> Result<BulkEntry> {
        let meta = ActionMeta {
            index: &metadata.index,
            doc_type: metadata.doc_type.as_deref(),
            id: metadata.id.as_deref(),
            routing: metadata.routing.as_deref(),
            parent: metadata.parent.as_deref(),
            version: metadata.version.as_deref().map(|version| match version.parse::<i64>() {
                Ok(number) => Value::from(number),
                Err(_) => Value::String(version.to_string()),
            }),
            version_type: metadata.version_type,
            ttl: metadata.ttl.as_deref(),
            timestamp: metadata.timestamp.as_deref(),
        };
        let action = format!(
            "{{\"{}\":{}}}",
            self.operation.action_name(),
            serde_json::to_string(&meta)?
        );

        let document = match self.operation {
            WriteOperation::Delete => None,
            WriteOperation::Index | WriteOperation::Create => Some(record.to_document()?),
            WriteOperation::Update => Some(match &self.script {
                Some(_) => format!("{{\"script\":{}}}", self.script_json(metadata)?),
                None => format!("{{\"doc\":{}}}", record.to_document()?),
            }),
            WriteOperation::Upsert => Some(match &self.script {
                Some(_) => format!(
                    "{{\"script\":{},\"upsert\":{}}}",
                    self.script_json(metadata)?,
                    record.to_document()?
                ),
                None => format!("{{\"doc\":{},\"doc_as_upsert\":true}}", record.to_document()?),
            }),
        };

        Ok(BulkEntry::new(
            action,
            document,
            metadata.index.clone(),
            metadata.id.clone(),
        ))
    }

    fn script_json(&self, metadata: &DocumentMetadata) -> Result<String> {
        let script = Script {
            source: self.script.as_deref().unwrap_or_default(),
            lang: self.script_lang.as_deref(),
            params: metadata.params.as_ref(),
        };
        Ok(serde_json::to_string(&script)?)
    }
}
