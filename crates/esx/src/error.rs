//! 💀 Errors: the taxonomy of sadness, sorted into drawers.
//!
//! 🎬 *[a bulk response arrives. 998 items say 201. two say 429.]*
//! *["Are those bad?" asks the intern. "It depends," says the senior, reaching for this file.]*
//!
//! The core speaks in typed errors because the retry loop needs to know *which kind* of bad
//! news it just got. A 429 gets a second chance. A mapping conflict gets a eulogy.
//! The outer layers (workers, CLI) wrap everything in `anyhow` with context, same as always.
//!
//! 🧠 Knowledge graph:
//! - `ConfigError`: settings that cannot be parsed or resolved. Always fatal at construction.
//! - `ConnectorError`: everything the pipelines can raise at runtime, plus `Config` via `From`.
//! - `EntryFailure`: a single bulk entry that did not make it, with enough detail to find it.
//!
//! 🦆 (the duck is retryable. the duck is always retryable.)

use std::fmt;

use thiserror::Error;

/// 🔧 Settings that refused to become typed values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 💀 A value exists but does not parse as its declared type.
    #[error("💀 setting '{key}' has value '{value}' which is not a valid {expected}")]
    Invalid {
        key: String,
        value: String,
        expected: &'static str,
    },

    /// 💀 A setting the current pipeline needs was never provided.
    #[error("💀 setting '{key}' is required {reason}")]
    Missing { key: String, reason: &'static str },

    /// 💀 A pluggable strategy name that nobody registered.
    #[error("💀 no extractor named '{name}' is registered (requested by '{key}')")]
    UnknownExtractor { key: String, name: String },

    /// 💀 Settings that parse fine on their own but contradict each other.
    #[error("💀 incompatible settings: {0}")]
    Incompatible(String),
}

/// 📦 Why a single bulk entry failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// 🪦 Malformed document, mapping conflict, etc. Never retried.
    Terminal { error_type: String, reason: String },
    /// 🔄 Was retryable, but the retry budget ran out with this entry still pending.
    RetriesExhausted,
    /// 🚫 Was retryable, but the retry policy is `none`.
    RetryDisabled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Terminal { error_type, reason } => write!(f, "{error_type}: {reason}"),
            FailureKind::RetriesExhausted => f.write_str("retries exhausted"),
            FailureKind::RetryDisabled => f.write_str("rejected and retry policy is 'none'"),
        }
    }
}

/// 🎯 One entry that did not land, addressed by its position in the submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    /// 📍 zero-based position of the entry in the batch handed to the writer
    pub position: usize,
    /// 📡 last HTTP status the service reported for this entry
    pub status: u16,
    /// 🆔 document id, when the action line carried one
    pub id: Option<String>,
    pub kind: FailureKind,
}

impl fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entry #{} (id: {}, status {}): {}",
            self.position,
            self.id.as_deref().unwrap_or("<auto>"),
            self.status,
            self.kind
        )
    }
}

/// 💀 Everything the connector can raise at runtime.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 🔍 A record could not yield a metadata value that its mapping requires.
    #[error("💀 could not extract [{dimension}] from record: {reason}")]
    Extraction {
        dimension: &'static str,
        reason: String,
    },

    /// 📏 A single entry is bigger than a whole batch is allowed to be.
    #[error("💀 entry of {size} bytes can never fit in a batch capped at {limit} bytes")]
    Oversize { size: usize, limit: usize },

    /// 🔄 The retry budget ran out with entries still pending.
    #[error("💀 bulk write gave up after {attempts} submissions; {} entries never landed: {}", failures.len(), summarize(failures))]
    RetriesExhausted {
        attempts: u32,
        failures: Vec<EntryFailure>,
    },

    /// 🚫 The service rejected the whole bulk request outright.
    #[error("💀 bulk request rejected with status {status}: {body}")]
    BulkRejected { status: u16, body: String },

    /// 📡 Connection, timeout, or protocol failure after HTTP-level retries.
    #[error("💀 transport failure: {0}")]
    Transport(String),

    /// 📖 Malformed query or missing resource on the read path.
    #[error("💀 read failed: {0}")]
    Read(String),

    /// 🛑 Cancelled at an attempt boundary. Entries already committed stay committed.
    #[error("🛑 cancelled after {committed} entries had already gone through")]
    Cancelled { committed: usize },

    /// 📦 A document or response could not be (de)serialized.
    #[error("💀 serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConnectorError {
    /// 🔄 Transport hiccups are the only runtime errors worth another HTTP attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::Transport(_))
    }

    /// 🪦 Systemic failures abort the owning task. Per-record ones do not.
    pub fn is_systemic(&self) -> bool {
        !matches!(
            self,
            ConnectorError::Extraction { .. } | ConnectorError::Oversize { .. }
        )
    }
}

fn summarize(failures: &[EntryFailure]) -> String {
    // -- 📋 the first handful is enough to find the culprits, the rest is noise
    let mut shown: Vec<String> = failures.iter().take(5).map(ToString::to_string).collect();
    if failures.len() > 5 {
        shown.push(format!("... and {} more", failures.len() - 5));
    }
    shown.join("; ")
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_only_transport_errors_get_a_second_chance() {
        assert!(ConnectorError::Transport("connection reset".into()).is_retryable());
        assert!(!ConnectorError::Read("index_not_found".into()).is_retryable());
        assert!(!ConnectorError::Oversize { size: 10, limit: 5 }.is_retryable());
    }

    #[test]
    fn the_one_where_per_record_errors_do_not_abort_the_task() {
        let extraction = ConnectorError::Extraction {
            dimension: "id",
            reason: "field 'uid' not found".into(),
        };
        assert!(!extraction.is_systemic());
        assert!(ConnectorError::Cancelled { committed: 3 }.is_systemic());
    }

    #[test]
    fn the_one_where_exhaustion_names_the_offending_entries() {
        let failures: Vec<EntryFailure> = (0..7)
            .map(|position| EntryFailure {
                position,
                status: 429,
                id: Some(format!("doc-{position}")),
                kind: FailureKind::RetriesExhausted,
            })
            .collect();
        let message = ConnectorError::RetriesExhausted {
            attempts: 4,
            failures,
        }
        .to_string();
        assert!(message.contains("7 entries"));
        assert!(message.contains("doc-0"));
        assert!(message.contains("and 2 more"));
    }
}
