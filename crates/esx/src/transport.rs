//! 📡 Transport: the only part of the connector that knows HTTP exists.
//!
//! 🎬 COLD OPEN. EXT. THE NETWORK, NIGHT
//! Packets everywhere. Some arrive. Some don't. Some arrive twice, wearing different hats.
//! The bulk writer does not want to know any of this. It wants a status code and a body.
//! This module gives it exactly that and absorbs the rest.
//!
//! 🧠 Knowledge graph:
//! - Pattern: `Transport` trait → concrete impls (`HttpTransport`, `InMemoryCluster`)
//!   → `TransportBackend` enum dispatcher. Same shape as sources and sinks.
//! - Replies are raw `(status, body)`. Classification of bulk items and search pages lives
//!   with the callers, who know what the bytes mean.
//! - Connection failures that survive the HTTP-level retries come back as
//!   `ConnectorError::Transport`. Non-2xx responses are NOT errors at this layer.

pub mod http;
pub mod in_mem;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use http::HttpTransport;
pub use in_mem::{InMemoryCluster, RecordedRequest};

/// 📬 What came back: a status code and a body. Judgement is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

impl TransportReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 🔍 An initial scroll search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// 📂 index (or comma separated indices / pattern)
    pub index: String,
    pub doc_type: Option<String>,
    /// 📦 the JSON body: query, size, `_source` projection
    pub body: Value,
    /// 🔤 `q=` URI query, when the user wrote one
    pub uri_query: Option<String>,
    pub keep_alive: Duration,
}

/// 🔌 The seam between the pipelines and the wire.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// 📡 POST an NDJSON payload to `_bulk`.
    async fn bulk(&self, payload: String) -> Result<TransportReply>;

    /// 🔄 Refresh an index so recent writes become searchable.
    async fn refresh(&self, index: &str) -> Result<TransportReply>;

    /// 🔎 Whether an index exists.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// 🔍 Open a scroll: initial search with a keep-alive.
    async fn search(&self, request: &SearchRequest) -> Result<TransportReply>;

    /// 📜 Continue a scroll and renew its keep-alive.
    async fn scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<TransportReply>;

    /// 🗑️ Release a scroll cursor server-side.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<TransportReply>;
}

/// 🎭 The concrete transports, dispatched without a vtable.
#[derive(Debug, Clone)]
pub enum TransportBackend {
    Http(HttpTransport),
    InMemory(InMemoryCluster),
}

#[async_trait]
impl Transport for TransportBackend {
    async fn bulk(&self, payload: String) -> Result<TransportReply> {
        match self {
            TransportBackend::Http(transport) => transport.bulk(payload).await,
            TransportBackend::InMemory(cluster) => cluster.bulk(payload).await,
        }
    }

    async fn refresh(&self, index: &str) -> Result<TransportReply> {
        match self {
            TransportBackend::Http(transport) => transport.refresh(index).await,
            TransportBackend::InMemory(cluster) => cluster.refresh(index).await,
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        match self {
            TransportBackend::Http(transport) => transport.index_exists(index).await,
            TransportBackend::InMemory(cluster) => cluster.index_exists(index).await,
        }
    }

    async fn search(&self, request: &SearchRequest) -> Result<TransportReply> {
        match self {
            TransportBackend::Http(transport) => transport.search(request).await,
            TransportBackend::InMemory(cluster) => cluster.search(request).await,
        }
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<TransportReply> {
        match self {
            TransportBackend::Http(transport) => transport.scroll(scroll_id, keep_alive).await,
            TransportBackend::InMemory(cluster) => cluster.scroll(scroll_id, keep_alive).await,
        }
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<TransportReply> {
        match self {
            TransportBackend::Http(transport) => transport.clear_scroll(scroll_id).await,
            TransportBackend::InMemory(cluster) => cluster.clear_scroll(scroll_id).await,
        }
    }
}

/// ⏱️ Keep-alives go over the wire in milliseconds: `300000ms`.
pub(crate) fn keep_alive_param(keep_alive: Duration) -> String {
    format!("{}ms", keep_alive.as_millis())
}
