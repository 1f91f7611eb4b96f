//! 📜 The scroll reader: one search, then a cursor, then pages until the well runs dry.
//!
//! 🎬 *[a cursor is born with five minutes to live. every page it fetches buys it five more.]*
//! *[when the pages stop coming, it is cleared. it does not get a second life. nobody does.]*
//!
//! ```text
//! Uninitialized ──open──▶ Active ──empty page──▶ Exhausted
//!                           │
//!                           └──non-retryable error──▶ Failed
//! ```
//!
//! 🧠 Knowledge graph:
//! - `open` runs the initial search. Its first page is buffered and handed out by the first
//!   `next`, so a reader over 120 documents at size 50 yields 50, 50, 20, then empty.
//! - Every continuation renews the keep-alive. `heartbeat` renews proactively when the cursor is
//!   within the lead time of expiring; it does so by prefetching, so no data is skipped. Prefetched
//!   pages queue up behind each other for as long as the consumer stays busy, up to
//!   [`PREFETCH_LIMIT`] pages.
//! - A missing index is an empty result only with `es.index.read.missing.as.empty`.
//! - Exhausted or failed cursors are cleared server-side and never reused.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ConnectorError, Result};
use crate::settings::{Resource, Settings};
use crate::transport::{SearchRequest, Transport, TransportReply};

/// 🚦 Where the reader is in its short life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollState {
    Uninitialized,
    Active,
    Exhausted,
    Failed,
}

/// 🎟️ The server-side cursor: an opaque id and the clock it runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollCursor {
    id: String,
    keep_alive: Duration,
    renewed_at: Instant,
}

impl ScrollCursor {
    fn new(id: String, keep_alive: Duration) -> Self {
        Self {
            id,
            keep_alive,
            renewed_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// ⏳ time left before the server forgets this cursor
    pub fn remaining(&self) -> Duration {
        self.keep_alive.saturating_sub(self.renewed_at.elapsed())
    }

    fn renew(&mut self, id: Option<String>) {
        if let Some(id) = id {
            self.id = id;
        }
        self.renewed_at = Instant::now();
    }
}

/// 🏷️ What to attach to each document when metadata reading is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataOptions {
    pub field: String,
    pub version: bool,
}

/// ⚙️ Reader knobs, resolved once from settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderOptions {
    pub resource: Resource,
    pub query: Option<String>,
    pub size: usize,
    pub keep_alive: Duration,
    pub fields: Vec<String>,
    pub heartbeat_lead: Duration,
    pub missing_as_empty: bool,
    pub empty_as_null: bool,
    pub metadata: Option<MetadataOptions>,
    /// 🍕 which slice of a sliced scroll this reader owns, if the read is split across readers
    pub slice: Option<Slice>,
}

/// 🍕 One slice of a sliced scroll: `id` in `0..max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub id: u32,
    pub max: u32,
}

impl ReaderOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate_for_read()?;
        Ok(Self {
            resource: settings.resource_read()?,
            query: settings.query().map(str::to_string),
            size: settings.scroll_size()?,
            keep_alive: settings.scroll_keepalive()?,
            fields: settings.scroll_fields(),
            heartbeat_lead: settings.heart_beat_lead()?,
            missing_as_empty: settings.index_read_missing_as_empty()?,
            empty_as_null: settings.field_read_empty_as_null()?,
            metadata: settings.read_metadata()?.then(|| MetadataOptions {
                field: settings.read_metadata_field().to_string(),
                version: false,
            }),
            slice: None,
        }
        .with_metadata_version(settings.read_metadata_version()?))
    }

    /// 🍕 Claim slice `id` of `max`. A single slice is the same as no slicing.
    pub fn with_slice(mut self, id: u32, max: u32) -> Self {
        self.slice = (max > 1).then_some(Slice { id, max });
        self
    }

    fn with_metadata_version(mut self, version: bool) -> Self {
        if let Some(metadata) = &mut self.metadata {
            metadata.version = version;
        }
        self
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Value>,
}

/// 🔨 Turn `es.query` into a search body (and maybe a `q=` URI query).
///
/// Accepted forms: empty (match_all), `?q=...` URI syntax, a bare query object
/// (`{"match":{...}}`), or a full body with a top-level `query`.
pub fn build_search(
    query: Option<&str>,
    size: usize,
    fields: &[String],
    with_version: bool,
) -> Result<(Value, Option<String>)> {
    let query = query.map(str::trim).filter(|query| !query.is_empty());
    let (mut body, uri_query) = match query {
        None => (json!({ "query": { "match_all": {} } }), None),
        Some(uri) if uri.starts_with('?') => {
            let q = uri[1..]
                .split('&')
                .find_map(|pair| pair.strip_prefix("q="))
                .filter(|q| !q.is_empty())
                .ok_or_else(|| ConnectorError::Read(format!("URI query '{uri}' has no q= parameter")))?;
            (json!({}), Some(q.to_string()))
        }
        Some(raw) if raw.starts_with('{') => {
            let parsed: Value = serde_json::from_str(raw)
                .map_err(|err| ConnectorError::Read(format!("query is not valid JSON ({err}): {raw}")))?;
            match parsed {
                Value::Object(object) if object.contains_key("query") => (Value::Object(object), None),
                Value::Object(object) => (json!({ "query": object }), None),
                _ => return Err(ConnectorError::Read(format!("query must be a JSON object: {raw}"))),
            }
        }
        Some(other) => {
            return Err(ConnectorError::Read(format!(
                "query '{other}' is neither JSON nor a ?q= URI query"
            )));
        }
    };
    body["size"] = json!(size);
    if !fields.is_empty() {
        body["_source"] = json!(fields);
    }
    if with_version {
        body["version"] = json!(true);
    }
    Ok((body, uri_query))
}

/// 📦 How many pages heartbeats may queue before they stop renewing the cursor.
pub const PREFETCH_LIMIT: usize = 32;

#[derive(Debug)]
pub struct ScrollReader<T: Transport> {
    transport: Arc<T>,
    options: ReaderOptions,
    state: ScrollState,
    cursor: Option<ScrollCursor>,
    buffered: VecDeque<Vec<Value>>,
    documents: usize,
}

impl<T: Transport> ScrollReader<T> {
    pub fn new(transport: Arc<T>, options: ReaderOptions) -> Self {
        Self {
            transport,
            options,
            state: ScrollState::Uninitialized,
            cursor: None,
            buffered: VecDeque::new(),
            documents: 0,
        }
    }

    pub fn from_settings(settings: &Settings, transport: Arc<T>) -> Result<Self> {
        Ok(Self::new(transport, ReaderOptions::from_settings(settings)?))
    }

    pub fn state(&self) -> ScrollState {
        self.state
    }

    pub fn cursor(&self) -> Option<&ScrollCursor> {
        self.cursor.as_ref()
    }

    /// 🔢 documents handed out so far
    pub fn documents(&self) -> usize {
        self.documents
    }

    /// 🔍 Issue the initial search and take ownership of the cursor it returns.
    pub async fn open(&mut self) -> Result<()> {
        if self.state != ScrollState::Uninitialized {
            return Err(ConnectorError::Read(format!(
                "scroll reader already opened (state {:?})",
                self.state
            )));
        }
        let with_version = self.options.metadata.as_ref().is_some_and(|metadata| metadata.version);
        let (mut body, uri_query) = match build_search(
            self.options.query.as_deref(),
            self.options.size,
            &self.options.fields,
            with_version,
        ) {
            Ok(built) => built,
            Err(err) => {
                self.state = ScrollState::Failed;
                return Err(err);
            }
        };
        if let Some(slice) = self.options.slice {
            body["slice"] = json!({ "id": slice.id, "max": slice.max });
        }
        let request = SearchRequest {
            index: self.options.resource.index.clone(),
            doc_type: self.options.resource.doc_type.clone(),
            body,
            uri_query,
            keep_alive: self.options.keep_alive,
        };

        let reply = match self.transport.search(&request).await {
            Ok(reply) => reply,
            Err(err) => {
                self.state = ScrollState::Failed;
                return Err(err);
            }
        };
        if reply.status == 404 && reply.body.contains("index_not_found_exception") {
            if self.options.missing_as_empty {
                info!("📭 index '{}' is missing; reading it as empty", request.index);
                self.state = ScrollState::Exhausted;
                return Ok(());
            }
            self.state = ScrollState::Failed;
            return Err(ConnectorError::Read(format!(
                "index '{}' does not exist: {}",
                request.index, reply.body
            )));
        }

        let (scroll_id, page) = match self.parse_page(reply) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.state = ScrollState::Failed;
                return Err(err);
            }
        };
        match scroll_id {
            Some(id) => self.cursor = Some(ScrollCursor::new(id, self.options.keep_alive)),
            None if !page.is_empty() => {
                self.state = ScrollState::Failed;
                return Err(ConnectorError::Read(
                    "search answered with hits but no scroll id".to_string(),
                ));
            }
            None => {}
        }
        debug!(
            "🔍 scroll opened on '{}' with a first page of {} hits",
            request.index,
            page.len()
        );
        self.state = ScrollState::Active;
        self.buffered.push_back(page);
        Ok(())
    }

    /// 📜 The next page. Empty means the cursor is exhausted (and already cleared).
    pub async fn next(&mut self) -> Result<Vec<Value>> {
        match self.state {
            ScrollState::Uninitialized => self.open().await?,
            ScrollState::Exhausted => return Ok(Vec::new()),
            ScrollState::Failed => {
                return Err(ConnectorError::Read(
                    "scroll cursor failed earlier and cannot be reused".to_string(),
                ));
            }
            ScrollState::Active => {}
        }
        if self.state == ScrollState::Exhausted {
            return Ok(Vec::new());
        }
        let page = match self.buffered.pop_front() {
            Some(page) => page,
            None => self.fetch().await?,
        };
        if page.is_empty() {
            self.exhaust().await;
        } else {
            self.documents += page.len();
        }
        Ok(page)
    }

    /// 💓 Keep the cursor alive while the consumer is busy. Returns whether a renewal happened.
    ///
    /// Acts when a cursor is active and its remaining keep-alive is within the heartbeat lead.
    /// The renewal fetches the next page and queues it for `next`, so a consumer that stays busy
    /// through several keep-alives gets a renewal each time. Nothing happens once the queued
    /// pages already reach the end of the results, or once [`PREFETCH_LIMIT`] pages are waiting.
    pub async fn heartbeat(&mut self) -> Result<bool> {
        if self.state != ScrollState::Active {
            return Ok(false);
        }
        let Some(cursor) = &self.cursor else {
            return Ok(false);
        };
        if cursor.remaining() > self.options.heartbeat_lead {
            return Ok(false);
        }
        if self.buffered.back().is_some_and(Vec::is_empty) {
            return Ok(false);
        }
        if self.buffered.len() >= PREFETCH_LIMIT {
            warn!(
                "💓 {} pages already waiting on a busy consumer; letting the cursor age instead of \
                prefetching more",
                self.buffered.len()
            );
            return Ok(false);
        }
        debug!("💓 cursor within {:?} of expiry; prefetching to renew", self.options.heartbeat_lead);
        let page = self.fetch().await?;
        self.buffered.push_back(page);
        Ok(true)
    }

    /// 📦 pages fetched ahead of `next`
    pub fn prefetched(&self) -> usize {
        self.buffered.len()
    }

    /// 🗑️ Release the cursor early. Clearing failures are logged, never raised.
    pub async fn close(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.clear(&cursor.id).await;
        }
        self.buffered.clear();
        if self.state != ScrollState::Failed {
            self.state = ScrollState::Exhausted;
        }
    }

    async fn fetch(&mut self) -> Result<Vec<Value>> {
        let Some(cursor) = &self.cursor else {
            return Ok(Vec::new());
        };
        let outcome = match self.transport.scroll(&cursor.id, self.options.keep_alive).await {
            Ok(reply) => self.parse_page(reply),
            Err(err) => Err(err),
        };
        match outcome {
            Ok((scroll_id, page)) => {
                if let Some(cursor) = &mut self.cursor {
                    cursor.renew(scroll_id);
                }
                Ok(page)
            }
            Err(err) => {
                warn!("📜 scroll continuation failed: {err}");
                self.fail().await;
                Err(err)
            }
        }
    }

    fn parse_page(&self, reply: TransportReply) -> Result<(Option<String>, Vec<Value>)> {
        if !reply.is_success() {
            return Err(ConnectorError::Read(format!(
                "search answered {}: {}",
                reply.status, reply.body
            )));
        }
        let response: SearchResponse = serde_json::from_str(&reply.body)?;
        let page = response
            .hits
            .hits
            .into_iter()
            .map(|hit| self.convert(hit))
            .collect();
        Ok((response.scroll_id, page))
    }

    /// 🔄 hit → document: `_source`, empty strings as null, optional metadata object
    fn convert(&self, hit: Value) -> Value {
        let Value::Object(mut hit) = hit else {
            return hit;
        };
        let mut document = match hit.remove("_source") {
            Some(Value::Object(source)) => source,
            Some(other) => {
                let mut wrapped = Map::new();
                wrapped.insert("value".to_string(), other);
                wrapped
            }
            None => Map::new(),
        };
        if self.options.empty_as_null {
            for value in document.values_mut() {
                empty_to_null(value);
            }
        }
        if let Some(metadata) = &self.options.metadata {
            let mut meta = Map::new();
            for key in ["_index", "_type", "_id", "_score"] {
                if let Some(value) = hit.remove(key) {
                    meta.insert(key.to_string(), value);
                }
            }
            if metadata.version {
                if let Some(version) = hit.remove("_version") {
                    meta.insert("_version".to_string(), version);
                }
            }
            document.insert(metadata.field.clone(), Value::Object(meta));
        }
        Value::Object(document)
    }

    async fn exhaust(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.clear(&cursor.id).await;
        }
        debug!("📭 scroll exhausted after {} documents", self.documents);
        self.state = ScrollState::Exhausted;
    }

    async fn fail(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.clear(&cursor.id).await;
        }
        self.buffered.clear();
        self.state = ScrollState::Failed;
    }

    async fn clear(&self, scroll_id: &str) {
        match self.transport.clear_scroll(scroll_id).await {
            Ok(reply) if reply.is_success() => debug!("🗑️ scroll cursor cleared"),
            Ok(reply) => warn!("🗑️ clearing scroll cursor answered {}: {}", reply.status, reply.body),
            Err(err) => warn!("🗑️ clearing scroll cursor failed: {err}"),
        }
    }
}

fn empty_to_null(value: &mut Value) {
    match value {
        Value::String(text) if text.is_empty() => *value = Value::Null,
        Value::Object(object) => object.values_mut().for_each(empty_to_null),
        Value::Array(items) => items.iter_mut().for_each(empty_to_null),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::keys;
    use crate::transport::{InMemoryCluster, RecordedRequest};

    async fn reader(cluster: &InMemoryCluster, pairs: &[(&str, &str)]) -> Result<ScrollReader<InMemoryCluster>> {
        ScrollReader::from_settings(&Settings::from_pairs(pairs.iter().copied()), Arc::new(cluster.clone()))
    }

    #[tokio::test]
    async fn the_one_where_120_documents_come_in_50_50_20_then_nothing() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.seed("books", (0..120).map(|n| json!({ "n": n }))).await;
        let mut reader = reader(&cluster, &[(keys::RESOURCE_READ, "books"), (keys::SCROLL_SIZE, "50")]).await?;
        reader.open().await?;
        assert_eq!(reader.state(), ScrollState::Active);
        let sizes = [
            reader.next().await?.len(),
            reader.next().await?.len(),
            reader.next().await?.len(),
            reader.next().await?.len(),
        ];
        assert_eq!(sizes, [50, 50, 20, 0]);
        assert_eq!(reader.state(), ScrollState::Exhausted);
        assert_eq!(reader.documents(), 120);
        assert_eq!(cluster.open_scrolls().await, 0, "exhausted cursors are cleared");
        assert!(reader.next().await?.is_empty(), "exhausted stays exhausted");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_three_slices_split_the_index_without_overlap() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.seed("books", (0..10).map(|n| json!({ "n": n }))).await;
        let settings = Settings::from_pairs([(keys::RESOURCE_READ, "books"), (keys::SCROLL_SIZE, "4")]);
        let mut seen = Vec::new();
        for id in 0..3 {
            let options = ReaderOptions::from_settings(&settings)?.with_slice(id, 3);
            let mut reader = ScrollReader::new(Arc::new(cluster.clone()), options);
            loop {
                let page = reader.next().await?;
                if page.is_empty() {
                    break;
                }
                seen.extend(page.into_iter().filter_map(|doc| doc["n"].as_u64()));
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<u64>>());
        let searches: Vec<Value> = cluster
            .requests()
            .await
            .into_iter()
            .filter_map(|request| match request {
                RecordedRequest::Search { body, .. } => Some(body),
                _ => None,
            })
            .collect();
        assert_eq!(searches[2]["slice"], json!({"id": 2, "max": 3}));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_index_reads_as_empty_only_when_asked() -> Result<()> {
        let cluster = InMemoryCluster::new();
        let mut lenient = reader(
            &cluster,
            &[(keys::RESOURCE_READ, "ghost"), (keys::INDEX_READ_MISSING_AS_EMPTY, "yes")],
        )
        .await?;
        lenient.open().await?;
        assert_eq!(lenient.state(), ScrollState::Exhausted);
        assert!(lenient.next().await?.is_empty());

        let mut strict = reader(&cluster, &[(keys::RESOURCE_READ, "ghost")]).await?;
        assert!(matches!(strict.open().await, Err(ConnectorError::Read(_))));
        assert_eq!(strict.state(), ScrollState::Failed);
        assert!(strict.next().await.is_err(), "a failed cursor is never reused");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_metadata_and_empty_strings_get_converted() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.seed("people", [json!({"name": "", "nested": {"nick": ""}, "age": 3})]).await;
        let mut reader = reader(
            &cluster,
            &[
                (keys::RESOURCE_READ, "people"),
                (keys::READ_METADATA, "true"),
                (keys::READ_METADATA_VERSION, "true"),
                (keys::READ_METADATA_FIELD, "_meta"),
            ],
        )
        .await?;
        let page = reader.next().await?;
        let document = &page[0];
        assert_eq!(document["name"], Value::Null);
        assert_eq!(document["nested"]["nick"], Value::Null);
        assert_eq!(document["age"], 3);
        assert_eq!(document["_meta"]["_index"], "people");
        assert_eq!(document["_meta"]["_id"], "00000000");
        assert_eq!(document["_meta"]["_version"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_heartbeat_prefetches_without_losing_a_page() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.seed("logs", (0..4).map(|n| json!({ "n": n }))).await;
        let mut reader = reader(
            &cluster,
            &[
                (keys::RESOURCE_READ, "logs"),
                (keys::SCROLL_SIZE, "2"),
                (keys::SCROLL_KEEPALIVE, "10s"),
                (keys::HEART_BEAT_LEAD, "1m"),
            ],
        )
        .await?;
        reader.open().await?;
        let first = reader.next().await?;
        assert!(reader.heartbeat().await?, "lead exceeds keep-alive, so renew now");
        let second = reader.next().await?;
        assert_eq!(first[0]["n"], 0);
        assert_eq!(second[0]["n"], 2);
        assert!(reader.next().await?.is_empty());
        let scrolls = cluster
            .requests()
            .await
            .into_iter()
            .filter(|request| matches!(request, RecordedRequest::Scroll { .. }))
            .count();
        assert_eq!(scrolls, 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_long_stall_keeps_renewing_the_cursor() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.seed("logs", (0..20).map(|n| json!({ "n": n }))).await;
        let mut reader = reader(
            &cluster,
            &[
                (keys::RESOURCE_READ, "logs"),
                (keys::SCROLL_SIZE, "2"),
                (keys::SCROLL_KEEPALIVE, "100ms"),
                (keys::HEART_BEAT_LEAD, "80ms"),
            ],
        )
        .await?;
        reader.open().await?;

        // -- five heartbeats spread over more than two keep-alives, consumer nowhere in sight
        for beat in 0..5 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            assert!(reader.heartbeat().await?, "heartbeat {beat} should have renewed");
        }
        assert_eq!(reader.prefetched(), 6);
        let cursor = reader.cursor().expect("💀 the cursor should still be held");
        assert!(cursor.remaining() > Duration::ZERO);

        let mut seen = Vec::new();
        loop {
            let page = reader.next().await?;
            if page.is_empty() {
                break;
            }
            seen.extend(page.iter().map(|doc| doc["n"].as_i64().unwrap_or(-1)));
        }
        assert_eq!(seen, (0..20).collect::<Vec<i64>>());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_heartbeats_stop_at_the_end_of_the_results() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.seed("tiny", (0..2).map(|n| json!({ "n": n }))).await;
        let mut reader = reader(
            &cluster,
            &[
                (keys::RESOURCE_READ, "tiny"),
                (keys::SCROLL_SIZE, "2"),
                (keys::SCROLL_KEEPALIVE, "10s"),
                (keys::HEART_BEAT_LEAD, "1m"),
            ],
        )
        .await?;
        reader.open().await?;
        assert!(reader.heartbeat().await?, "fetches the empty page behind the first one");
        assert!(!reader.heartbeat().await?, "nothing left to renew for");
        assert_eq!(reader.next().await?.len(), 2);
        assert!(reader.next().await?.is_empty());
        assert_eq!(reader.state(), ScrollState::Exhausted);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_close_releases_the_cursor_early() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.seed("big", (0..10).map(|n| json!({ "n": n }))).await;
        let mut reader = reader(&cluster, &[(keys::RESOURCE_READ, "big"), (keys::SCROLL_SIZE, "3")]).await?;
        reader.next().await?;
        assert_eq!(cluster.open_scrolls().await, 1);
        reader.close().await;
        assert_eq!(cluster.open_scrolls().await, 0);
        assert_eq!(reader.state(), ScrollState::Exhausted);
        Ok(())
    }

    #[test]
    fn the_one_where_every_query_costume_is_recognised() -> Result<()> {
        let fields = vec!["title".to_string()];
        let (body, q) = build_search(None, 10, &[], false)?;
        assert_eq!(body, json!({"query": {"match_all": {}}, "size": 10}));
        assert_eq!(q, None);

        let (body, q) = build_search(Some("?q=title:rust"), 5, &fields, false)?;
        assert_eq!(body, json!({"size": 5, "_source": ["title"]}));
        assert_eq!(q.as_deref(), Some("title:rust"));

        let (body, _) = build_search(Some(r#"{"match":{"title":"rust"}}"#), 5, &[], true)?;
        assert_eq!(body["query"], json!({"match": {"title": "rust"}}));
        assert_eq!(body["version"], true);

        let (body, _) = build_search(Some(r#"{"query":{"term":{"a":1}},"sort":["_doc"]}"#), 5, &[], false)?;
        assert_eq!(body["sort"], json!(["_doc"]));

        assert!(build_search(Some("title:rust"), 5, &[], false).is_err());
        assert!(build_search(Some("{broken"), 5, &[], false).is_err());
        assert!(build_search(Some("?size=3"), 5, &[], false).is_err());
        Ok(())
    }
}
