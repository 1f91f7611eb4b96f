//! 🧪 An entire search cluster in a `Mutex`. No JVM was harmed.
//!
//! 🎬 *[the CI runner has no network. the CI runner has no Docker. the CI runner has a dream.]*
//!
//! `InMemoryCluster` speaks just enough of the bulk and scroll protocol for the pipelines to
//! not notice they are talking to a `BTreeMap`:
//! - `_bulk` parses the NDJSON, applies index/create/update/delete to per-index documents,
//!   and answers with a per-item `items` array, exactly like the real thing;
//! - searches open scroll contexts that page through a snapshot of the index;
//! - every request is logged so tests can count submissions.
//!
//! 🎭 Scripting: tests queue per-item statuses (`script_bulk_statuses`) or whole-request
//! statuses (`script_request_status`) to stage 429 storms and version conflicts.
//! The script is consumed one bulk request at a time. Unscripted requests behave naturally.
//!
//! ⚠️ Queries are not evaluated. Every search is a match_all. The duck approves. 🦆

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use super::{SearchRequest, Transport, TransportReply};
use crate::error::Result;

/// 📜 What the cluster was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    Bulk { entries: usize },
    Refresh { index: String },
    IndexExists { index: String },
    Search { index: String, body: Value },
    Scroll { scroll_id: String },
    ClearScroll { scroll_id: String },
}

#[derive(Debug, Clone)]
struct StoredDocument {
    source: Value,
    version: u64,
}

#[derive(Debug)]
struct ScrollContext {
    index: String,
    hits: VecDeque<Value>,
    page_size: usize,
}

#[derive(Debug, Default)]
struct ClusterState {
    indices: BTreeMap<String, BTreeMap<String, StoredDocument>>,
    scripted_items: VecDeque<Vec<u16>>,
    scripted_requests: VecDeque<u16>,
    scrolls: BTreeMap<String, ScrollContext>,
    requests: Vec<RecordedRequest>,
    next_auto_id: u64,
    next_scroll_id: u64,
    refresh_status: Option<u16>,
}

/// 🏠 The cluster. Clones share state, so a test can keep one handle and give another away.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📂 Create an (empty) index so existence checks and searches find it.
    pub async fn create_index(&self, index: &str) {
        self.state
            .lock()
            .await
            .indices
            .entry(index.to_string())
            .or_default();
    }

    /// 📥 Seed documents directly, bypassing `_bulk`. Ids are `"0"`, `"1"`, ... in order.
    pub async fn seed<I>(&self, index: &str, documents: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let mut state = self.state.lock().await;
        let target = state.indices.entry(index.to_string()).or_default();
        let offset = target.len();
        for (position, source) in documents.into_iter().enumerate() {
            target.insert(
                format!("{:08}", offset + position),
                StoredDocument { source, version: 1 },
            );
        }
    }

    /// 🎭 Queue per-item statuses for the next bulk request. Items beyond the list (or a
    /// status of 0) are processed naturally.
    pub async fn script_bulk_statuses(&self, statuses: Vec<u16>) {
        self.state.lock().await.scripted_items.push_back(statuses);
    }

    /// 🎭 Queue a whole-request status for the next bulk request (e.g. 429 for the lot).
    pub async fn script_request_status(&self, status: u16) {
        self.state.lock().await.scripted_requests.push_back(status);
    }

    /// 🎭 Make every refresh answer with this status.
    pub async fn script_refresh_status(&self, status: u16) {
        self.state.lock().await.refresh_status = Some(status);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().await.requests.clone()
    }

    /// 🔢 how many `_bulk` requests arrived
    pub async fn bulk_submissions(&self) -> usize {
        self.state
            .lock()
            .await
            .requests
            .iter()
            .filter(|request| matches!(request, RecordedRequest::Bulk { .. }))
            .count()
    }

    pub async fn document(&self, index: &str, id: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state
            .indices
            .get(index)
            .and_then(|documents| documents.get(id))
            .map(|stored| stored.source.clone())
    }

    pub async fn count(&self, index: &str) -> usize {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// 🔢 scroll contexts still open server-side
    pub async fn open_scrolls(&self) -> usize {
        self.state.lock().await.scrolls.len()
    }
}

impl ClusterState {
    fn apply_bulk(&mut self, payload: &str) -> TransportReply {
        let mut lines = payload.lines().filter(|line| !line.trim().is_empty());
        let mut parsed = Vec::new();
        while let Some(action_line) = lines.next() {
            let Ok(Value::Object(action)) = serde_json::from_str::<Value>(action_line) else {
                return error_reply(400, "parse_exception", "malformed action line");
            };
            let Some((name, meta)) = action.into_iter().next() else {
                return error_reply(400, "action_request_validation_exception", "empty action");
            };
            let document = if name == "delete" {
                None
            } else {
                match lines.next().map(serde_json::from_str::<Value>) {
                    Some(Ok(document)) => Some(document),
                    _ => return error_reply(400, "parse_exception", "missing or malformed document line"),
                }
            };
            parsed.push((name, meta, document));
        }

        self.requests.push(RecordedRequest::Bulk {
            entries: parsed.len(),
        });
        if let Some(status) = self.scripted_requests.pop_front() {
            return error_reply(status, "scripted_request_failure", "scripted whole-request status");
        }
        let scripted = self.scripted_items.pop_front().unwrap_or_default();

        let mut errors = false;
        let items: Vec<Value> = parsed
            .into_iter()
            .enumerate()
            .map(|(position, (name, meta, document))| {
                let index = meta["_index"].as_str().unwrap_or("_unknown").to_string();
                let id = meta["_id"].as_str().map(str::to_string);
                let (status, error) = match scripted.get(position).copied().filter(|status| *status != 0) {
                    Some(status) if (200..300).contains(&status) => (status, None),
                    Some(status) => (status, Some(scripted_error(status))),
                    None => self.apply_item(&name, &index, id.as_deref(), document),
                };
                errors |= error.is_some();
                let mut item = json!({ "_index": index, "status": status });
                if let Some(id) = id {
                    item["_id"] = Value::String(id);
                }
                if let Some(error) = error {
                    item["error"] = error;
                }
                let mut wrapped = Map::new();
                wrapped.insert(name, item);
                Value::Object(wrapped)
            })
            .collect();

        TransportReply::new(
            200,
            json!({ "took": 1, "errors": errors, "items": items }).to_string(),
        )
    }

    fn apply_item(
        &mut self,
        action: &str,
        index: &str,
        id: Option<&str>,
        document: Option<Value>,
    ) -> (u16, Option<Value>) {
        let id = match id {
            Some(id) => id.to_string(),
            None => {
                self.next_auto_id += 1;
                format!("auto-{}", self.next_auto_id)
            }
        };
        let documents = self.indices.entry(index.to_string()).or_default();
        let existing = documents.get(&id).cloned();
        match (action, existing) {
            ("index", existing) => {
                let version = existing.map(|stored| stored.version + 1).unwrap_or(1);
                documents.insert(
                    id,
                    StoredDocument {
                        source: document.unwrap_or(Value::Null),
                        version,
                    },
                );
                (if version == 1 { 201 } else { 200 }, None)
            }
            ("create", Some(_)) => (409, Some(scripted_error(409))),
            ("create", None) => {
                documents.insert(
                    id,
                    StoredDocument {
                        source: document.unwrap_or(Value::Null),
                        version: 1,
                    },
                );
                (201, None)
            }
            ("update", existing) => {
                let body = document.unwrap_or(Value::Null);
                match existing {
                    Some(stored) => {
                        let mut source = stored.source;
                        if let (Some(target), Some(Value::Object(patch))) =
                            (source.as_object_mut(), body.get("doc"))
                        {
                            merge(target, patch);
                        }
                        documents.insert(
                            id,
                            StoredDocument {
                                source,
                                version: stored.version + 1,
                            },
                        );
                        (200, None)
                    }
                    None => {
                        let fresh = if body["doc_as_upsert"].as_bool() == Some(true) {
                            body.get("doc").cloned()
                        } else {
                            body.get("upsert").cloned()
                        };
                        match fresh {
                            Some(source) => {
                                documents.insert(id, StoredDocument { source, version: 1 });
                                (201, None)
                            }
                            None => (
                                404,
                                Some(json!({
                                    "type": "document_missing_exception",
                                    "reason": format!("[{id}]: document missing"),
                                })),
                            ),
                        }
                    }
                }
            }
            ("delete", Some(_)) => {
                documents.remove(&id);
                (200, None)
            }
            ("delete", None) => (404, None),
            (other, _) => (
                400,
                Some(json!({
                    "type": "illegal_argument_exception",
                    "reason": format!("unknown action [{other}]"),
                })),
            ),
        }
    }

    fn next_page(&mut self, scroll_id: &str) -> Option<TransportReply> {
        let context = self.scrolls.get_mut(scroll_id)?;
        let take = context.page_size.min(context.hits.len());
        let hits: Vec<Value> = context.hits.drain(..take).collect();
        let total = hits.len();
        Some(TransportReply::new(
            200,
            json!({
                "_scroll_id": scroll_id,
                "took": 1,
                "timed_out": false,
                "hits": { "total": { "value": total }, "hits": hits },
            })
            .to_string(),
        ))
    }
}

fn merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

fn scripted_error(status: u16) -> Value {
    let (kind, reason) = match status {
        409 => ("version_conflict_engine_exception", "version conflict, document already exists"),
        429 => ("es_rejected_execution_exception", "rejected execution: queue capacity reached"),
        503 => ("unavailable_shards_exception", "primary shard is not active"),
        400 => ("mapper_parsing_exception", "failed to parse field"),
        404 => ("document_missing_exception", "document missing"),
        _ => ("scripted_failure", "scripted item failure"),
    };
    json!({ "type": kind, "reason": reason })
}

fn error_reply(status: u16, kind: &str, reason: &str) -> TransportReply {
    TransportReply::new(
        status,
        json!({ "error": { "type": kind, "reason": reason }, "status": status }).to_string(),
    )
}

fn project(source: &Value, fields: &Value) -> Value {
    let Some(fields) = fields.as_array() else {
        return source.clone();
    };
    let mut projected = Map::new();
    for field in fields.iter().filter_map(Value::as_str) {
        if let Some(value) = source.get(field) {
            projected.insert(field.to_string(), value.clone());
        }
    }
    Value::Object(projected)
}

#[async_trait]
impl Transport for InMemoryCluster {
    async fn bulk(&self, payload: String) -> Result<TransportReply> {
        Ok(self.state.lock().await.apply_bulk(&payload))
    }

    async fn refresh(&self, index: &str) -> Result<TransportReply> {
        let mut state = self.state.lock().await;
        state.requests.push(RecordedRequest::Refresh {
            index: index.to_string(),
        });
        let status = state.refresh_status.unwrap_or(200);
        Ok(TransportReply::new(status, r#"{"_shards":{"total":1,"successful":1,"failed":0}}"#))
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.requests.push(RecordedRequest::IndexExists {
            index: index.to_string(),
        });
        Ok(state.indices.contains_key(index))
    }

    async fn search(&self, request: &SearchRequest) -> Result<TransportReply> {
        let mut state = self.state.lock().await;
        state.requests.push(RecordedRequest::Search {
            index: request.index.clone(),
            body: request.body.clone(),
        });
        let Some(documents) = state.indices.get(&request.index) else {
            return Ok(error_reply(
                404,
                "index_not_found_exception",
                &format!("no such index [{}]", request.index),
            ));
        };
        let fields = request.body.get("_source").cloned().unwrap_or(Value::Null);
        let slice = request.body.get("slice").and_then(|slice| {
            Some((slice.get("id")?.as_u64()?, slice.get("max")?.as_u64()?.max(1)))
        });
        let hits: VecDeque<Value> = documents
            .iter()
            .enumerate()
            .filter(|(position, _)| {
                slice.is_none_or(|(id, max)| *position as u64 % max == id)
            })
            .map(|(_, (id, stored))| {
                json!({
                    "_index": request.index,
                    "_type": request.doc_type.clone().unwrap_or_else(|| "_doc".to_string()),
                    "_id": id,
                    "_score": 1.0,
                    "_version": stored.version,
                    "_source": project(&stored.source, &fields),
                })
            })
            .collect();
        let page_size = request.body["size"].as_u64().unwrap_or(10).max(1) as usize;
        state.next_scroll_id += 1;
        let scroll_id = format!("scroll-{}", state.next_scroll_id);
        state.scrolls.insert(
            scroll_id.clone(),
            ScrollContext {
                index: request.index.clone(),
                hits,
                page_size,
            },
        );
        Ok(state
            .next_page(&scroll_id)
            .unwrap_or_else(|| error_reply(500, "illegal_state_exception", "scroll vanished")))
    }

    async fn scroll(&self, scroll_id: &str, _keep_alive: Duration) -> Result<TransportReply> {
        let mut state = self.state.lock().await;
        state.requests.push(RecordedRequest::Scroll {
            scroll_id: scroll_id.to_string(),
        });
        Ok(state.next_page(scroll_id).unwrap_or_else(|| {
            error_reply(
                404,
                "search_context_missing_exception",
                &format!("no search context found for id [{scroll_id}]"),
            )
        }))
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<TransportReply> {
        let mut state = self.state.lock().await;
        state.requests.push(RecordedRequest::ClearScroll {
            scroll_id: scroll_id.to_string(),
        });
        let freed = state.scrolls.remove(scroll_id).map(|context| context.index);
        Ok(TransportReply::new(
            if freed.is_some() { 200 } else { 404 },
            json!({ "succeeded": freed.is_some(), "num_freed": usize::from(freed.is_some()) }).to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_bulk_answers_item_by_item() -> Result<()> {
        let cluster = InMemoryCluster::new();
        let payload = concat!(
            r#"{"index":{"_index":"people","_id":"1"}}"#, "\n",
            r#"{"name":"ada"}"#, "\n",
            r#"{"create":{"_index":"people","_id":"1"}}"#, "\n",
            r#"{"name":"ada again"}"#, "\n",
            r#"{"delete":{"_index":"people","_id":"404"}}"#, "\n",
        );
        let reply = cluster.bulk(payload.to_string()).await?;
        let body: Value = serde_json::from_str(&reply.body)?;
        assert_eq!(body["errors"], true);
        assert_eq!(body["items"][0]["index"]["status"], 201);
        assert_eq!(body["items"][1]["create"]["status"], 409);
        assert_eq!(body["items"][2]["delete"]["status"], 404);
        assert_eq!(cluster.document("people", "1").await, Some(json!({"name": "ada"})));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_script_overrides_nature_once() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.script_bulk_statuses(vec![0, 429]).await;
        let payload = concat!(
            r#"{"index":{"_index":"i","_id":"a"}}"#, "\n", "{}\n",
            r#"{"index":{"_index":"i","_id":"b"}}"#, "\n", "{}\n",
        );
        let first: Value = serde_json::from_str(&cluster.bulk(payload.to_string()).await?.body)?;
        assert_eq!(first["items"][0]["index"]["status"], 201);
        assert_eq!(first["items"][1]["index"]["status"], 429);
        let second: Value = serde_json::from_str(&cluster.bulk(payload.to_string()).await?.body)?;
        assert_eq!(second["errors"], false);
        assert_eq!(cluster.bulk_submissions().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_index_is_a_404() -> Result<()> {
        let cluster = InMemoryCluster::new();
        let reply = cluster
            .search(&SearchRequest {
                index: "ghost".to_string(),
                doc_type: None,
                body: json!({"size": 5}),
                uri_query: None,
                keep_alive: Duration::from_secs(60),
            })
            .await?;
        assert_eq!(reply.status, 404);
        assert!(reply.body.contains("index_not_found_exception"));
        Ok(())
    }
}
