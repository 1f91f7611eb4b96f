//! 📬 Reading the bulk verdict, one item at a time.
//!
//! The service answers a bulk request with a list of items in submission order. Each item has
//! a status and, when it failed, an `error` object with a `type` and a `reason`. This module
//! turns that list into a [`Verdict`] per entry. Nothing here sleeps or resubmits.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConnectorError, Result};
use crate::settings::WriteOperation;

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// 📋 One item's raw outcome, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub status: u16,
    pub error_type: Option<String>,
    pub reason: Option<String>,
}

/// ⚖️ What to do with an entry after reading its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// 🤷 a create that found the document already there, with ignore-existing on
    Ignored,
    /// 🔁 a version conflict on update/upsert with conflict budget left
    ConflictRetry,
    /// ⏳ rejected under load; resubmit per policy
    Retryable,
    Terminal { error_type: String, reason: String },
}

/// 🧮 Parse the per-item list. The item count must match what was sent.
pub fn parse_items(body: &str, expected: usize) -> Result<Vec<ItemOutcome>> {
    let response: BulkResponse = serde_json::from_str(body)?;
    if response.items.len() != expected {
        return Err(ConnectorError::BulkRejected {
            status: 200,
            body: format!(
                "response carried {} items for {expected} submitted entries",
                response.items.len()
            ),
        });
    }
    Ok(response
        .items
        .into_iter()
        .map(|item| {
            let item = item.into_values().next();
            let status = item.as_ref().map_or(0, |item| item.status);
            let error = item.and_then(|item| item.error);
            let (error_type, reason) = match error {
                Some(Value::Object(error)) => (
                    error.get("type").and_then(Value::as_str).map(str::to_string),
                    error.get("reason").and_then(Value::as_str).map(str::to_string),
                ),
                Some(Value::String(text)) => (None, Some(text)),
                _ => (None, None),
            };
            ItemOutcome {
                status,
                error_type,
                reason,
            }
        })
        .collect())
}

/// 🚦 Whole-request statuses that mean "everything in here may be retried".
pub fn is_retryable_request_status(status: u16) -> bool {
    matches!(status, 429 | 503)
}

/// ⚖️ Classify one outcome for the given operation.
pub fn classify(
    operation: WriteOperation,
    outcome: &ItemOutcome,
    ignore_existing: bool,
    conflict_budget_left: bool,
) -> Verdict {
    let status = outcome.status;
    if (200..300).contains(&status) {
        return Verdict::Success;
    }
    match (operation, status) {
        (WriteOperation::Create, 409) if ignore_existing => Verdict::Ignored,
        (WriteOperation::Update | WriteOperation::Upsert, 409) if conflict_budget_left => {
            Verdict::ConflictRetry
        }
        (WriteOperation::Delete, 404) => Verdict::Success,
        (_, 429 | 503) => Verdict::Retryable,
        _ if outcome.error_type.as_deref() == Some("es_rejected_execution_exception") => {
            Verdict::Retryable
        }
        _ => Verdict::Terminal {
            error_type: outcome
                .error_type
                .clone()
                .unwrap_or_else(|| format!("http_{status}")),
            reason: outcome
                .reason
                .clone()
                .unwrap_or_else(|| "no reason given".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: u16, error_type: Option<&str>) -> ItemOutcome {
        ItemOutcome {
            status,
            error_type: error_type.map(str::to_string),
            reason: error_type.map(|_| "because".to_string()),
        }
    }

    #[test]
    fn the_one_where_items_come_back_in_order() -> Result<()> {
        let body = r#"{"took":3,"errors":true,"items":[
            {"index":{"_id":"1","status":201}},
            {"index":{"_id":"2","status":429,"error":{"type":"es_rejected_execution_exception","reason":"busy"}}},
            {"index":{"_id":"3","status":400,"error":{"type":"mapper_parsing_exception","reason":"bad field"}}}
        ]}"#;
        let items = parse_items(body, 3)?;
        assert_eq!(items[0].status, 201);
        assert_eq!(items[1].error_type.as_deref(), Some("es_rejected_execution_exception"));
        assert_eq!(items[2].reason.as_deref(), Some("bad field"));
        Ok(())
    }

    #[test]
    fn the_one_where_a_short_item_list_is_a_protocol_problem() {
        let body = r#"{"errors":false,"items":[{"index":{"status":201}}]}"#;
        assert!(matches!(
            parse_items(body, 2),
            Err(ConnectorError::BulkRejected { .. })
        ));
    }

    #[test]
    fn the_one_where_each_status_lands_in_its_drawer() {
        use WriteOperation::*;
        assert_eq!(classify(Index, &outcome(201, None), false, false), Verdict::Success);
        assert_eq!(classify(Create, &outcome(409, Some("conflict")), true, false), Verdict::Ignored);
        assert!(matches!(
            classify(Create, &outcome(409, Some("conflict")), false, false),
            Verdict::Terminal { .. }
        ));
        assert_eq!(classify(Update, &outcome(409, None), false, true), Verdict::ConflictRetry);
        assert!(matches!(classify(Upsert, &outcome(409, None), false, false), Verdict::Terminal { .. }));
        assert_eq!(classify(Delete, &outcome(404, None), false, false), Verdict::Success);
        assert_eq!(classify(Index, &outcome(429, None), false, false), Verdict::Retryable);
        assert_eq!(classify(Index, &outcome(503, None), false, false), Verdict::Retryable);
        assert_eq!(
            classify(Index, &outcome(500, Some("es_rejected_execution_exception")), false, false),
            Verdict::Retryable
        );
        assert_eq!(
            classify(Index, &outcome(400, Some("mapper_parsing_exception")), false, false),
            Verdict::Terminal {
                error_type: "mapper_parsing_exception".to_string(),
                reason: "because".to_string()
            }
        );
    }
}
