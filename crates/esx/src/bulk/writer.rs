//! 🔄 The retrying bulk writer: submit, read the verdicts, resubmit only what deserves it.
//!
//! 🎬 *[1000 entries go out. 990 come back 201. 8 come back 429. 2 come back 400.]*
//! *[the 990 are done. the 2 are terminal, logged, and never spoken of again.]*
//! *[the 8 wait ten seconds and try again, alone, in a much smaller payload.]*
//!
//! Two loops, nested, both bounded:
//! - 🔁 inner: update/upsert version conflicts are resubmitted immediately while the entry's
//!   conflict budget lasts. This loop settles completely before anything is classified for
//!   the outer loop.
//! - ⏳ outer: entries rejected under load (429, 503, `es_rejected_execution_exception`, or a
//!   whole-request 429/503) wait the policy's fixed interval and go again. Policy `none`
//!   makes them terminal on the spot. Policy `simple(N)` allows exactly N resubmission rounds.
//!
//! 🛑 The wait races a `CancellationToken`. Cancelled between attempts means committed
//! entries stay committed and the caller hears `Cancelled`, not "failed".
//!
//! 🔄 A successful batch may trigger an index refresh. It runs detached; a failed refresh is
//! a warning and nothing more. `close()` waits for the stragglers.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::batch::Batch;
use super::command::BulkEntry;
use super::response::{Verdict, classify, is_retryable_request_status, parse_items};
use crate::error::{ConnectorError, EntryFailure, FailureKind, Result};
use crate::settings::{RetryPolicy, Settings, WriteOperation};
use crate::transport::Transport;

/// ⚙️ Knobs, resolved once from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    pub operation: WriteOperation,
    pub policy: RetryPolicy,
    pub retry_on_conflict: u32,
    pub ignore_existing: bool,
    pub refresh: bool,
}

impl WriterOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            operation: settings.write_operation()?,
            policy: settings.retry_policy()?,
            retry_on_conflict: settings.update_retry_on_conflict()?,
            ignore_existing: settings.batch_write_ignore_existing()?,
            refresh: settings.batch_write_refresh()?,
        })
    }
}

/// 📊 What happened to one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub entries: usize,
    pub succeeded: usize,
    pub ignored: usize,
    /// 📡 bulk requests sent for this batch, conflict resubmissions included
    pub submissions: u32,
    /// 🔁 entries resubmitted by either loop, counted once per resubmission
    pub resubmitted: usize,
    pub bytes: usize,
    pub failures: Vec<EntryFailure>,
}

impl WriteReport {
    pub fn committed(&self) -> usize {
        self.succeeded + self.ignored
    }
}

#[derive(Debug)]
pub struct RetryingBulkWriter<T: Transport + 'static> {
    transport: Arc<T>,
    options: WriterOptions,
    cancel: CancellationToken,
    refreshes: Vec<JoinHandle<()>>,
}

impl<T: Transport + 'static> RetryingBulkWriter<T> {
    pub fn new(transport: Arc<T>, options: WriterOptions, cancel: CancellationToken) -> Self {
        Self {
            transport,
            options,
            cancel,
            refreshes: Vec::new(),
        }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// 🚀 Write one batch to completion, exhaustion, or cancellation.
    ///
    /// `committed_before` only feeds the `Cancelled` report so the caller sees a task-wide count.
    /// Terminal per-entry failures come back in the report; exhausted retries are an error.
    pub async fn write(&mut self, batch: Batch, committed_before: usize) -> Result<WriteReport> {
        let entries = batch.into_entries();
        let mut report = WriteReport {
            entries: entries.len(),
            ..WriteReport::default()
        };
        if entries.is_empty() {
            return Ok(report);
        }
        let mut conflict_budget = vec![self.options.retry_on_conflict; entries.len()];
        let mut pending: Vec<usize> = (0..entries.len()).collect();
        let mut rounds_used = 0u32;
        let mut refresh_targets = BTreeSet::new();

        loop {
            // -- 🔁 inner loop: settle conflicts before anything is judged retryable
            let mut retryable: Vec<(usize, u16)> = Vec::new();
            let mut to_send = pending;
            loop {
                if self.cancel.is_cancelled() {
                    return Err(self.cancelled(committed_before, &report));
                }
                let mut conflicts = Vec::new();
                for (position, status, verdict) in self.submit(&entries, &to_send, &conflict_budget, &mut report).await? {
                    match verdict {
                        Verdict::Success => {
                            report.succeeded += 1;
                            refresh_targets.insert(entries[position].index().to_string());
                        }
                        Verdict::Ignored => report.ignored += 1,
                        Verdict::ConflictRetry => {
                            conflict_budget[position] -= 1;
                            conflicts.push(position);
                        }
                        Verdict::Retryable => retryable.push((position, status)),
                        Verdict::Terminal { error_type, reason } => {
                            warn!(
                                "🪦 entry #{position} (id: {}) failed for good with {status}: {error_type}: {reason}",
                                entries[position].id().unwrap_or("<auto>")
                            );
                            report.failures.push(failure(&entries[position], position, status, FailureKind::Terminal {
                                error_type,
                                reason,
                            }));
                        }
                    }
                }
                if conflicts.is_empty() {
                    break;
                }
                debug!("🔁 resubmitting {} conflicting entries", conflicts.len());
                report.resubmitted += conflicts.len();
                to_send = conflicts;
            }

            if retryable.is_empty() {
                break;
            }

            match self.options.policy {
                RetryPolicy::None => {
                    warn!(
                        "🚫 {} entries were rejected under load and the retry policy is 'none'",
                        retryable.len()
                    );
                    for (position, status) in retryable {
                        report.failures.push(failure(&entries[position], position, status, FailureKind::RetryDisabled));
                    }
                    break;
                }
                RetryPolicy::Simple { max_retries, wait } => {
                    if rounds_used >= max_retries {
                        let mut failures = std::mem::take(&mut report.failures);
                        failures.extend(retryable.into_iter().map(|(position, status)| {
                            failure(&entries[position], position, status, FailureKind::RetriesExhausted)
                        }));
                        failures.sort_by_key(|failure| failure.position);
                        self.spawn_refresh(refresh_targets);
                        return Err(ConnectorError::RetriesExhausted {
                            attempts: report.submissions,
                            failures,
                        });
                    }
                    rounds_used += 1;
                    info!(
                        "⏳ {} entries rejected under load; retry {rounds_used}/{max_retries} in {wait:?}",
                        retryable.len()
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Err(self.cancelled(committed_before, &report));
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                    report.resubmitted += retryable.len();
                    pending = retryable.into_iter().map(|(position, _)| position).collect();
                }
            }
        }

        report.failures.sort_by_key(|failure| failure.position);
        debug!(
            "✅ batch done: {} committed, {} failed, {} submissions",
            report.committed(),
            report.failures.len(),
            report.submissions
        );
        self.spawn_refresh(refresh_targets);
        Ok(report)
    }

    /// 📡 One bulk request for the given positions. Returns (position, status, verdict) per entry.
    async fn submit(
        &self,
        entries: &[BulkEntry],
        positions: &[usize],
        conflict_budget: &[u32],
        report: &mut WriteReport,
    ) -> Result<Vec<(usize, u16, Verdict)>> {
        let mut payload = String::with_capacity(positions.iter().map(|&position| entries[position].size()).sum());
        for &position in positions {
            entries[position].write_to(&mut payload);
        }
        report.bytes += payload.len();
        report.submissions += 1;

        let reply = self.transport.bulk(payload).await?;
        if is_retryable_request_status(reply.status) {
            warn!("⏳ whole bulk request rejected with {}; every entry in it is retryable", reply.status);
            return Ok(positions
                .iter()
                .map(|&position| (position, reply.status, Verdict::Retryable))
                .collect());
        }
        if !reply.is_success() {
            return Err(ConnectorError::BulkRejected {
                status: reply.status,
                body: reply.body,
            });
        }
        let outcomes = parse_items(&reply.body, positions.len())?;
        Ok(positions
            .iter()
            .zip(outcomes)
            .map(|(&position, outcome)| {
                let verdict = classify(
                    self.options.operation,
                    &outcome,
                    self.options.ignore_existing,
                    conflict_budget[position] > 0,
                );
                (position, outcome.status, verdict)
            })
            .collect())
    }

    fn cancelled(&self, committed_before: usize, report: &WriteReport) -> ConnectorError {
        info!("🛑 cancelled between bulk attempts");
        ConnectorError::Cancelled {
            committed: committed_before + report.committed(),
        }
    }

    fn spawn_refresh(&mut self, indices: BTreeSet<String>) {
        if !self.options.refresh || indices.is_empty() {
            return;
        }
        let transport = Arc::clone(&self.transport);
        self.refreshes.retain(|handle| !handle.is_finished());
        self.refreshes.push(tokio::spawn(async move {
            for index in indices {
                match transport.refresh(&index).await {
                    Ok(reply) if reply.is_success() => debug!("🔄 refreshed '{index}'"),
                    Ok(reply) => warn!("🔄 refresh of '{index}' answered {}: {}", reply.status, reply.body),
                    Err(err) => warn!("🔄 refresh of '{index}' failed: {err}"),
                }
            }
        }));
    }

    /// 🗑️ Wait for outstanding refreshes. Their failures were already logged.
    pub async fn close(&mut self) {
        for outcome in join_all(self.refreshes.drain(..)).await {
            if let Err(err) = outcome {
                warn!("🔄 a refresh task did not finish cleanly: {err}");
            }
        }
    }
}

fn failure(entry: &BulkEntry, position: usize, status: u16, kind: FailureKind) -> EntryFailure {
    EntryFailure {
        position,
        status,
        id: entry.id().map(str::to_string),
        kind,
    }
}
