use anyhow::{Context, Result};
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Worker;
use crate::bulk::{RecordWriter, WriteStats};
use crate::record::JsonRecord;
use crate::transport::Transport;

/// 🚚 One write task: its own accumulator, its own retries, its own stats.
#[derive(Debug)]
pub(crate) struct WriteWorker<T: Transport + 'static> {
    id: usize,
    rx: Receiver<Vec<JsonRecord>>,
    writer: RecordWriter<T>,
    cancel: CancellationToken,
}

impl<T: Transport + 'static> WriteWorker<T> {
    pub(crate) fn new(
        id: usize,
        rx: Receiver<Vec<JsonRecord>>,
        writer: RecordWriter<T>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            rx,
            writer,
            cancel,
        }
    }
}

impl<T: Transport + 'static> Worker for WriteWorker<T> {
    type Output = WriteStats;

    fn start(self) -> JoinHandle<Result<WriteStats>> {
        tokio::spawn(async move {
            let Self {
                id,
                rx,
                mut writer,
                cancel,
            } = self;
            debug!("🚚 write worker {id} started");
            while let Ok(records) = rx.recv().await {
                for record in &records {
                    // -- per-record problems are already counted and logged by the writer
                    if let Err(err) = writer.write(record).await
                        && err.is_systemic()
                    {
                        cancel.cancel();
                        rx.close();
                        return Err(err).with_context(|| {
                            format!(
                                "💀 write worker {id} stopped after {} records",
                                writer.stats().records
                            )
                        });
                    }
                }
            }
            let stats = match writer.close().await {
                Ok(stats) => stats,
                Err(err) => {
                    cancel.cancel();
                    return Err(err)
                        .with_context(|| format!("💀 write worker {id} failed its final flush"));
                }
            };
            debug!("🏁 write worker {id} done: {} committed", stats.committed);
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractorRegistry;
    use crate::settings::{Settings, keys};
    use crate::transport::InMemoryCluster;
    use serde_json::json;
    use std::sync::Arc;

    fn worker(
        cluster: &InMemoryCluster,
        rx: Receiver<Vec<JsonRecord>>,
        cancel: &CancellationToken,
        pairs: &[(&str, &str)],
    ) -> Result<WriteWorker<InMemoryCluster>> {
        let mut settings = vec![
            (keys::RESOURCE_WRITE, "people"),
            (keys::BATCH_WRITE_REFRESH, "false"),
            (keys::BATCH_WRITE_RETRY_WAIT, "1ms"),
        ];
        settings.extend_from_slice(pairs);
        let writer = RecordWriter::from_settings(
            &Settings::from_pairs(settings),
            &ExtractorRegistry::new(),
            Arc::new(cluster.clone()),
            cancel.clone(),
        )?;
        Ok(WriteWorker::new(0, rx, writer, cancel.clone()))
    }

    #[tokio::test]
    async fn the_one_where_the_worker_flushes_when_the_channel_closes() -> Result<()> {
        let cluster = InMemoryCluster::new();
        let cancel = CancellationToken::new();
        let (tx, rx) = async_channel::bounded(2);
        let handle = worker(&cluster, rx, &cancel, &[])?.start();
        tx.send(vec![JsonRecord::new(json!({"a": 1})), JsonRecord::new(json!({"a": 2}))])
            .await?;
        drop(tx);
        let stats = handle.await??;
        assert_eq!(stats.committed, 2);
        assert_eq!(cluster.count("people").await, 2);
        assert!(!cancel.is_cancelled());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_systemic_failure_pulls_the_cord_for_everyone() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.script_request_status(400).await;
        let cancel = CancellationToken::new();
        let (tx, rx) = async_channel::bounded(2);
        let handle = worker(&cluster, rx, &cancel, &[(keys::BATCH_SIZE_ENTRIES, "1")])?.start();
        tx.send(vec![JsonRecord::new(json!({"a": 1}))]).await?;
        let err = handle.await?.expect_err("💀 a rejected bulk must stop the worker");
        assert!(err.to_string().contains("write worker 0 stopped"));
        assert!(cancel.is_cancelled());
        assert!(tx.is_closed(), "the channel is closed so the dealer stops feeding");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_record_without_an_id_is_only_a_footnote() -> Result<()> {
        let cluster = InMemoryCluster::new();
        let cancel = CancellationToken::new();
        let (tx, rx) = async_channel::bounded(2);
        let handle = worker(&cluster, rx, &cancel, &[(keys::MAPPING_ID, "id")])?.start();
        tx.send(vec![
            JsonRecord::new(json!({"id": "a"})),
            JsonRecord::new(json!({"nope": true})),
            JsonRecord::new(json!({"id": "b"})),
        ])
        .await?;
        drop(tx);
        let stats = handle.await??;
        assert_eq!(stats.committed, 2);
        assert_eq!(stats.extraction_failures, 1);
        assert!(!cancel.is_cancelled());
        Ok(())
    }
}
