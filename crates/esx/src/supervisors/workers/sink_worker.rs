//! 🗑️ Drains pages of documents into a sink, one NDJSON payload per page.

use anyhow::{Context, Result};
use async_channel::Receiver;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Worker;
use crate::backends::{Sink, SinkBackend};
use crate::progress::ProgressMetrics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SinkStats {
    pub documents: usize,
    pub bytes: u64,
}

#[derive(Debug)]
pub(crate) struct SinkWorker {
    rx: Receiver<Vec<Value>>,
    sink: SinkBackend,
    cancel: CancellationToken,
    progress: ProgressMetrics,
}

impl SinkWorker {
    pub(crate) fn new(
        rx: Receiver<Vec<Value>>,
        sink: SinkBackend,
        cancel: CancellationToken,
        progress: ProgressMetrics,
    ) -> Self {
        Self {
            rx,
            sink,
            cancel,
            progress,
        }
    }

    fn render(page: &[Value]) -> Result<String> {
        let mut payload = String::new();
        for document in page {
            payload.push_str(&serde_json::to_string(document).context("💀 a document refused to serialize")?);
            payload.push('\n');
        }
        Ok(payload)
    }

    async fn drain(&mut self) -> Result<SinkStats> {
        let mut stats = SinkStats::default();
        while let Ok(page) = self.rx.recv().await {
            let payload = Self::render(&page)?;
            let bytes = payload.len() as u64;
            self.sink.send(payload).await.context("💀 SinkWorker failed to send a page")?;
            stats.documents += page.len();
            stats.bytes += bytes;
            self.progress.update(bytes, page.len() as u64);
        }
        debug!("🏁 SinkWorker: channel closed after {} documents", stats.documents);
        Ok(stats)
    }
}

impl Worker for SinkWorker {
    type Output = SinkStats;

    fn start(mut self) -> JoinHandle<Result<SinkStats>> {
        tokio::spawn(async move {
            let drained = self.drain().await;
            if drained.is_err() {
                self.cancel.cancel();
                self.rx.close();
            }
            let closed = self.sink.close().await.context("💀 SinkWorker failed to close sink");
            self.progress.finish();
            let stats = drained?;
            closed?;
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemorySink;
    use serde_json::json;

    #[tokio::test]
    async fn the_one_where_each_page_becomes_one_ndjson_payload() -> Result<()> {
        let watcher = InMemorySink::new();
        let (tx, rx) = async_channel::bounded(1);
        let worker = SinkWorker::new(
            rx,
            SinkBackend::InMemory(watcher.clone()),
            CancellationToken::new(),
            ProgressMetrics::new("test".to_string(), 0),
        );
        let handle = worker.start();
        tx.send(vec![json!({"a": 1}), json!({"b": "two"})]).await?;
        tx.send(vec![json!({"c": null})]).await?;
        drop(tx);
        let stats = handle.await??;
        assert_eq!(stats.documents, 3);
        assert_eq!(
            watcher.received().await,
            vec!["{\"a\":1}\n{\"b\":\"two\"}\n".to_string(), "{\"c\":null}\n".to_string()]
        );
        assert!(watcher.is_closed().await);
        Ok(())
    }
}
