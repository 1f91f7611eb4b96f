use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Worker;
use crate::error::ConnectorError;
use crate::scroll::ScrollReader;
use crate::transport::Transport;

/// 📜 One read task. Owns its cursor from the first search to the clear.
#[derive(Debug)]
pub(crate) struct ScrollWorker<T: Transport + 'static> {
    id: u32,
    reader: ScrollReader<T>,
    tx: Sender<Vec<Value>>,
    cancel: CancellationToken,
    heartbeat_every: Duration,
}

impl<T: Transport + 'static> ScrollWorker<T> {
    pub(crate) fn new(
        id: u32,
        reader: ScrollReader<T>,
        tx: Sender<Vec<Value>>,
        cancel: CancellationToken,
        heartbeat_every: Duration,
    ) -> Self {
        Self {
            id,
            reader,
            tx,
            cancel,
            heartbeat_every,
        }
    }

    /// 📤 Hand a page to the sink, renewing the cursor for as long as the channel stays full.
    async fn deliver(&mut self, page: Vec<Value>) -> Result<()> {
        let send = self.tx.send(page);
        tokio::pin!(send);
        loop {
            tokio::select! {
                sent = &mut send => {
                    return sent.map_err(|_| anyhow!("💀 scroll worker {}: the sink hung up", self.id));
                }
                _ = self.cancel.cancelled() => {
                    return Err(ConnectorError::Cancelled { committed: self.reader.documents() }.into());
                }
                _ = tokio::time::sleep(self.heartbeat_every) => {
                    self.reader.heartbeat().await.with_context(|| {
                        format!("💀 scroll worker {} could not keep its cursor alive", self.id)
                    })?;
                }
            }
        }
    }

    async fn pump(&mut self) -> Result<usize> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(ConnectorError::Cancelled {
                    committed: self.reader.documents(),
                }
                .into());
            }
            let page = self
                .reader
                .next()
                .await
                .with_context(|| format!("💀 scroll worker {} failed to fetch a page", self.id))?;
            if page.is_empty() {
                return Ok(self.reader.documents());
            }
            self.deliver(page).await?;
        }
    }
}

impl<T: Transport + 'static> Worker for ScrollWorker<T> {
    type Output = usize;

    fn start(mut self) -> JoinHandle<Result<usize>> {
        tokio::spawn(async move {
            debug!("📜 scroll worker {} started", self.id);
            let outcome = self.pump().await;
            // -- exhausted readers already cleared their cursor; close is a no-op for them
            self.reader.close().await;
            match outcome {
                Ok(documents) => {
                    debug!("🏁 scroll worker {} done after {documents} documents", self.id);
                    Ok(documents)
                }
                Err(err) => {
                    if !self.cancel.is_cancelled() {
                        warn!("🛑 scroll worker {} failed; cancelling the others", self.id);
                        self.cancel.cancel();
                    }
                    Err(err)
                }
            }
        })
    }
}
