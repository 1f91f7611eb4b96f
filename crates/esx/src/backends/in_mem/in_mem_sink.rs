use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::Sink;

#[derive(Debug, Default, Clone)]
pub(crate) struct InMemorySink {
    received: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
}

impl InMemorySink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 📋 every payload received so far, in order
    pub(crate) async fn received(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }

    pub(crate) async fn is_closed(&self) -> bool {
        *self.closed.lock().await
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&mut self, payload: String) -> Result<()> {
        if *self.closed.lock().await {
            bail!("💀 payload sent to an in-memory sink that was already closed");
        }
        self.received.lock().await.push(payload);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        *self.closed.lock().await = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_a_clone_sees_what_the_original_received() -> Result<()> {
        let watcher = InMemorySink::new();
        let mut sink = watcher.clone();
        sink.send("one\n".to_string()).await?;
        sink.close().await?;
        assert_eq!(watcher.received().await, vec!["one\n".to_string()]);
        assert!(watcher.is_closed().await);
        assert!(sink.send("late\n".to_string()).await.is_err());
        Ok(())
    }
}
