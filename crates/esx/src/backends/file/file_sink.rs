use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{
    fs::File,
    io::{self, AsyncWriteExt},
};
use tracing::trace;

use crate::backends::Sink;

#[derive(Debug, Clone)]
pub(crate) struct FileSinkConfig {
    pub file_name: PathBuf,
}

/// 🗑️ A `BufWriter` around a fresh file. Writes what it is given, flushes on close.
#[derive(Debug)]
pub(crate) struct FileSink {
    file_buf: io::BufWriter<File>,
    bytes_written: u64,
    config: FileSinkConfig,
}

impl FileSink {
    pub(crate) async fn new(config: FileSinkConfig) -> Result<Self> {
        let file_handle = File::create(&config.file_name).await.with_context(|| {
            format!(
                "💀 The output file '{}' could not be created. Does the parent directory exist?",
                config.file_name.display()
            )
        })?;
        Ok(Self {
            file_buf: io::BufWriter::new(file_handle),
            bytes_written: 0,
            config,
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn send(&mut self, payload: String) -> Result<()> {
        trace!("📬 {} bytes into '{}'", payload.len(), self.config.file_name.display());
        self.file_buf.write_all(payload.as_bytes()).await.with_context(|| {
            format!("💀 writing to '{}' failed. A full disk is the usual suspect.", self.config.file_name.display())
        })?;
        self.bytes_written += payload.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        trace!("🎬 final flush of '{}' after {} bytes", self.config.file_name.display(), self.bytes_written);
        // -- async Drop does not exist, so the flush has to be explicit
        self.file_buf.flush().await.with_context(|| {
            format!(
                "💀 The last bytes for '{}' never left the buffer. The file is incomplete.",
                self.config.file_name.display()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_every_payload_lands_after_close() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.ndjson");
        let mut sink = FileSink::new(FileSinkConfig { file_name: path.clone() }).await?;
        sink.send("{\"a\":1}\n".to_string()).await?;
        sink.send("{\"b\":2}\n".to_string()).await?;
        sink.close().await?;
        assert_eq!(std::fs::read_to_string(&path)?, "{\"a\":1}\n{\"b\":2}\n");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_existing_file_is_replaced() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.ndjson");
        std::fs::write(&path, "stale leftovers\n")?;
        let mut sink = FileSink::new(FileSinkConfig { file_name: path.clone() }).await?;
        sink.send("fresh\n".to_string()).await?;
        sink.close().await?;
        assert_eq!(std::fs::read_to_string(&path)?, "fresh\n");
        Ok(())
    }
}
