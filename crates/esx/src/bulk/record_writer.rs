//! 🧵 The per-task write pipeline: record → metadata → entry → batch → bulk.
//!
//! One `RecordWriter` per write task. It owns its accumulator and its bulk writer; nothing in
//! here is shared except the transport handle and the cancellation token.
//!
//! Per-record problems (a missing id field, an entry too big for any batch) are counted,
//! logged, and handed back as non-systemic errors. The pipeline keeps going. Systemic problems
//! (exhausted retries, a rejected request, cancellation) are handed back too, and the caller
//! is expected to stop.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::batch::{Batch, BatchAccumulator};
use super::command::BulkCommandFactory;
use super::writer::{RetryingBulkWriter, WriteReport, WriterOptions};
use crate::error::{ConfigError, ConnectorError, Result};
use crate::extract::{ExtractorChain, ExtractorRegistry, ensure_id_for};
use crate::record::Record;
use crate::settings::{Settings, keys};
use crate::transport::Transport;

/// 📊 Running totals for one writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub records: usize,
    pub committed: usize,
    pub ignored: usize,
    pub batches: usize,
    pub submissions: u32,
    pub bytes_sent: usize,
    pub extraction_failures: usize,
    pub oversize: usize,
    pub entry_failures: usize,
}

impl WriteStats {
    fn absorb(&mut self, report: &WriteReport) {
        self.committed += report.succeeded;
        self.ignored += report.ignored;
        self.batches += 1;
        self.submissions += report.submissions;
        self.bytes_sent += report.bytes;
        self.entry_failures += report.failures.len();
    }

    /// ➕ fold another writer's totals into this one
    pub fn merge(&mut self, other: &WriteStats) {
        self.records += other.records;
        self.committed += other.committed;
        self.ignored += other.ignored;
        self.batches += other.batches;
        self.submissions += other.submissions;
        self.bytes_sent += other.bytes_sent;
        self.extraction_failures += other.extraction_failures;
        self.oversize += other.oversize;
        self.entry_failures += other.entry_failures;
    }
}

#[derive(Debug)]
pub struct RecordWriter<T: Transport + 'static> {
    chain: ExtractorChain,
    factory: BulkCommandFactory,
    accumulator: BatchAccumulator,
    writer: RetryingBulkWriter<T>,
    transport: Arc<T>,
    input_json: bool,
    verify_indices: bool,
    verified: HashSet<String>,
    stats: WriteStats,
}

impl<T: Transport + 'static> RecordWriter<T> {
    /// 🏗️ Validate settings, resolve the extractor chain, wire the pipeline.
    /// Every configuration error surfaces here, before the first record.
    pub fn from_settings(
        settings: &Settings,
        registry: &ExtractorRegistry,
        transport: Arc<T>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        settings.validate_for_write()?;
        let chain = ExtractorChain::from_settings(settings, registry)?;
        let factory = BulkCommandFactory::from_settings(settings)?;
        ensure_id_for(factory.operation(), &chain)?;
        let accumulator = BatchAccumulator::new(
            settings.batch_size_bytes()?,
            settings.batch_size_entries()?,
            settings.batch_flush_manual()?,
        );
        let writer = RetryingBulkWriter::new(
            Arc::clone(&transport),
            WriterOptions::from_settings(settings)?,
            cancel,
        );
        Ok(Self {
            chain,
            factory,
            accumulator,
            writer,
            transport,
            input_json: settings.input_json()?,
            verify_indices: !settings.index_auto_create()?,
            verified: HashSet::new(),
            stats: WriteStats::default(),
        })
    }

    pub fn stats(&self) -> &WriteStats {
        &self.stats
    }

    /// 📥 Push one record through the pipeline. May submit a batch on the way.
    pub async fn write(&mut self, record: &dyn Record) -> Result<()> {
        self.stats.records += 1;
        let metadata = match self.chain.extract(record) {
            Ok(metadata) => metadata,
            Err(err) => {
                self.stats.extraction_failures += 1;
                warn!("🔍 skipping record #{}: {err}", self.stats.records);
                return Err(err);
            }
        };
        if self.verify_indices && !self.verified.contains(&metadata.index) {
            if !self.transport.index_exists(&metadata.index).await? {
                return Err(ConfigError::Incompatible(format!(
                    "index '{}' does not exist and '{}' is off",
                    metadata.index,
                    keys::INDEX_AUTO_CREATE
                ))
                .into());
            }
            self.verified.insert(metadata.index.clone());
        }

        let entry = if self.input_json {
            self.factory.render(&metadata, record)?
        } else {
            // -- 📦 not pre-serialized: round-trip through Value so the document is canonical JSON
            let value = serde_json::from_str::<serde_json::Value>(&record.to_document()?)?;
            self.factory.render(&metadata, &value)?
        };

        match self.accumulator.append(entry) {
            Ok(Some(ready)) => self.submit(ready).await?,
            Ok(None) => {}
            Err(err @ ConnectorError::Oversize { .. }) => {
                self.stats.oversize += 1;
                warn!("📏 skipping record #{}: {err}", self.stats.records);
                return Err(err);
            }
            Err(err) => return Err(err),
        }
        if self.accumulator.should_flush() {
            self.flush().await?;
        }
        Ok(())
    }

    /// 🚽 Submit whatever is buffered, threshold or not.
    pub async fn flush(&mut self) -> Result<()> {
        let batch = self.accumulator.drain();
        if batch.is_empty() {
            return Ok(());
        }
        self.submit(batch).await
    }

    /// 🗑️ Flush, wait for refreshes, hand back the totals.
    pub async fn close(mut self) -> Result<WriteStats> {
        let flushed = self.flush().await;
        self.writer.close().await;
        flushed?;
        debug!("🗑️ record writer closed: {:?}", self.stats);
        Ok(self.stats)
    }

    async fn submit(&mut self, batch: Batch) -> Result<()> {
        let report = self.writer.write(batch, self.stats.committed + self.stats.ignored).await?;
        self.stats.absorb(&report);
        Ok(())
    }
}
