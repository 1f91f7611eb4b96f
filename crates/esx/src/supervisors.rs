//! 🎬 The Supervisor: spawns the workers, feeds them, waits for them, and decides whose error
//! gets to be the headline.
//!
//! ```text
//! write:  Source ─▶ deal round-robin ─▶ [chan]×N ─▶ WriteWorker×N ─▶ bulk
//! read:   ScrollWorker×N (one slice each) ─▶ [chan] ─▶ SinkWorker ─▶ Sink
//! ```
//!
//! ⚠️ The workers stay private to this module. Callers get summaries, not task handles.

mod workers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::backends::{
    FileSink, FileSinkConfig, FileSource, FileSourceConfig, SinkBackend, Source, SourceBackend,
    page_lines,
};
use crate::bulk::{RecordWriter, WriteStats};
use crate::error::ConnectorError;
use crate::extract::ExtractorRegistry;
use crate::progress::ProgressMetrics;
use crate::record::JsonRecord;
use crate::scroll::{ReaderOptions, ScrollReader};
use crate::settings::Settings;
use crate::transport::Transport;
use workers::{ScrollWorker, SinkWorker, Worker, WriteWorker};

// -- 💓 how often a blocked read task checks whether its cursor needs renewing
const HEARTBEAT_POLL: Duration = Duration::from_secs(1);

/// 📊 How a write job went.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSummary {
    pub stats: WriteStats,
    /// lines in the input that were not JSON at all
    pub malformed: usize,
    pub workers: usize,
    pub elapsed: Duration,
}

/// 📊 How a read job went.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadSummary {
    pub documents: usize,
    pub bytes: u64,
    pub readers: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct Dealt {
    records: usize,
    malformed: usize,
}

pub(crate) struct Supervisor<T: Transport + 'static> {
    app_config: AppConfig,
    settings: Arc<Settings>,
    transport: Arc<T>,
    registry: ExtractorRegistry,
    cancel: CancellationToken,
}

impl<T: Transport + 'static> Supervisor<T> {
    pub(crate) fn new(
        app_config: AppConfig,
        transport: Arc<T>,
        registry: ExtractorRegistry,
        cancel: CancellationToken,
    ) -> Self {
        let settings = Arc::new(app_config.settings_view());
        Self {
            app_config,
            settings,
            transport,
            registry,
            cancel,
        }
    }

    fn parallelism(&self) -> usize {
        self.app_config.runtime.sink_parallelism.max(1)
    }

    fn queue_capacity(&self) -> usize {
        self.app_config.runtime.queue_capacity.max(1)
    }

    /// 🚀 Write the configured input file into the service.
    pub(crate) async fn write(&self) -> Result<WriteSummary> {
        let input = self.app_config.job.input.clone().context(
            "💀 Nothing to write: set `job.input` in the config (or pass --input) to an NDJSON file.",
        )?;
        let source = FileSource::new(FileSourceConfig {
            file_name: input,
            max_page_docs: self.app_config.job.max_page_docs,
            max_page_bytes: self.app_config.job.max_page_bytes,
        })
        .await?;
        self.write_from(SourceBackend::File(source)).await
    }

    /// 🚀 Read the configured resource into the output file.
    pub(crate) async fn read(&self) -> Result<ReadSummary> {
        let output = self.app_config.job.output.clone().context(
            "💀 Nowhere to read into: set `job.output` in the config (or pass --output).",
        )?;
        let sink = FileSink::new(FileSinkConfig { file_name: output }).await?;
        self.read_into(SinkBackend::File(sink)).await
    }

    pub(crate) async fn write_from(&self, source: SourceBackend) -> Result<WriteSummary> {
        let started = Instant::now();
        let parallelism = self.parallelism();
        let mut senders = Vec::with_capacity(parallelism);
        let mut handles = Vec::with_capacity(parallelism);
        // -- every writer is built before anything is spawned so config errors surface first
        let mut writers = Vec::with_capacity(parallelism);
        for id in 0..parallelism {
            let writer = RecordWriter::from_settings(
                &self.settings,
                &self.registry,
                Arc::clone(&self.transport),
                self.cancel.clone(),
            )
            .with_context(|| format!("💀 write worker {id} could not be configured"))?;
            writers.push(writer);
        }
        for (id, writer) in writers.into_iter().enumerate() {
            let (tx, rx) = async_channel::bounded(self.queue_capacity());
            senders.push(tx);
            handles.push(WriteWorker::new(id, rx, writer, self.cancel.clone()).start());
        }
        info!("🚀 writing with {parallelism} workers");

        let dealt = self.deal(source, &senders).await;
        if dealt.is_err() {
            self.cancel.cancel();
        }
        drop(senders);

        let mut stats = WriteStats::default();
        let mut failures = Vec::new();
        for outcome in join_all(handles).await {
            match outcome.context("💀 a write worker panicked")? {
                Ok(worker_stats) => stats.merge(&worker_stats),
                Err(err) => failures.push(err),
            }
        }
        let dealt = dealt?;
        if let Some(err) = headline(failures) {
            return Err(err);
        }
        let summary = WriteSummary {
            stats,
            malformed: dealt.malformed,
            workers: parallelism,
            elapsed: started.elapsed(),
        };
        info!(
            "✅ write finished: {} of {} records committed in {:?}",
            summary.stats.committed, dealt.records, summary.elapsed
        );
        Ok(summary)
    }

    /// 🃏 Split each page into records and deal them round-robin, one bundle per worker per page.
    async fn deal(&self, mut source: SourceBackend, senders: &[Sender<Vec<JsonRecord>>]) -> Result<Dealt> {
        let mut dealt = Dealt::default();
        let mut next = 0usize;
        while let Some(page) = source.next_page().await.context("💀 the input source failed mid-read")? {
            let mut bundles: Vec<Vec<JsonRecord>> = vec![Vec::new(); senders.len()];
            for line in page_lines(&page) {
                match JsonRecord::from_json_line(line) {
                    Ok(record) => {
                        bundles[next % senders.len()].push(record);
                        next += 1;
                        dealt.records += 1;
                    }
                    Err(err) => {
                        dealt.malformed += 1;
                        warn!("🧩 skipping a line that is not JSON ({err})");
                    }
                }
            }
            for (tx, bundle) in senders.iter().zip(bundles) {
                if bundle.is_empty() {
                    continue;
                }
                tokio::select! {
                    sent = tx.send(bundle) => {
                        // -- a closed channel means that worker failed; its error wins at join
                        if sent.is_err() {
                            return Ok(dealt);
                        }
                    }
                    _ = self.cancel.cancelled() => return Ok(dealt),
                }
            }
        }
        Ok(dealt)
    }

    pub(crate) async fn read_into(&self, sink: SinkBackend) -> Result<ReadSummary> {
        let started = Instant::now();
        let readers = self.parallelism();
        let options = ReaderOptions::from_settings(&self.settings)
            .context("💀 the read settings do not add up")?;
        let (tx, rx) = async_channel::bounded(self.queue_capacity());
        let progress = ProgressMetrics::new(format!("reading {}", options.resource.index), 0);
        let sink_handle = SinkWorker::new(rx, sink, self.cancel.clone(), progress).start();

        let mut handles: Vec<JoinHandle<Result<usize>>> = Vec::with_capacity(readers);
        for slice in 0..readers {
            let slice = u32::try_from(slice).context("💀 more read workers than slices allow")?;
            let max = u32::try_from(readers).context("💀 more read workers than slices allow")?;
            let reader = ScrollReader::new(Arc::clone(&self.transport), options.clone().with_slice(slice, max));
            handles.push(ScrollWorker::new(slice, reader, tx.clone(), self.cancel.clone(), HEARTBEAT_POLL).start());
        }
        drop(tx);
        info!("🔍 reading '{}' with {readers} scroll workers", options.resource.index);

        let mut failures = Vec::new();
        let mut documents = 0usize;
        for outcome in join_all(handles).await {
            match outcome.context("💀 a scroll worker panicked")? {
                Ok(count) => documents += count,
                Err(err) => failures.push(err),
            }
        }
        let sink_stats = match sink_handle.await.context("💀 the sink worker panicked")? {
            Ok(stats) => Some(stats),
            Err(err) => {
                // -- the sink's own failure explains any "sink hung up" from the readers
                failures.insert(0, err);
                None
            }
        };
        if let Some(err) = headline(failures) {
            return Err(err);
        }
        let sink_stats = sink_stats.ok_or_else(|| anyhow!("💀 the sink finished without stats"))?;
        if sink_stats.documents != documents {
            warn!(
                "📉 readers handed out {documents} documents but the sink wrote {}",
                sink_stats.documents
            );
        }
        let summary = ReadSummary {
            documents: sink_stats.documents,
            bytes: sink_stats.bytes,
            readers,
            elapsed: started.elapsed(),
        };
        info!("✅ read finished: {} documents in {:?}", summary.documents, summary.elapsed);
        Ok(summary)
    }
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ConnectorError>(), Some(ConnectorError::Cancelled { .. }))
}

/// 📰 The error worth reporting: the first real failure, or a cancellation if that is all there is.
fn headline(failures: Vec<anyhow::Error>) -> Option<anyhow::Error> {
    let mut cancelled = None;
    for err in failures {
        if !is_cancellation(&err) {
            return Some(err);
        }
        cancelled.get_or_insert(err);
    }
    cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{RuntimeConfig, SettingValue};
    use crate::backends::{InMemorySink, InMemorySource};
    use crate::settings::keys;
    use crate::transport::InMemoryCluster;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn app_config(workers: usize, pairs: &[(&str, &str)]) -> AppConfig {
        let mut settings: BTreeMap<String, SettingValue> = BTreeMap::new();
        settings.insert(keys::BATCH_WRITE_REFRESH.to_string(), SettingValue::Flag(false));
        settings.insert(keys::BATCH_WRITE_RETRY_WAIT.to_string(), SettingValue::Text("1ms".to_string()));
        for (key, value) in pairs {
            settings.insert(key.to_string(), SettingValue::Text(value.to_string()));
        }
        AppConfig {
            settings,
            runtime: RuntimeConfig {
                queue_capacity: 2,
                sink_parallelism: workers,
            },
            ..AppConfig::default()
        }
    }

    fn supervisor(cluster: &InMemoryCluster, config: AppConfig) -> Supervisor<InMemoryCluster> {
        Supervisor::new(
            config,
            Arc::new(cluster.clone()),
            ExtractorRegistry::new(),
            CancellationToken::new(),
        )
    }

    fn pages(count: usize, per_page: usize) -> InMemorySource {
        InMemorySource::new((0..count).map(|page| {
            (0..per_page)
                .map(|n| format!("{{\"id\":\"{page}-{n}\",\"n\":{n}}}"))
                .collect::<Vec<_>>()
                .join("\n")
        }))
    }

    #[tokio::test]
    async fn the_one_where_three_workers_share_the_load() -> Result<()> {
        let cluster = InMemoryCluster::new();
        let config = app_config(3, &[(keys::RESOURCE_WRITE, "people"), (keys::MAPPING_ID, "id")]);
        let summary = supervisor(&cluster, config)
            .write_from(SourceBackend::InMemory(pages(4, 5)))
            .await?;
        assert_eq!(summary.workers, 3);
        assert_eq!(summary.stats.records, 20);
        assert_eq!(summary.stats.committed, 20);
        assert_eq!(cluster.count("people").await, 20);
        assert!(cluster.bulk_submissions().await >= 3, "every worker flushed its own batch");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_garbage_lines_are_counted_not_fatal() -> Result<()> {
        let cluster = InMemoryCluster::new();
        let config = app_config(1, &[(keys::RESOURCE_WRITE, "people")]);
        let source = InMemorySource::new(["{\"a\":1}\nnot json at all\n{\"a\":2}"]);
        let summary = supervisor(&cluster, config).write_from(SourceBackend::InMemory(source)).await?;
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.stats.committed, 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_one_failing_worker_stops_the_job() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.script_request_status(400).await;
        let config = app_config(
            2,
            &[(keys::RESOURCE_WRITE, "people"), (keys::BATCH_SIZE_ENTRIES, "1")],
        );
        let err = supervisor(&cluster, config)
            .write_from(SourceBackend::InMemory(pages(10, 10)))
            .await
            .expect_err("💀 a rejected bulk must fail the job");
        assert!(!is_cancellation(&err), "the headline is the real failure: {err:#}");
        assert!(format!("{err:#}").contains("rejected with status 400"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_bad_config_fails_before_anything_moves() {
        let cluster = InMemoryCluster::new();
        let config = app_config(2, &[(keys::RESOURCE_WRITE, "people"), (keys::WRITE_OPERATION, "update")]);
        let err = supervisor(&cluster, config)
            .write_from(SourceBackend::InMemory(pages(1, 1)))
            .await
            .expect_err("💀 update without an id mapping is a config error");
        assert!(err.to_string().contains("could not be configured"));
        assert!(cluster.requests().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_two_slices_read_everything_exactly_once() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.seed("books", (0..25).map(|n| json!({ "n": n }))).await;
        let config = app_config(2, &[(keys::RESOURCE_READ, "books"), (keys::SCROLL_SIZE, "4")]);
        let watcher = InMemorySink::new();
        let summary = supervisor(&cluster, config)
            .read_into(SinkBackend::InMemory(watcher.clone()))
            .await?;
        assert_eq!(summary.documents, 25);
        assert_eq!(summary.readers, 2);
        let mut seen: Vec<u64> = watcher
            .received()
            .await
            .iter()
            .flat_map(|payload| payload.lines().map(str::to_string).collect::<Vec<_>>())
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(&line).ok())
            .filter_map(|doc| doc["n"].as_u64())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..25).collect::<Vec<u64>>());
        assert_eq!(cluster.open_scrolls().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_index_fails_the_read() {
        let cluster = InMemoryCluster::new();
        let config = app_config(1, &[(keys::RESOURCE_READ, "ghost")]);
        let err = supervisor(&cluster, config)
            .read_into(SinkBackend::InMemory(InMemorySink::new()))
            .await
            .expect_err("💀 reading a missing index must fail");
        assert!(format!("{err:#}").contains("does not exist"));
    }

    #[tokio::test]
    async fn the_one_where_cancellation_is_reported_as_such() -> Result<()> {
        let cluster = InMemoryCluster::new();
        cluster.seed("books", (0..10).map(|n| json!({ "n": n }))).await;
        let config = app_config(1, &[(keys::RESOURCE_READ, "books"), (keys::SCROLL_SIZE, "2")]);
        let supervisor = supervisor(&cluster, config);
        supervisor.cancel.cancel();
        let err = supervisor
            .read_into(SinkBackend::InMemory(InMemorySink::new()))
            .await
            .expect_err("💀 a cancelled read is not a success");
        assert!(is_cancellation(&err));
        Ok(())
    }
}
