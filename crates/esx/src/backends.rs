//! 🔌 Backends: the ends of the pipe that are not the search service.
//!
//! 🚰 A `Source` hands out raw NDJSON pages for the write path. A `Sink` takes rendered NDJSON
//! payloads from the read path. Neither knows what a bulk request is. The enums below dispatch
//! to the concrete backends so the supervisor never has to care which one it holds.

use anyhow::Result;
use async_trait::async_trait;

pub(crate) mod file;
pub(crate) mod in_mem;

pub(crate) use file::{FileSink, FileSinkConfig, FileSource, FileSourceConfig};
pub(crate) use in_mem::{InMemorySink, InMemorySource};

/// 🚰 One raw page per call.
///
/// # Contract
/// - `next_page` returns newline-separated lines, uninterpreted.
/// - `None` means the source is dry. Asking again keeps answering `None`.
#[async_trait]
pub(crate) trait Source: std::fmt::Debug + Send {
    async fn next_page(&mut self) -> Result<Option<String>>;
}

/// 🕳️ Takes rendered payloads. `close` must be called; buffered sinks flush there.
#[async_trait]
pub(crate) trait Sink: std::fmt::Debug + Send {
    async fn send(&mut self, payload: String) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

#[derive(Debug)]
pub(crate) enum SourceBackend {
    InMemory(InMemorySource),
    File(FileSource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn next_page(&mut self) -> Result<Option<String>> {
        match self {
            SourceBackend::InMemory(source) => source.next_page().await,
            SourceBackend::File(source) => source.next_page().await,
        }
    }
}

#[derive(Debug)]
pub(crate) enum SinkBackend {
    InMemory(InMemorySink),
    File(FileSink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&mut self, payload: String) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.send(payload).await,
            SinkBackend::File(sink) => sink.send(payload).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.close().await,
            SinkBackend::File(sink) => sink.close().await,
        }
    }
}

/// ✂️ Split a page into its non-blank lines, tolerating `\r\n`.
pub(crate) fn page_lines(page: &str) -> impl Iterator<Item = &str> {
    let bytes = page.as_bytes();
    let mut start = 0;
    memchr::memchr_iter(b'\n', bytes)
        .chain(std::iter::once(bytes.len()))
        .filter_map(move |end| {
            if end < start {
                return None;
            }
            let line = page[start..end].trim_end_matches('\r');
            start = end + 1;
            (!line.trim().is_empty()).then_some(line)
        })
}
