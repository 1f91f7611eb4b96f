use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use tokio::{
    fs::File,
    io::{self, AsyncBufReadExt},
};
use tracing::trace;

use crate::backends::Source;
use crate::progress::ProgressMetrics;

#[derive(Debug, Clone)]
pub(crate) struct FileSourceConfig {
    pub file_name: PathBuf,
    pub max_page_docs: usize,
    pub max_page_bytes: usize,
}

impl FileSourceConfig {
    fn is_gzip(&self) -> bool {
        self.file_name
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("gz"))
    }
}

type GzipLines = std::io::BufReader<MultiGzDecoder<std::fs::File>>;

enum LineReader {
    Plain(io::BufReader<File>),
    // -- 🫁 flate2 reads synchronously; the reader travels into spawn_blocking and back
    Gzip(Option<GzipLines>),
}

/// 📄 A page in the making. Full when either cap is reached.
struct PageBuilder {
    page: String,
    bytes: usize,
    lines: usize,
    max_docs: usize,
    max_bytes: usize,
}

impl PageBuilder {
    fn new(max_docs: usize, max_bytes: usize) -> Self {
        Self {
            page: String::new(),
            bytes: 0,
            lines: 0,
            max_docs: max_docs.max(1),
            max_bytes: max_bytes.max(1),
        }
    }

    /// Returns true once the page should be handed out.
    fn push(&mut self, raw: &str) -> bool {
        self.bytes += raw.len();
        let trimmed = raw.trim_end_matches('\n').trim_end_matches('\r');
        if !trimmed.trim().is_empty() {
            if !self.page.is_empty() {
                self.page.push('\n');
            }
            self.page.push_str(trimmed);
            self.lines += 1;
        }
        self.lines >= self.max_docs || self.bytes >= self.max_bytes
    }
}

/// 📂 Reads a (possibly gzipped) NDJSON file a page at a time.
pub(crate) struct FileSource {
    reader: LineReader,
    config: FileSourceConfig,
    progress: ProgressMetrics,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource").field("config", &self.config).finish()
    }
}

impl FileSource {
    pub(crate) async fn new(config: FileSourceConfig) -> Result<Self> {
        let file_handle = File::open(&config.file_name).await.with_context(|| {
            format!(
                "💀 The input file '{}' would not open. It may not exist, or the permissions say no. \
                Relative paths resolve from the directory esx was started in.",
                config.file_name.display()
            )
        })?;
        let file_size = file_handle.metadata().await.map(|m| m.len()).unwrap_or(0);

        let (reader, progress_total) = if config.is_gzip() {
            let std_file = file_handle.into_std().await;
            let decoder = std::io::BufReader::new(MultiGzDecoder::new(std_file));
            // -- 📏 decompressed size is unknown up front
            (LineReader::Gzip(Some(decoder)), 0)
        } else {
            (LineReader::Plain(io::BufReader::new(file_handle)), file_size)
        };
        let progress = ProgressMetrics::new(config.file_name.display().to_string(), progress_total);
        Ok(Self {
            reader,
            config,
            progress,
        })
    }

    async fn read_plain(reader: &mut io::BufReader<File>, mut builder: PageBuilder) -> Result<PageBuilder> {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            if builder.push(&line) {
                break;
            }
        }
        Ok(builder)
    }

    fn read_gzip(reader: &mut GzipLines, mut builder: PageBuilder) -> std::io::Result<PageBuilder> {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            if builder.push(&line) {
                break;
            }
        }
        Ok(builder)
    }
}

#[async_trait]
impl Source for FileSource {
    async fn next_page(&mut self) -> Result<Option<String>> {
        let builder = PageBuilder::new(self.config.max_page_docs, self.config.max_page_bytes);
        let builder = match &mut self.reader {
            LineReader::Plain(reader) => Self::read_plain(reader, builder).await?,
            LineReader::Gzip(slot) => {
                let Some(mut reader) = slot.take() else {
                    return Ok(None);
                };
                let (reader, builder) = tokio::task::spawn_blocking(move || {
                    let page = Self::read_gzip(&mut reader, builder);
                    (reader, page)
                })
                .await
                .context("💀 the gunzip task vanished mid-page")?;
                *slot = Some(reader);
                builder.with_context(|| {
                    format!("💀 '{}' is not valid gzip", self.config.file_name.display())
                })?
            }
        };

        trace!("📖 read {} bytes, {} lines", builder.bytes, builder.lines);
        self.progress.update(builder.bytes as u64, builder.lines as u64);
        if builder.page.is_empty() {
            self.progress.finish();
            Ok(None)
        } else {
            Ok(Some(builder.page))
        }
    }
}
