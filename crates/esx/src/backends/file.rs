//! 📂 NDJSON files on local disk.
//!
//! 🚰 `FileSource`: pages lines out of a file, bounded by line count and by bytes. A `.gz`
//! suffix means the file is gunzipped on the way in.
//! 🗑️ `FileSink`: a buffered writer that appends whatever payload it is given and flushes on close.
//! `File::create` truncates. An existing output file is replaced.

mod file_sink;
mod file_source;

pub(crate) use file_sink::{FileSink, FileSinkConfig};
pub(crate) use file_source::{FileSource, FileSourceConfig};
