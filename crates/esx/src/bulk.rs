//! 🚚 The write path, leaves first.
//!
//! ```text
//! Record ─▶ ExtractorChain ─▶ BulkCommandFactory ─▶ BatchAccumulator ─▶ RetryingBulkWriter ─▶ Transport
//!           (metadata)        (action + doc lines)   (bytes / count)      (verdicts, retries)
//! ```
//!
//! 🧠 Knowledge graph:
//! - `command`: renders one `BulkEntry` per record for the configured operation.
//! - `batch`: the accumulator with flush-before-insert and the oversize guard.
//! - `response`: parses the per-item bulk answer and classifies each status.
//! - `writer`: the two nested retry loops, cancellation, and detached refreshes.
//! - `record_writer`: glues the above into the per-task pipeline with running stats.

pub mod batch;
pub mod command;
pub mod record_writer;
pub mod response;
pub mod writer;

pub use batch::{Batch, BatchAccumulator};
pub use command::{BulkCommandFactory, BulkEntry};
pub use record_writer::{RecordWriter, WriteStats};
pub use response::{ItemOutcome, Verdict};
pub use writer::{RetryingBulkWriter, WriteReport, WriterOptions};
