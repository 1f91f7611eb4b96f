//! 🧵 Workers: the tasks the supervisor spawns and then waits on.
//!
//! - `WriteWorker`: drains a channel of records into its own `RecordWriter`.
//! - `ScrollWorker`: owns one `ScrollReader` and pushes its pages into a channel, renewing the
//!   cursor while the channel is full.
//! - `SinkWorker`: drains pages of documents into a sink as NDJSON.
//!
//! Every worker watches the shared cancellation token, and the one that fails first cancels it.

use anyhow::Result;
use tokio::task::JoinHandle;

mod scroll_worker;
mod sink_worker;
mod write_worker;

pub(super) use scroll_worker::ScrollWorker;
pub(super) use sink_worker::{SinkStats, SinkWorker};
pub(super) use write_worker::WriteWorker;

/// 🏗️ A background task with a typed result.
pub(super) trait Worker {
    type Output: Send + 'static;

    fn start(self) -> JoinHandle<Result<Self::Output>>;
}
