//! 🚀 esx: bulk-write records into a document search service, and scroll them back out.
//!
//! The library is layered leaves-first:
//! - [`settings`]: the typed view over the flat `es.*` configuration.
//! - [`record`] and [`extract`]: what a record is, and how its metadata is pulled out of it.
//! - [`bulk`]: command rendering, batching, and the retrying bulk writer.
//! - [`scroll`]: the cursor-based reader.
//! - [`transport`]: HTTP and in-memory clusters behind one trait.
//! - [`run`]: the whole job, file to service or service to file, with parallel workers.

pub mod app_config;
pub mod bulk;
pub mod error;
pub mod extract;
pub mod record;
pub mod scroll;
pub mod settings;
pub mod transport;

mod backends;
mod progress;
mod supervisors;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::app_config::AppConfig;
use crate::extract::ExtractorRegistry;
use crate::supervisors::Supervisor;
use crate::transport::Transport;

pub use supervisors::{ReadSummary, WriteSummary};

/// 🧭 Which way the data flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 📥 `job.input` file → service
    Write,
    /// 📤 service → `job.output` file
    Read,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunSummary {
    Write(WriteSummary),
    Read(ReadSummary),
}

/// 🚀 Run one job with the stock extractors.
pub async fn run<T: Transport + 'static>(
    app_config: AppConfig,
    direction: Direction,
    transport: T,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    run_with_registry(app_config, direction, transport, ExtractorRegistry::new(), cancel).await
}

/// 🚀 Run one job with custom extractors or index formatters registered by name.
pub async fn run_with_registry<T: Transport + 'static>(
    app_config: AppConfig,
    direction: Direction,
    transport: T,
    registry: ExtractorRegistry,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let supervisor = Supervisor::new(app_config, Arc::new(transport), registry, cancel);
    match direction {
        Direction::Write => supervisor.write().await.map(RunSummary::Write),
        Direction::Read => supervisor.read().await.map(RunSummary::Read),
    }
}
