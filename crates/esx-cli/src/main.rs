//! 🚀 esx-cli: loads the config, picks a transport, runs the job, prints what happened.
//!
//! ```text
//! esx write --config job.toml --input people.ndjson
//! esx read  --config job.toml --output people.ndjson
//! esx write --config job.toml --dry-run      # against an in-memory cluster
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL_CONDENSED};
use esx::app_config::{AppConfig, load_config};
use esx::error::ConnectorError;
use esx::transport::{HttpTransport, InMemoryCluster, TransportBackend};
use esx::{Direction, ReadSummary, RunSummary, WriteSummary};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "esx", version, about = "Bulk-write NDJSON into a search cluster, or scroll it back out")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 📥 NDJSON file → cluster
    Write {
        #[command(flatten)]
        common: CommonArgs,
        /// overrides `job.input`
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// 📤 cluster → NDJSON file
    Read {
        #[command(flatten)]
        common: CommonArgs,
        /// overrides `job.output`
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// TOML config file; `ESX_*` environment variables are layered on top
    #[arg(long, short, default_value = "esx.toml")]
    config: PathBuf,
    /// talk to an in-memory cluster instead of the network
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(err) = result {
        error!("💀 error: {}", err);
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        if looks_like_connectivity(&err) {
            error!(
                "🔧 hint: the cluster does not look reachable. Check `es.nodes` / `es.port`, any \
                proxy settings, and that the service is actually up (`docker ps` if it runs in a \
                container). `--dry-run` exercises everything but the network."
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let (direction, common, input, output) = match cli.command {
        Command::Write { common, input } => (Direction::Write, common, input, None),
        Command::Read { common, output } => (Direction::Read, common, None, output),
    };

    let config_file = common
        .config
        .try_exists()
        .with_context(|| format!("💀 could not check whether '{}' exists", common.config.display()))?
        .then_some(common.config.as_path());
    if config_file.is_none() {
        warn!(
            "📋 no config file at '{}'; using ESX_* environment variables only",
            common.config.display()
        );
    }
    let mut app_config = load_config(config_file).context("💀 esx could not load its configuration")?;
    if input.is_some() {
        app_config.job.input = input;
    }
    if output.is_some() {
        app_config.job.output = output;
    }

    let transport = transport_for(&app_config, common.dry_run)?;
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 ctrl-c: stopping at the next attempt boundary");
            on_ctrl_c.cancel();
        }
    });

    let summary = esx::run(app_config, direction, transport, cancel).await?;
    println!("{}", summary_table(&summary));
    Ok(())
}

/// 🔌 A transport failure anywhere in the chain, or a cause that reads like one.
fn looks_like_connectivity(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if cause
            .downcast_ref::<ConnectorError>()
            .is_some_and(ConnectorError::is_retryable)
        {
            return true;
        }
        let cause = cause.to_string().to_lowercase();
        cause.contains("error sending request")
            || cause.contains("connection refused")
            || cause.contains("tcp connect error")
            || cause.contains("dns error")
            || cause.contains("timed out")
    })
}

fn transport_for(app_config: &AppConfig, dry_run: bool) -> Result<TransportBackend> {
    if dry_run {
        info!("🧪 dry run: nothing leaves this process");
        return Ok(TransportBackend::InMemory(InMemoryCluster::new()));
    }
    let http = HttpTransport::from_settings(&app_config.settings_view())
        .context("💀 the HTTP transport could not be built from the es.* settings")?;
    Ok(TransportBackend::Http(http))
}

fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    let mut row = |label: &str, value: String| {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    };
    match summary {
        RunSummary::Write(WriteSummary {
            stats,
            malformed,
            workers,
            elapsed,
        }) => {
            row("records read", stats.records.to_string());
            row("committed", stats.committed.to_string());
            row("ignored (already existed)", stats.ignored.to_string());
            row("failed entries", stats.entry_failures.to_string());
            row("skipped: no metadata", stats.extraction_failures.to_string());
            row("skipped: oversize", stats.oversize.to_string());
            row("skipped: not JSON", malformed.to_string());
            row("batches / submissions", format!("{} / {}", stats.batches, stats.submissions));
            row("bytes sent", stats.bytes_sent.to_string());
            row("workers", workers.to_string());
            row("elapsed", format_elapsed(*elapsed));
        }
        RunSummary::Read(ReadSummary {
            documents,
            bytes,
            readers,
            elapsed,
        }) => {
            row("documents", documents.to_string());
            row("bytes written", bytes.to_string());
            row("scroll slices", readers.to_string());
            row("elapsed", format_elapsed(*elapsed));
        }
    }
    table
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use esx::error::ConfigError;

    #[test]
    fn the_one_where_a_dead_cluster_earns_the_connectivity_hint() {
        let dead = Err::<(), _>(ConnectorError::Transport(
            "POST _bulk failed on every node after 3 attempt(s)".to_string(),
        ))
        .context("💀 write worker 0 stopped after 12 records")
        .expect_err("💀 it was built to fail");
        assert!(looks_like_connectivity(&dead));

        let misconfigured = Err::<(), _>(ConnectorError::Config(ConfigError::Incompatible(
            "a delete cannot carry an update script".to_string(),
        )))
        .context("💀 bad settings")
        .expect_err("💀 it was built to fail");
        assert!(!looks_like_connectivity(&misconfigured));
    }
}
