//! batch-migrate CLI
//!
//! Runs one migration described by a YAML configuration file.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rust_batch_migrator::prelude::*;

/// Copy tabular data between CSV/XML files and database tables in batches.
#[derive(Parser)]
#[command(name = "batch-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Migration configuration file (YAML).
    #[arg(short, long, env = "BATCH_MIGRATE_CONFIG")]
    config: PathBuf,

    /// Records per batch, overriding migration.batch_size.
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Validate the configuration and exit without migrating.
    #[arg(long)]
    check: bool,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(batch_size) = cli.batch_size {
        config.migration.batch_size = batch_size;
    }

    let descriptor = config.into_descriptor().context("invalid configuration")?;
    if cli.check {
        info!(
            source = %descriptor.source.kind(),
            target = %descriptor.target.kind(),
            "Configuration is valid"
        );
        return Ok(());
    }

    let report = migrate(descriptor).await?;
    info!(
        records = report.records_migrated,
        batches = report.batches_flushed,
        failed_batches = report.batches_failed,
        table_created = report.table_created,
        "Done"
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Migration failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
