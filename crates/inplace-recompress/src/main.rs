#![warn(missing_docs)]
//! inplace-recompress command-line entry point

mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use inplace_recompress::{run, RunControl, RunOutcome};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::Cli;

const EXIT_STARTUP: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match execute(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(EXIT_STARTUP);
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<i32> {
    let config = cli.run_config().context("invalid configuration")?;
    let root = cli.root.clone();

    let control = Arc::new(RunControl::new());
    let listener = control.spawn_interrupt_listener();
    let report = run(&root, config, Arc::clone(&control)).await;
    listener.abort();
    let report = report.context("recompression run failed to start")?;

    let stats = report.stats;
    println!(
        "Processed {} files, {} bytes",
        stats.processed_files, stats.processed_bytes
    );
    println!(
        "Skipped {} files, {} bytes",
        stats.skipped_files, stats.skipped_bytes
    );
    if stats.failed_files > 0 {
        println!("Failed {} files", stats.failed_files);
    }

    match report.outcome {
        RunOutcome::Completed => tracing::info!("Run complete"),
        RunOutcome::Interrupted => tracing::warn!(
            "Run interrupted, rerun the same command to resume{}",
            if report.ledger_kept { "" } else { " (resume disabled, progress not saved)" }
        ),
        RunOutcome::InterruptedWithErrors => tracing::error!(
            failed = stats.failed_files,
            "Run interrupted after file errors, rerun the same command to resume"
        ),
        RunOutcome::CompletedWithErrors => tracing::error!(
            failed = stats.failed_files,
            "Run finished with errors, rerun to retry the failed files"
        ),
        RunOutcome::Aborted => tracing::error!(
            "Run aborted due to a file error before the whole tree was processed"
        ),
    }

    Ok(report.outcome.exit_code())
}
