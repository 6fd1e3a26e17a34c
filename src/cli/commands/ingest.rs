//! Ingest command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::cli::output::get_formatter;
use crate::models::{Config, RunReport, StoreDriver};
use crate::pipeline::{AssumeYes, Confirm, Orchestrator, StdinConfirm};
use crate::services::create_backend;
use crate::sources::{ColumnSelection, ParquetLoader};

/// Run a full load for `cli` with an already merged and validated `config`.
///
/// Blocks for the whole run; call it off the async runtime.
pub fn handle_ingest(cli: Cli, config: Config, cancel: CancellationToken) -> Result<RunReport> {
    let formatter = get_formatter(cli.format.unwrap_or_default());

    let store = create_backend(&config.store, &cli.namespace).with_context(|| {
        format!(
            "failed to connect to namespace '{}' ({})",
            cli.namespace, config.store.driver
        )
    })?;
    let loader = Arc::new(ParquetLoader::new(ColumnSelection::from(&config.columns)));

    if cli.verbose {
        eprintln!("Namespace: {} ({})", cli.namespace, config.store.driver);
        eprintln!("  Input:   {}", cli.input_folder.display());
        eprintln!("  Workers: {}", config.pipeline.workers);
        eprintln!("  Queue:   {}", config.pipeline.queue_capacity);
        if config.pipeline.start_offset > 0 {
            eprintln!("  Start offset: {}", config.pipeline.start_offset);
        }
    }

    if config.store.driver == StoreDriver::Memory {
        let notice = formatter.format_message("Dry run: loading into an in-memory namespace");
        eprintln!("{}", notice.trim_end());
    }

    let orchestrator = Orchestrator::new(Arc::clone(&store), loader, config.pipeline.clone())
        .with_cancellation(cancel);

    let confirm: &dyn Confirm = if cli.yes { &AssumeYes } else { &StdinConfirm };
    let report = orchestrator.execute(&cli.input_folder, confirm)?;

    print!("{}", formatter.format_run_report(&report));

    if config.store.driver == StoreDriver::Memory || cli.verbose {
        let info = store
            .info()
            .context("failed to describe namespace after load")?;
        print!("{}", formatter.format_namespace_info(info.as_ref()));
    }

    Ok(report)
}
