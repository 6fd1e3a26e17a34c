use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use vecload::cli::Cli;
use vecload::cli::commands::{SHUTDOWN_GRACE, handle_ingest, run_until_signal};
use vecload::models::Config;
use vecload::utils::Progress;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before parsing so `.env` can supply TURBOPUFFER_API_KEY.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load().context("failed to load config")?;
    cli.apply_to(&mut config);
    config.validate().context("invalid configuration")?;

    let cancel = CancellationToken::new();
    let job = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || handle_ingest(cli, config, cancel)
    });

    let status = run_until_signal(
        job,
        shutdown_signal(),
        cancel,
        SHUTDOWN_GRACE,
        &Progress::hidden(),
    )
    .await?;
    if status != 0 {
        std::process::exit(status);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
