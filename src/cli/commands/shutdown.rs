//! Racing a running load against a shutdown signal.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::utils::Progress;

/// How long an interrupted run gets to unwind before the process exits anyway.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub const INTERRUPTED_EXIT_CODE: i32 = 1;

/// Wait for `job` unless `signal` fires first, and return the exit status.
///
/// On a signal the run is cancelled and given `grace` to finish. A run that
/// unwinds prints its own completion lines; otherwise they are printed here.
/// Either way an interrupted run exits with [`INTERRUPTED_EXIT_CODE`].
pub async fn run_until_signal<T>(
    mut job: JoinHandle<Result<T>>,
    signal: impl Future<Output = ()>,
    cancel: CancellationToken,
    grace: Duration,
    progress: &Progress,
) -> Result<i32> {
    let started = Instant::now();

    tokio::select! {
        result = &mut job => {
            result.map_err(|e| anyhow!("ingest task failed: {e}"))??;
            Ok(0)
        }
        _ = signal => {
            eprintln!("\nReceived shutdown signal, cancelling...");
            cancel.cancel();
            if tokio::time::timeout(grace, &mut job).await.is_err() {
                warn!(grace_ms = grace.as_millis() as u64, "load did not stop within the grace period");
                progress.println("DONE!");
                progress.println(format!("Took: {:.3} seconds", started.elapsed().as_secs_f64()));
            }
            Ok(INTERRUPTED_EXIT_CODE)
        }
    }
}
