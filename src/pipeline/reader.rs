//! The single producer: turns ordered shards into batches on the queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::queue::{PutError, QueueItem, QueueProducer};
use crate::sources::FileLoader;
use crate::utils::Progress;

/// Knobs for one reader run.
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    /// Number of end-of-stream markers pushed at shutdown, one per worker.
    pub workers: usize,
    /// Files whose whole row range lies below this offset are skipped.
    pub start_offset: u64,
    /// Upper bound on how long any wait goes without checking cancellation.
    pub poll_interval: Duration,
}

/// What the reader did before it shut down.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderStats {
    pub files_loaded: u64,
    pub files_skipped: u64,
    /// Running offset after the last file handled.
    pub final_offset: u64,
    /// Full cause chain of the read failure that stopped the reader, if any.
    pub failure: Option<String>,
    pub cancelled: bool,
    /// End-of-stream markers actually delivered.
    pub markers_pushed: usize,
}

enum Offer {
    Accepted,
    Cancelled,
    Disconnected,
}

pub struct BatchReader {
    files: Vec<PathBuf>,
    loader: Arc<dyn FileLoader>,
    producer: QueueProducer,
    cancel: CancellationToken,
    progress: Progress,
    settings: ReaderSettings,
}

impl BatchReader {
    pub fn new(
        files: Vec<PathBuf>,
        loader: Arc<dyn FileLoader>,
        producer: QueueProducer,
        cancel: CancellationToken,
        progress: Progress,
        settings: ReaderSettings,
    ) -> Self {
        Self {
            files,
            loader,
            producer,
            cancel,
            progress,
            settings,
        }
    }

    /// Read every file in order, then push one end-of-stream marker per worker.
    ///
    /// The markers are pushed whether the reader ran out of files, hit a read
    /// failure, or was cancelled.
    pub fn run(self) -> ReaderStats {
        let mut stats = ReaderStats::default();

        if let Err(e) = self.read_all(&mut stats) {
            let cause = format!("{e:#}");
            error!(error = %cause, offset = stats.final_offset, "failed to read batch");
            self.progress.println(format!("Failed to read batch: {cause}"));
            stats.failure = Some(cause);
        }

        stats.cancelled = self.cancel.is_cancelled();
        stats.markers_pushed = self.producer.finish(self.settings.workers);
        if stats.markers_pushed < self.settings.workers {
            warn!(
                pushed = stats.markers_pushed,
                workers = self.settings.workers,
                "upsert workers went away before every end-of-stream marker was delivered"
            );
        }
        debug!(?stats, "batch reader finished");
        stats
    }

    fn read_all(&self, stats: &mut ReaderStats) -> anyhow::Result<()> {
        for path in &self.files {
            if self.cancel.is_cancelled() {
                break;
            }

            let start = stats.final_offset;

            if start < self.settings.start_offset {
                let rows = self
                    .loader
                    .row_count(path)
                    .with_context(|| format!("failed to read row count of {}", path.display()))?;
                if start + rows <= self.settings.start_offset {
                    self.skipped(path, start, rows, stats);
                    continue;
                }
            }

            if !self
                .producer
                .wait_for_space(&self.cancel, self.settings.poll_interval)
            {
                break;
            }

            let loaded = self
                .loader
                .load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            let rows = loaded.num_rows() as u64;
            if rows == 0 {
                self.skipped(path, start, 0, stats);
                continue;
            }

            let batch = loaded
                .into_batch(start)
                .with_context(|| format!("invalid batch in {}", path.display()))?;

            match self.offer(QueueItem::Batch(batch)) {
                Offer::Accepted => {}
                Offer::Cancelled => break,
                Offer::Disconnected => {
                    warn!(file = %path.display(), "no upsert workers left, stopping reader");
                    break;
                }
            }

            stats.final_offset = start + rows;
            stats.files_loaded += 1;
            self.progress.println(format!(
                "Loaded {}, offset from {} to {}",
                path.display(),
                start,
                start + rows
            ));
            self.progress.file_done();
        }
        Ok(())
    }

    fn skipped(&self, path: &Path, start: u64, rows: u64, stats: &mut ReaderStats) {
        stats.final_offset = start + rows;
        stats.files_skipped += 1;
        self.progress.println(format!(
            "Skipped {}, offset from {} to {}",
            path.display(),
            start,
            start + rows
        ));
        self.progress.file_done();
    }

    /// Retry a timed put until it lands, re-checking cancellation between tries.
    fn offer(&self, mut item: QueueItem) -> Offer {
        loop {
            if self.cancel.is_cancelled() {
                return Offer::Cancelled;
            }
            match self.producer.put(item, self.settings.poll_interval) {
                Ok(()) => return Offer::Accepted,
                Err(PutError::Full(rejected)) => item = rejected,
                Err(PutError::Disconnected(_)) => return Offer::Disconnected,
            }
        }
    }
}
