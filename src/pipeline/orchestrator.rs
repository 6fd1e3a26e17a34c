//! Coordinates a full load: discover, sort, preflight, run, await, report.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::queue::BatchQueue;
use super::reader::{BatchReader, ReaderSettings, ReaderStats};
use super::worker::UpsertWorkerPool;
use crate::error::IngestError;
use crate::models::{PipelineConfig, RunReport};
use crate::services::RemoteStore;
use crate::sources::FileLoader;
use crate::utils::{Progress, discover_input_files};

pub const DELETE_PROMPT: &str = "Delete namespace? [y/N]: ";

/// Decides whether an existing namespace may be wiped.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Asks on the terminal. Only `y` (any case) counts as yes.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt}");
        if std::io::stdout().flush().is_err() {
            return false;
        }

        let mut input = String::new();
        match std::io::stdin().read_line(&mut input) {
            Ok(_) => input.trim().eq_ignore_ascii_case("y"),
            Err(e) => {
                warn!(error = %e, "could not read confirmation");
                false
            }
        }
    }
}

/// Answers yes without asking (`--yes`).
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Prints the completion marker and elapsed time when dropped, so the lines
/// appear on every way out of a run, unwinding included.
pub struct CompletionGuard {
    started: Instant,
    progress: Progress,
}

impl CompletionGuard {
    pub fn new(started: Instant, progress: Progress) -> Self {
        Self { started, progress }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.progress.finish();
        self.progress.println("DONE!");
        self.progress.println(format!(
            "Took: {:.3} seconds",
            self.started.elapsed().as_secs_f64()
        ));
    }
}

pub struct Orchestrator {
    store: Arc<dyn RemoteStore>,
    loader: Arc<dyn FileLoader>,
    pipeline: PipelineConfig,
    cancel: CancellationToken,
    progress: Option<Progress>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        loader: Arc<dyn FileLoader>,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            store,
            loader,
            pipeline,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Use `cancel` instead of a private token, so a signal handler can stop the run.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Print through `progress` instead of a bar sized at run time.
    #[must_use]
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    fn say(&self, line: impl AsRef<str>) {
        match &self.progress {
            Some(progress) => progress.println(line),
            None => println!("{}", line.as_ref()),
        }
    }

    /// Discover the shards under `input_folder`, clear the namespace if the
    /// user agrees, then load everything.
    pub fn execute(
        &self,
        input_folder: &Path,
        confirm: &dyn Confirm,
    ) -> Result<RunReport, IngestError> {
        let files = discover_input_files(input_folder, &self.pipeline.file_pattern)?;
        info!(files = files.len(), folder = %input_folder.display(), "discovered input shards");

        self.preflight(confirm)?;
        self.run(files)
    }

    /// Refuse to load into a non-empty namespace unless `confirm` agrees to
    /// delete it first.
    pub fn preflight(&self, confirm: &dyn Confirm) -> Result<(), IngestError> {
        let Some(existing) = self.store.info()? else {
            return Ok(());
        };

        self.say(format!(
            "The namespace \"{}\" already exists!",
            existing.name
        ));
        self.say(format!(
            "Vectors: {}, dimensions: {}",
            existing.approx_count, existing.dimensions
        ));

        if !confirm.confirm(DELETE_PROMPT) {
            self.say("Cancelled");
            return Err(IngestError::Aborted(existing.name));
        }

        self.store.delete_all()?;
        info!(namespace = %existing.name, "deleted existing namespace");
        Ok(())
    }

    /// Run the reader and the worker pool over `files`, already in shard order.
    pub fn run(&self, files: Vec<PathBuf>) -> Result<RunReport, IngestError> {
        let files_total = files.len() as u64;
        let progress = self
            .progress
            .clone()
            .unwrap_or_else(|| Progress::new(files_total));
        let workers = self.pipeline.workers;

        let started = Instant::now();
        let _completion = CompletionGuard::new(started, progress.clone());

        let (producer, consumer) = BatchQueue::bounded(self.pipeline.queue_capacity);
        let reader = BatchReader::new(
            files,
            Arc::clone(&self.loader),
            producer,
            self.cancel.clone(),
            progress.clone(),
            ReaderSettings {
                workers,
                start_offset: self.pipeline.start_offset,
                poll_interval: self.pipeline.poll_interval(),
            },
        );

        let reader_handle = thread::Builder::new()
            .name("batch-reader".to_string())
            .spawn(move || reader.run())
            .map_err(|e| IngestError::SpawnError(format!("batch-reader: {e}")))?;

        let pool = match UpsertWorkerPool::spawn(
            workers,
            Arc::clone(&self.store),
            consumer,
            self.cancel.clone(),
            progress,
        ) {
            Ok(pool) => pool,
            Err(e) => {
                self.cancel.cancel();
                let _ = reader_handle.join();
                return Err(e);
            }
        };

        let reader_stats = reader_handle.join().unwrap_or_else(|_| {
            error!("batch reader panicked");
            ReaderStats {
                failure: Some("batch reader panicked".to_string()),
                ..Default::default()
            }
        });
        let summary = pool.join();

        Ok(RunReport {
            namespace: self.store.namespace().to_string(),
            files_total,
            files_loaded: reader_stats.files_loaded,
            files_skipped: reader_stats.files_skipped,
            batches_upserted: summary.batches_upserted,
            batches_failed: summary.batches_failed,
            batches_dropped: summary.batches_dropped,
            rows_upserted: summary.rows_upserted,
            final_offset: reader_stats.final_offset,
            read_failure: reader_stats.failure,
            cancelled: reader_stats.cancelled || self.cancel.is_cancelled(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RowId;
    use crate::services::testing::RecordingStore;
    use crate::sources::testing::{vectors, write_shard};
    use crate::sources::{ColumnSelection, ParquetLoader};
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;

    fn pipeline(workers: usize) -> PipelineConfig {
        PipelineConfig {
            workers,
            poll_interval_ms: 10,
            ..Default::default()
        }
    }

    fn loader() -> Arc<dyn FileLoader> {
        Arc::new(ParquetLoader::new(ColumnSelection::new("emb").with_id("id")))
    }

    fn assert_completion_lines(lines: &[String]) {
        let done = lines.iter().position(|l| l == "DONE!").unwrap();
        assert!(lines[done + 1].starts_with("Took: "));
        assert!(lines[done + 1].ends_with(" seconds"));
    }

    fn write_shards(dir: &Path, count: usize, rows: usize) {
        for i in 0..count {
            let path = dir.join(format!("shard_{i}.parquet"));
            write_shard(&path, &vectors(i * rows, rows), None, &[]);
        }
    }

    #[test]
    fn test_three_shards_one_worker() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(dir.path(), 3, 2);

        let store = Arc::new(RecordingStore::default());
        let (progress, lines) = Progress::capturing();
        let orchestrator =
            Orchestrator::new(store.clone(), loader(), pipeline(1)).with_progress(progress);

        let report = orchestrator.execute(dir.path(), &AssumeYes).unwrap();

        let ids = |range: std::ops::Range<u64>| range.map(RowId::Num).collect::<Vec<_>>();
        assert_eq!(store.attempts(), vec![ids(0..2), ids(2..4), ids(4..6)]);
        assert_eq!(report.files_total, 3);
        assert_eq!(report.files_loaded, 3);
        assert_eq!(report.batches_upserted, 3);
        assert_eq!(report.rows_upserted, 6);
        assert_eq!(report.final_offset, 6);
        assert!(report.is_complete());
        assert!(report.elapsed_secs >= 0.0);

        let lines = lines.lock().unwrap();
        assert!(lines.contains(&"Completed 0..1".to_string()));
        assert!(lines.contains(&"Completed 4..5".to_string()));
        assert_completion_lines(&lines);
    }

    #[test]
    fn test_start_offset_skips_leading_shards() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(dir.path(), 3, 2);

        let store = Arc::new(RecordingStore::default());
        let config = PipelineConfig {
            start_offset: 4,
            ..pipeline(2)
        };
        let report = Orchestrator::new(store.clone(), loader(), config)
            .with_progress(Progress::hidden())
            .execute(dir.path(), &AssumeYes)
            .unwrap();

        assert_eq!(store.attempts(), vec![vec![RowId::Num(4), RowId::Num(5)]]);
        assert_eq!(report.files_skipped, 2);
        assert_eq!(report.final_offset, 6);
    }

    #[test]
    fn test_no_input_files_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordingStore::with_existing(10, 2));
        let never = |_: &str| -> bool { panic!("must not prompt") };

        let result = Orchestrator::new(store.clone(), loader(), pipeline(1))
            .with_progress(Progress::hidden())
            .execute(dir.path(), &never);

        assert!(matches!(result, Err(IngestError::NoFilesFound(_))));
        assert!(!store.was_deleted());
        assert!(store.attempts().is_empty());
    }

    #[test]
    fn test_preflight_declined() {
        let store = Arc::new(RecordingStore::with_existing(120, 768));
        let (progress, lines) = Progress::capturing();
        let prompts = Mutex::new(Vec::new());
        let decline = |prompt: &str| {
            prompts.lock().unwrap().push(prompt.to_string());
            false
        };

        let result = Orchestrator::new(store.clone(), loader(), pipeline(1))
            .with_progress(progress)
            .preflight(&decline);

        assert!(matches!(result, Err(IngestError::Aborted(name)) if name == "test"));
        assert!(!store.was_deleted());
        assert_eq!(*prompts.lock().unwrap(), vec![DELETE_PROMPT.to_string()]);
        assert_eq!(
            *lines.lock().unwrap(),
            vec![
                "The namespace \"test\" already exists!",
                "Vectors: 120, dimensions: 768",
                "Cancelled",
            ]
        );
    }

    #[test]
    fn test_preflight_accepted_deletes() {
        let store = Arc::new(RecordingStore::with_existing(120, 768));
        Orchestrator::new(store.clone(), loader(), pipeline(1))
            .with_progress(Progress::hidden())
            .preflight(&AssumeYes)
            .unwrap();
        assert!(store.was_deleted());
    }

    #[test]
    fn test_preflight_skips_prompt_for_new_namespace() {
        let store = Arc::new(RecordingStore::default());
        let never = |_: &str| -> bool { panic!("must not prompt") };
        Orchestrator::new(store.clone(), loader(), pipeline(1))
            .with_progress(Progress::hidden())
            .preflight(&never)
            .unwrap();
        assert!(!store.was_deleted());
    }

    #[test]
    fn test_unreadable_shard_stops_reading_but_finishes() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(dir.path(), 1, 2);
        fs::write(dir.path().join("shard_1.parquet"), b"not a parquet file").unwrap();
        write_shard(
            &dir.path().join("shard_2.parquet"),
            &vectors(4, 2),
            None,
            &[],
        );

        let store = Arc::new(RecordingStore::default());
        let report = Orchestrator::new(store.clone(), loader(), pipeline(4))
            .with_progress(Progress::hidden())
            .execute(dir.path(), &AssumeYes)
            .unwrap();

        assert_eq!(store.attempts().len(), 1);
        assert_eq!(report.files_loaded, 1);
        assert!(report.read_failure.unwrap().contains("shard_1.parquet"));
        assert!(!report.cancelled);
    }

    #[test]
    fn test_failed_upserts_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(dir.path(), 3, 2);

        let store = Arc::new(RecordingStore::failing_on([RowId::Num(2)]));
        let (progress, lines) = Progress::capturing();
        let report = Orchestrator::new(store.clone(), loader(), pipeline(2))
            .with_progress(progress)
            .execute(dir.path(), &AssumeYes)
            .unwrap();

        assert_eq!(store.attempts().len(), 3);
        assert_eq!(report.batches_upserted, 2);
        assert_eq!(report.batches_failed, 1);
        assert!(!report.is_complete());

        let lines = lines.lock().unwrap();
        assert!(lines.contains(&"Failed to upsert batch: 2..3".to_string()));
        assert_completion_lines(&lines);
    }

    #[test]
    fn test_cancelled_run_terminates() {
        let dir = tempfile::tempdir().unwrap();
        write_shards(dir.path(), 3, 2);

        let store = Arc::new(RecordingStore {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let (progress, lines) = Progress::capturing();
        let cancel = CancellationToken::new();
        let orchestrator = Orchestrator::new(store.clone(), loader(), pipeline(3))
            .with_progress(progress)
            .with_cancellation(cancel.clone());
        cancel.cancel();

        let report = orchestrator.execute(dir.path(), &AssumeYes).unwrap();
        assert!(report.cancelled);
        assert!(store.attempts().is_empty());
        assert_eq!(report.files_loaded, 0);
        assert_completion_lines(&lines.lock().unwrap());
    }
}
