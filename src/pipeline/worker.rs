//! Upsert workers: N consumers that push batches to the remote namespace.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::queue::{QueueConsumer, QueueItem};
use crate::error::IngestError;
use crate::models::Batch;
use crate::services::RemoteStore;
use crate::utils::Progress;

/// Totals across every worker of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub batches_upserted: u64,
    pub batches_failed: u64,
    /// Dequeued after cancellation and never sent.
    pub batches_dropped: u64,
    pub rows_upserted: u64,
    pub panicked_workers: usize,
}

#[derive(Debug, Default)]
struct Counters {
    upserted: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    rows: AtomicU64,
}

/// Handles of running upsert workers.
pub struct UpsertWorkerPool {
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl UpsertWorkerPool {
    /// Start `workers` threads named `upsert-worker-{i}`, all sharing `store`.
    ///
    /// Each worker exits on its first end-of-stream marker. After `cancel` fires
    /// workers keep dequeuing but drop batches unsent, so the reader can still
    /// deliver its markers.
    pub fn spawn(
        workers: usize,
        store: Arc<dyn RemoteStore>,
        consumer: QueueConsumer,
        cancel: CancellationToken,
        progress: Progress,
    ) -> Result<Self, IngestError> {
        if workers == 0 {
            return Err(IngestError::SpawnError(
                "at least one upsert worker is required".to_string(),
            ));
        }

        let counters = Arc::new(Counters::default());
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let worker = Worker {
                id: worker_id,
                store: Arc::clone(&store),
                consumer: consumer.clone(),
                cancel: cancel.clone(),
                progress: progress.clone(),
                counters: Arc::clone(&counters),
            };

            let handle = thread::Builder::new()
                .name(format!("upsert-worker-{worker_id}"))
                .spawn(move || worker.run())
                .map_err(|e| IngestError::SpawnError(format!("upsert-worker-{worker_id}: {e}")))?;

            handles.push(handle);
        }

        Ok(Self {
            workers: handles,
            counters,
        })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to exit and collect the totals.
    pub fn join(self) -> PoolSummary {
        let mut panicked_workers = 0;
        for (worker_id, handle) in self.workers.into_iter().enumerate() {
            if handle.join().is_err() {
                error!(worker = worker_id, "upsert worker panicked");
                panicked_workers += 1;
            }
        }

        PoolSummary {
            batches_upserted: self.counters.upserted.load(Ordering::Relaxed),
            batches_failed: self.counters.failed.load(Ordering::Relaxed),
            batches_dropped: self.counters.dropped.load(Ordering::Relaxed),
            rows_upserted: self.counters.rows.load(Ordering::Relaxed),
            panicked_workers,
        }
    }
}

struct Worker {
    id: usize,
    store: Arc<dyn RemoteStore>,
    consumer: QueueConsumer,
    cancel: CancellationToken,
    progress: Progress,
    counters: Arc<Counters>,
}

impl Worker {
    fn run(self) {
        loop {
            let batch = match self.consumer.get() {
                QueueItem::Batch(batch) => batch,
                QueueItem::EndOfStream => break,
            };

            if self.cancel.is_cancelled() {
                debug!(worker = self.id, ids = %batch.id_range(), "dropping batch after cancellation");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            self.upsert(&batch);
        }
        debug!(worker = self.id, "upsert worker finished");
    }

    fn upsert(&self, batch: &Batch) {
        let range = batch.id_range();
        match self.store.upsert(batch) {
            Ok(()) => {
                self.counters.upserted.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .rows
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                self.progress.println(format!("Completed {range}"));
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker = self.id,
                    namespace = self.store.namespace(),
                    ids = %range,
                    error = %e,
                    "failed to upsert batch"
                );
                self.progress
                    .println(format!("Failed to upsert batch: {range}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteStoreError;
    use crate::models::{AttributeColumns, QuerySpec, RowId};
    use crate::pipeline::queue::{BatchQueue, QueueProducer};
    use crate::services::RowIter;
    use crate::services::testing::RecordingStore;
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(10);

    fn push_batches(producer: &QueueProducer, offsets: &[u64]) {
        for &offset in offsets {
            let batch = Batch::sequential(
                offset,
                vec![vec![0.0, 1.0], vec![1.0, 0.0]],
                AttributeColumns::new(),
            )
            .unwrap();
            producer.put_blocking(QueueItem::Batch(batch)).unwrap();
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let (_producer, consumer) = BatchQueue::bounded(1);
        let result = UpsertWorkerPool::spawn(
            0,
            Arc::new(RecordingStore::default()),
            consumer,
            CancellationToken::new(),
            Progress::hidden(),
        );
        assert!(matches!(result, Err(IngestError::SpawnError(_))));
    }

    #[test]
    fn test_failed_batch_does_not_stop_the_pool() {
        let store = Arc::new(RecordingStore::failing_on([RowId::Num(2)]));
        let (producer, consumer) = BatchQueue::bounded(8);
        let (progress, lines) = Progress::capturing();

        let pool = UpsertWorkerPool::spawn(
            2,
            store.clone(),
            consumer,
            CancellationToken::new(),
            progress,
        )
        .unwrap();
        push_batches(&producer, &[0, 2, 4, 6]);
        producer.finish(2);
        let summary = pool.join();

        assert_eq!(summary.batches_upserted, 3);
        assert_eq!(summary.batches_failed, 1);
        assert_eq!(summary.rows_upserted, 6);
        assert_eq!(store.attempts().len(), 4);

        let lines = lines.lock().unwrap();
        assert!(lines.contains(&"Failed to upsert batch: 2..3".to_string()));
        assert!(lines.contains(&"Completed 0..1".to_string()));
        assert!(lines.contains(&"Completed 6..7".to_string()));
    }

    #[test]
    fn test_cancelled_workers_drain_without_upserting() {
        let store = Arc::new(RecordingStore::default());
        let (producer, consumer) = BatchQueue::bounded(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        push_batches(&producer, &[0, 2]);
        let pool =
            UpsertWorkerPool::spawn(1, store.clone(), consumer, cancel, Progress::hidden()).unwrap();
        assert_eq!(producer.finish(1), 1);
        let summary = pool.join();

        assert_eq!(summary.batches_dropped, 2);
        assert_eq!(summary.batches_upserted, 0);
        assert!(store.attempts().is_empty());
    }

    #[test]
    fn test_every_worker_stops_on_its_marker() {
        for workers in 1..=4 {
            let (producer, consumer) = BatchQueue::bounded(1);
            let pool = UpsertWorkerPool::spawn(
                workers,
                Arc::new(RecordingStore::default()),
                consumer,
                CancellationToken::new(),
                Progress::hidden(),
            )
            .unwrap();
            assert_eq!(pool.len(), workers);
            assert_eq!(producer.finish(workers), workers);
            assert_eq!(pool.join(), PoolSummary::default());
        }
    }

    #[test]
    fn test_slow_store_still_sees_every_batch() {
        let store = Arc::new(RecordingStore {
            delay: Some(TICK),
            ..Default::default()
        });
        let (producer, consumer) = BatchQueue::bounded(2);
        let pool = UpsertWorkerPool::spawn(
            3,
            store.clone(),
            consumer,
            CancellationToken::new(),
            Progress::hidden(),
        )
        .unwrap();

        push_batches(&producer, &[0, 2, 4, 6, 8, 10]);
        producer.finish(3);
        let summary = pool.join();

        let mut firsts: Vec<RowId> = store.attempts().iter().map(|ids| ids[0].clone()).collect();
        firsts.sort();
        assert_eq!(firsts, [0, 2, 4, 6, 8, 10].map(RowId::Num).to_vec());
        assert_eq!(summary.batches_upserted, 6);
    }

    struct PanickingStore;

    impl RemoteStore for PanickingStore {
        fn namespace(&self) -> &str {
            "test"
        }
        fn exists(&self) -> Result<bool, RemoteStoreError> {
            Ok(false)
        }
        fn approx_count(&self) -> Result<u64, RemoteStoreError> {
            Ok(0)
        }
        fn dimensions(&self) -> Result<usize, RemoteStoreError> {
            Ok(0)
        }
        fn delete_all(&self) -> Result<(), RemoteStoreError> {
            Ok(())
        }
        fn upsert(&self, _batch: &Batch) -> Result<(), RemoteStoreError> {
            panic!("store exploded");
        }
        fn query(&self, _query: &QuerySpec) -> Result<RowIter<'_>, RemoteStoreError> {
            Ok(Box::new(std::iter::empty()))
        }
        fn list_all(&self) -> Result<RowIter<'_>, RemoteStoreError> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    #[test]
    fn test_panicking_worker_is_counted() {
        let (producer, consumer) = BatchQueue::bounded(4);
        push_batches(&producer, &[0]);
        let pool = UpsertWorkerPool::spawn(
            2,
            Arc::new(PanickingStore),
            consumer,
            CancellationToken::new(),
            Progress::hidden(),
        )
        .unwrap();

        producer.finish(2);
        let summary = pool.join();
        assert_eq!(summary.panicked_workers, 1);
        assert_eq!(summary.batches_upserted, 0);
    }
}
