//! Bounded handoff between the batch reader and the upsert workers.
//!
//! One [`QueueProducer`] feeds any number of cloned [`QueueConsumer`]s through a
//! fixed-capacity `crossbeam_channel`. Items arrive in the order they were put.
//! Termination is signalled in-band with [`QueueItem::EndOfStream`], one marker per
//! consumer.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};
use tokio_util::sync::CancellationToken;

use crate::models::Batch;

/// A unit of work on the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Batch(Batch),
    /// No more batches will follow for the consumer that receives this.
    EndOfStream,
}

/// A rejected put. The item is handed back so it can be offered again.
#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error("queue stayed full until the timeout elapsed")]
    Full(QueueItem),

    #[error("every consumer has gone away")]
    Disconnected(QueueItem),
}

impl PutError {
    pub fn into_inner(self) -> QueueItem {
        match self {
            PutError::Full(item) | PutError::Disconnected(item) => item,
        }
    }
}

pub struct BatchQueue;

impl BatchQueue {
    /// Create a queue holding at most `capacity` items. A capacity of zero is
    /// raised to one; a rendezvous channel would stall the reader's full check.
    pub fn bounded(capacity: usize) -> (QueueProducer, QueueConsumer) {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        let alive = Arc::new(());
        let consumers = Arc::downgrade(&alive);
        (
            QueueProducer {
                tx,
                capacity,
                consumers,
            },
            QueueConsumer { rx, _alive: alive },
        )
    }
}

/// Sending half. There is exactly one per queue.
pub struct QueueProducer {
    tx: Sender<QueueItem>,
    capacity: usize,
    consumers: Weak<()>,
}

impl QueueProducer {
    /// Offer `item`, waiting at most `timeout` for space.
    pub fn put(&self, item: QueueItem, timeout: Duration) -> Result<(), PutError> {
        self.tx.send_timeout(item, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(item) => PutError::Full(item),
            SendTimeoutError::Disconnected(item) => PutError::Disconnected(item),
        })
    }

    /// Block until `item` is accepted or every consumer is gone.
    pub fn put_blocking(&self, item: QueueItem) -> Result<(), PutError> {
        self.tx
            .send(item)
            .map_err(|e| PutError::Disconnected(e.into_inner()))
    }

    /// Sleep in `poll` steps while the queue is full. Returns `false` if
    /// `cancel` fired first. Returns `true` once every consumer is gone, so the
    /// next put reports the disconnect instead of waiting forever.
    pub fn wait_for_space(&self, cancel: &CancellationToken, poll: Duration) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            if !self.is_full() || !self.has_consumers() {
                return true;
            }
            thread::sleep(poll);
        }
    }

    /// Push `markers` end-of-stream markers and close the queue. Returns how many
    /// were accepted, which is fewer only when every consumer has gone away.
    pub fn finish(self, markers: usize) -> usize {
        let mut pushed = 0;
        for _ in 0..markers {
            if self.put_blocking(QueueItem::EndOfStream).is_err() {
                break;
            }
            pushed += 1;
        }
        pushed
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn has_consumers(&self) -> bool {
        self.consumers.strong_count() > 0
    }
}

#[cfg(test)]
impl QueueProducer {
    /// A second sender on the same channel, for tests that race the reader.
    pub(crate) fn duplicate(&self) -> QueueProducer {
        QueueProducer {
            tx: self.tx.clone(),
            capacity: self.capacity,
            consumers: self.consumers.clone(),
        }
    }
}

/// Receiving half, cloned once per worker.
#[derive(Clone)]
pub struct QueueConsumer {
    rx: Receiver<QueueItem>,
    _alive: Arc<()>,
}

impl QueueConsumer {
    /// Block for the next item. A closed and drained queue reads as end-of-stream,
    /// so a reader that died without finishing still releases its workers.
    pub fn get(&self) -> QueueItem {
        self.rx.recv().unwrap_or(QueueItem::EndOfStream)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
