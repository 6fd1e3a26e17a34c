//! Producer/consumer bulk load.
//!
//! One [`BatchReader`] thread turns shards into batches on a bounded queue; an
//! [`UpsertWorkerPool`] drains the queue into the remote namespace. Both observe
//! the same cancellation token. The [`Orchestrator`] wires them together.

mod orchestrator;
mod queue;
mod reader;
mod worker;

pub use orchestrator::{
    AssumeYes, CompletionGuard, Confirm, DELETE_PROMPT, Orchestrator, StdinConfirm,
};
pub use queue::{BatchQueue, PutError, QueueConsumer, QueueItem, QueueProducer};
pub use reader::{BatchReader, ReaderSettings, ReaderStats};
pub use worker::{PoolSummary, UpsertWorkerPool};
