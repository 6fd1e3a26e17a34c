mod batch;
mod config;
mod query;
mod report;

pub use batch::{AttributeColumns, Batch, RowId};
pub use config::{
    ColumnConfig, Config, DEFAULT_API_URL, DEFAULT_FILE_PATTERN, DEFAULT_ID_COLUMN,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_VECTOR_COLUMN, DEFAULT_WORKERS,
    PipelineConfig, StoreConfig, StoreDriver,
};
pub use query::{DistanceMetric, QuerySpec, ResultRow};
pub use report::{NamespaceInfo, OutputFormat, RunReport};
