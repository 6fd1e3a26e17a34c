//! Error types for the vecload bulk loader.

use thiserror::Error;

/// Errors raised while assembling a batch from column data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("vector at row {row} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate id in batch: {0}")]
    DuplicateId(String),
}

/// Errors related to reading input shards.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    #[error("column '{column}' not found (available: {available})")]
    MissingColumn { column: String, available: String },

    #[error("column '{column}' has unsupported type {data_type}")]
    UnsupportedColumnType { column: String, data_type: String },

    #[error("column '{column}' has a null value at row {row}")]
    NullValue { column: String, row: usize },

    #[error("column '{column}' has an invalid id at row {row}")]
    InvalidId { column: String, row: usize },

    #[error("invalid batch: {0}")]
    BatchError(#[from] BatchError),
}

/// Errors related to remote namespace operations.
#[derive(Debug, Error)]
pub enum RemoteStoreError {
    #[error("failed to connect to remote store: {0}")]
    ConnectionError(String),

    #[error("namespace error: {0}")]
    NamespaceError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("query error: {0}")]
    QueryError(String),

    #[error("delete error: {0}")]
    DeleteError(String),

    #[error("remote store client error: {0}")]
    ClientError(String),

    #[error("remote store returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("invalid response: {0}")]
    DecodeError(String),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Run-level errors. Only these abort an ingest; read and upsert failures are
/// contained inside the pipeline and surface in the run report instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no input files found in: {0}")]
    NoFilesFound(String),

    #[error("invalid input pattern: {0}")]
    InvalidPattern(String),

    #[error("cancelled: namespace '{0}' was left untouched")]
    Aborted(String),

    #[error("remote store error: {0}")]
    RemoteStore(#[from] RemoteStoreError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start pipeline thread: {0}")]
    SpawnError(String),
}
