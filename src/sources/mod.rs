//! Input shard readers.
//!
//! A loader turns one file on disk into a [`LoadedFile`]; the batch reader then
//! resolves it into a [`Batch`] once the running offset is known.

mod parquet;

pub use self::parquet::ParquetLoader;

#[cfg(test)]
pub(crate) use self::parquet::testing;

use std::path::Path;

use crate::error::{BatchError, ReadError};
use crate::models::{AttributeColumns, Batch, ColumnConfig, RowId};

/// Columns to pull out of each shard.
#[derive(Debug, Clone)]
pub struct ColumnSelection {
    /// Required vector column.
    pub vector: String,

    /// Identifier column, used only when the shard has it.
    pub id: Option<String>,

    /// Required extra attribute columns.
    pub attributes: Vec<String>,
}

impl ColumnSelection {
    pub fn new(vector: impl Into<String>) -> Self {
        Self {
            vector: vector.into(),
            id: None,
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = names.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&ColumnConfig> for ColumnSelection {
    fn from(config: &ColumnConfig) -> Self {
        let selection = ColumnSelection::new(config.vector.clone())
            .with_attributes(config.attributes.iter().cloned());
        if config.id.is_empty() {
            selection
        } else {
            selection.with_id(config.id.clone())
        }
    }
}

/// Parsed contents of one shard, before identifiers are resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedFile {
    /// Present only when the shard carries an identifier column.
    pub ids: Option<Vec<RowId>>,
    pub vectors: Vec<Vec<f32>>,
    pub attributes: AttributeColumns,
}

impl LoadedFile {
    pub fn num_rows(&self) -> usize {
        self.vectors.len()
    }

    /// Resolve into a batch, synthesizing `[offset, offset + rows)` when the
    /// shard has no identifier column.
    pub fn into_batch(self, offset: u64) -> Result<Batch, BatchError> {
        match self.ids {
            Some(ids) => Batch::new(ids, self.vectors, self.attributes),
            None => Batch::sequential(offset, self.vectors, self.attributes),
        }
    }
}

/// Reads shards from disk. Implementations are shared with the reader thread.
pub trait FileLoader: Send + Sync {
    /// Load every selected column of `path`.
    fn load(&self, path: &Path) -> Result<LoadedFile, ReadError>;

    /// Row count of `path`. Loaders that can read it from metadata should
    /// override this so skipped shards are never decoded.
    fn row_count(&self, path: &Path) -> Result<u64, ReadError> {
        Ok(self.load(path)?.num_rows() as u64)
    }
}
