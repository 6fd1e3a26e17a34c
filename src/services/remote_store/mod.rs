//! Remote store abstraction layer.
//!
//! The pipeline only ever talks to a namespace through [`RemoteStore`]. Backends are
//! picked from configuration by [`create_backend`]; every backend must be safe to
//! share between upsert worker threads.

mod memory;
mod turbopuffer;

pub use memory::MemoryBackend;
pub use turbopuffer::TurbopufferBackend;

use std::sync::Arc;

use crate::error::RemoteStoreError;
use crate::models::{Batch, NamespaceInfo, QuerySpec, ResultRow, StoreConfig, StoreDriver};

/// Lazily evaluated sequence of rows returned by queries and exports.
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<ResultRow, RemoteStoreError>> + Send + 'a>;

/// Capability set of one remote namespace.
pub trait RemoteStore: Send + Sync {
    /// Name of the namespace this client is bound to.
    fn namespace(&self) -> &str;

    /// Whether the namespace currently holds any data.
    fn exists(&self) -> Result<bool, RemoteStoreError>;

    /// Approximate number of stored vectors.
    fn approx_count(&self) -> Result<u64, RemoteStoreError>;

    /// Vector dimension of the namespace, 0 when empty.
    fn dimensions(&self) -> Result<usize, RemoteStoreError>;

    /// Delete every row in the namespace.
    fn delete_all(&self) -> Result<(), RemoteStoreError>;

    /// Insert or update every row of `batch` by id.
    fn upsert(&self, batch: &Batch) -> Result<(), RemoteStoreError>;

    /// Run a query against the namespace.
    fn query(&self, query: &QuerySpec) -> Result<RowIter<'_>, RemoteStoreError>;

    /// Export every row of the namespace.
    fn list_all(&self) -> Result<RowIter<'_>, RemoteStoreError>;

    /// Size and dimensions, or `None` if the namespace does not exist.
    fn info(&self) -> Result<Option<NamespaceInfo>, RemoteStoreError> {
        if !self.exists()? {
            return Ok(None);
        }
        Ok(Some(NamespaceInfo {
            name: self.namespace().to_string(),
            approx_count: self.approx_count()?,
            dimensions: self.dimensions()?,
        }))
    }
}

/// Create a remote store backend for `namespace` based on configuration.
pub fn create_backend(
    config: &StoreConfig,
    namespace: &str,
) -> Result<Arc<dyn RemoteStore>, RemoteStoreError> {
    match config.driver {
        StoreDriver::Turbopuffer => {
            let backend = TurbopufferBackend::new(config, namespace)?;
            Ok(Arc::new(backend))
        }
        StoreDriver::Memory => Ok(Arc::new(MemoryBackend::new(namespace))),
    }
}
