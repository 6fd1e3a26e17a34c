//! In-process namespace backend, used for dry runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{RemoteStore, RowIter};
use crate::error::RemoteStoreError;
use crate::models::{Batch, QuerySpec, ResultRow, RowId};

const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone)]
struct StoredRow {
    vector: Vec<f32>,
    attributes: BTreeMap<String, serde_json::Value>,
}

/// Namespace held entirely in memory.
pub struct MemoryBackend {
    namespace: String,
    rows: RwLock<BTreeMap<RowId, StoredRow>>,
}

impl MemoryBackend {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<RowId, StoredRow>>, RemoteStoreError> {
        self.rows
            .read()
            .map_err(|_| RemoteStoreError::ClientError("namespace lock poisoned".to_string()))
    }

    fn to_result_row(
        id: &RowId,
        row: &StoredRow,
        include_vector: bool,
        attributes: Option<&[String]>,
        dist: Option<f32>,
    ) -> ResultRow {
        let attributes = match attributes {
            None => (!row.attributes.is_empty()).then(|| row.attributes.clone()),
            Some([]) => None,
            Some(names) => Some(
                row.attributes
                    .iter()
                    .filter(|(k, _)| names.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        };
        ResultRow {
            id: id.clone(),
            vector: include_vector.then(|| row.vector.clone()),
            attributes,
            dist,
        }
    }
}

impl RemoteStore for MemoryBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn exists(&self) -> Result<bool, RemoteStoreError> {
        Ok(!self.read()?.is_empty())
    }

    fn approx_count(&self) -> Result<u64, RemoteStoreError> {
        Ok(self.read()?.len() as u64)
    }

    fn dimensions(&self) -> Result<usize, RemoteStoreError> {
        Ok(self
            .read()?
            .values()
            .next()
            .map_or(0, |row| row.vector.len()))
    }

    fn delete_all(&self) -> Result<(), RemoteStoreError> {
        self.rows
            .write()
            .map_err(|_| RemoteStoreError::DeleteError("namespace lock poisoned".to_string()))?
            .clear();
        Ok(())
    }

    fn upsert(&self, batch: &Batch) -> Result<(), RemoteStoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut rows = self
            .rows
            .write()
            .map_err(|_| RemoteStoreError::UpsertError("namespace lock poisoned".to_string()))?;

        let existing_dims = rows.values().next().map(|row| row.vector.len());
        if let (Some(existing), Some(incoming)) = (existing_dims, batch.dimensions())
            && existing != incoming
        {
            return Err(RemoteStoreError::UpsertError(format!(
                "namespace has {} dimensions, batch {} has {}",
                existing,
                batch.id_range(),
                incoming
            )));
        }

        for (id, vector, attributes) in batch.rows() {
            let attributes = attributes
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            rows.insert(
                id.clone(),
                StoredRow {
                    vector: vector.to_vec(),
                    attributes,
                },
            );
        }

        Ok(())
    }

    fn query(&self, query: &QuerySpec) -> Result<RowIter<'_>, RemoteStoreError> {
        if query.filters.is_some() {
            return Err(RemoteStoreError::QueryError(
                "filters are not supported by the memory backend".to_string(),
            ));
        }

        let rows = self.read()?;
        let top_k = query.top_k.map_or(DEFAULT_TOP_K, |k| k as usize);
        let metric = query.distance_metric.unwrap_or_default();
        let attributes = Some(query.include_attributes.as_slice());

        let results: Vec<ResultRow> = match &query.vector {
            Some(target) => {
                if let Some(row) = rows.values().find(|row| row.vector.len() != target.len()) {
                    return Err(RemoteStoreError::QueryError(format!(
                        "query vector has {} dimensions, namespace has {}",
                        target.len(),
                        row.vector.len()
                    )));
                }
                let mut scored: Vec<(f32, &RowId, &StoredRow)> = rows
                    .iter()
                    .map(|(id, row)| (metric.distance(target, &row.vector), id, row))
                    .collect();
                scored.sort_by(|a, b| a.0.total_cmp(&b.0));
                scored
                    .into_iter()
                    .take(top_k)
                    .map(|(dist, id, row)| {
                        Self::to_result_row(id, row, query.include_vectors, attributes, Some(dist))
                    })
                    .collect()
            }
            None => rows
                .iter()
                .take(top_k)
                .map(|(id, row)| {
                    Self::to_result_row(id, row, query.include_vectors, attributes, None)
                })
                .collect(),
        };

        Ok(Box::new(results.into_iter().map(Ok)))
    }

    fn list_all(&self) -> Result<RowIter<'_>, RemoteStoreError> {
        let snapshot: Vec<ResultRow> = self
            .read()?
            .iter()
            .map(|(id, row)| Self::to_result_row(id, row, true, None, None))
            .collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }
}
