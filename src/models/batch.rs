//! Batch model: the unit of work handed from the reader to the upsert workers.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Attribute columns keyed by attribute name, positionally aligned with ids.
pub type AttributeColumns = BTreeMap<String, Vec<serde_json::Value>>;

/// Row identifier. Remote namespaces accept either unsigned integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Num(u64),
    Str(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Num(n) => write!(f, "{n}"),
            RowId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for RowId {
    fn from(value: u64) -> Self {
        RowId::Num(value)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        RowId::Str(value.to_string())
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        RowId::Str(value)
    }
}

/// A column-oriented bundle of rows upserted in one remote call.
///
/// Serializes to the `{"ids", "vectors", "attributes"}` layout used by the
/// upsert endpoint. Once constructed the batch cannot be mutated, so it can be
/// shared across threads without further synchronization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    ids: Vec<RowId>,
    vectors: Vec<Vec<f32>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: AttributeColumns,
}

impl Batch {
    /// Build a batch, checking that every column has one entry per id, that
    /// ids are unique and that all vectors share one dimension.
    pub fn new(
        ids: Vec<RowId>,
        vectors: Vec<Vec<f32>>,
        attributes: AttributeColumns,
    ) -> Result<Self, BatchError> {
        let expected = ids.len();

        if vectors.len() != expected {
            return Err(BatchError::LengthMismatch {
                column: "vectors".to_string(),
                expected,
                actual: vectors.len(),
            });
        }

        for (name, values) in &attributes {
            if values.len() != expected {
                return Err(BatchError::LengthMismatch {
                    column: name.clone(),
                    expected,
                    actual: values.len(),
                });
            }
        }

        if let Some(first) = vectors.first() {
            let dims = first.len();
            if let Some((row, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
                return Err(BatchError::DimensionMismatch {
                    row,
                    expected: dims,
                    actual: v.len(),
                });
            }
        }

        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if !seen.insert(id) {
                return Err(BatchError::DuplicateId(id.to_string()));
            }
        }

        Ok(Self {
            ids,
            vectors,
            attributes,
        })
    }

    /// Build a batch whose ids are the half-open range `[offset, offset + len)`.
    pub fn sequential(
        offset: u64,
        vectors: Vec<Vec<f32>>,
        attributes: AttributeColumns,
    ) -> Result<Self, BatchError> {
        let ids = (offset..offset + vectors.len() as u64)
            .map(RowId::Num)
            .collect();
        Self::new(ids, vectors, attributes)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[RowId] {
        &self.ids
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn attributes(&self) -> &AttributeColumns {
        &self.attributes
    }

    /// Vector dimension, or `None` for an empty batch.
    pub fn dimensions(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }

    pub fn first_id(&self) -> Option<&RowId> {
        self.ids.first()
    }

    pub fn last_id(&self) -> Option<&RowId> {
        self.ids.last()
    }

    /// `first..last` label used in progress and failure lines.
    pub fn id_range(&self) -> String {
        match (self.first_id(), self.last_id()) {
            (Some(first), Some(last)) => format!("{first}..{last}"),
            _ => "<empty>".to_string(),
        }
    }

    /// Iterate rows as `(id, vector, attributes)` triples.
    pub fn rows(
        &self,
    ) -> impl Iterator<Item = (&RowId, &[f32], BTreeMap<&str, &serde_json::Value>)> {
        self.ids
            .iter()
            .zip(self.vectors.iter())
            .enumerate()
            .map(|(i, (id, vector))| {
                let attrs = self
                    .attributes
                    .iter()
                    .map(|(name, values)| (name.as_str(), &values[i]))
                    .collect();
                (id, vector.as_slice(), attrs)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vectors(n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![i as f32, 0.5]).collect()
    }

    #[test]
    fn test_sequential_ids_cover_half_open_range() {
        let batch = Batch::sequential(10, vectors(3), AttributeColumns::new()).unwrap();
        assert_eq!(
            batch.ids(),
            &[RowId::Num(10), RowId::Num(11), RowId::Num(12)]
        );
        assert_eq!(batch.id_range(), "10..12");
        assert_eq!(batch.dimensions(), Some(2));
    }

    #[test]
    fn test_rejects_misaligned_attribute_column() {
        let mut attributes = AttributeColumns::new();
        attributes.insert("title".to_string(), vec![json!("a")]);

        let err = Batch::sequential(0, vectors(2), attributes).unwrap_err();
        assert_eq!(
            err,
            BatchError::LengthMismatch {
                column: "title".to_string(),
                expected: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_rejects_mixed_dimensions() {
        let err = Batch::new(
            vec![RowId::Num(1), RowId::Num(2)],
            vec![vec![0.0, 1.0], vec![0.0]],
            AttributeColumns::new(),
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::DimensionMismatch { row: 1, .. }));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = Batch::new(
            vec!["a".into(), "a".into()],
            vectors(2),
            AttributeColumns::new(),
        )
        .unwrap_err();
        assert_eq!(err, BatchError::DuplicateId("a".to_string()));
    }

    #[test]
    fn test_serializes_column_layout() {
        let mut attributes = AttributeColumns::new();
        attributes.insert("lang".to_string(), vec![json!("en"), json!(null)]);
        let batch = Batch::new(
            vec![RowId::Num(4), RowId::Str("x".to_string())],
            vec![vec![0.25], vec![0.5]],
            attributes,
        )
        .unwrap();

        let value = serde_json::to_value(&batch).unwrap();
        assert_eq!(
            value,
            json!({
                "ids": [4, "x"],
                "vectors": [[0.25], [0.5]],
                "attributes": {"lang": ["en", null]}
            })
        );

        let bare = Batch::sequential(0, vec![vec![1.0]], AttributeColumns::new()).unwrap();
        assert!(serde_json::to_value(&bare).unwrap().get("attributes").is_none());
    }

    #[test]
    fn test_rows_zip_columns() {
        let mut attributes = AttributeColumns::new();
        attributes.insert("n".to_string(), vec![json!(1), json!(2)]);
        let batch = Batch::sequential(0, vectors(2), attributes).unwrap();

        let rows: Vec<_> = batch.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0, &RowId::Num(1));
        assert_eq!(rows[1].2.get("n"), Some(&&json!(2)));
    }
}
