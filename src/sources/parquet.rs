use std::fs::File;
use std::path::Path;

use arrow::array::{
    Array, ArrayRef, AsArray, GenericListArray, GenericStringArray, OffsetSizeTrait,
    PrimitiveArray,
};
use arrow::compute::{can_cast_types, cast};
use arrow::datatypes::{
    ArrowNativeType, DataType, Float32Type, Float64Type, Int64Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value;

use super::{ColumnSelection, FileLoader, LoadedFile};
use crate::error::ReadError;
use crate::models::RowId;

/// Rows decoded per Arrow record batch while reading a shard.
const READ_BATCH_SIZE: usize = 8192;

/// Loads Parquet shards with a column projection.
///
/// The vector column may be `List`, `LargeList` or `FixedSizeList` of any float or
/// integer type; values are converted to `f32`. The id column may hold unsigned
/// (or non-negative signed) integers or strings. Attribute columns become JSON
/// values; types without a JSON counterpart are rendered as strings when Arrow
/// can cast them.
///
/// # Example
/// ```ignore
/// let loader = ParquetLoader::new(ColumnSelection::new("emb").with_id("id"));
/// let loaded = loader.load(Path::new("shard_0.parquet"))?;
/// ```
pub struct ParquetLoader {
    columns: ColumnSelection,
    batch_size: usize,
}

impl ParquetLoader {
    pub fn new(columns: ColumnSelection) -> Self {
        Self {
            columns,
            batch_size: READ_BATCH_SIZE,
        }
    }

    fn open(&self, path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>, ReadError> {
        let file = File::open(path)?;
        Ok(ParquetRecordBatchReaderBuilder::try_new(file)?)
    }

    fn append(
        &self,
        batch: &RecordBatch,
        id_column: Option<&str>,
        loaded: &mut LoadedFile,
    ) -> Result<(), ReadError> {
        let base_row = loaded.vectors.len();

        let vectors = column(batch, &self.columns.vector)?;
        append_vectors(vectors, &self.columns.vector, base_row, &mut loaded.vectors)?;

        if let (Some(name), Some(ids)) = (id_column, loaded.ids.as_mut()) {
            append_ids(column(batch, name)?, name, base_row, ids)?;
        }

        for name in &self.columns.attributes {
            let values = loaded.attributes.entry(name.clone()).or_default();
            append_values(column(batch, name)?, name, values)?;
        }

        Ok(())
    }
}

impl FileLoader for ParquetLoader {
    fn load(&self, path: &Path) -> Result<LoadedFile, ReadError> {
        let builder = self.open(path)?;
        let schema = builder.schema().clone();
        let has_column = |name: &str| schema.column_with_name(name).is_some();
        let missing = |name: &str| ReadError::MissingColumn {
            column: name.to_string(),
            available: schema
                .fields()
                .iter()
                .map(|f| f.name().as_str())
                .collect::<Vec<_>>()
                .join(", "),
        };

        if !has_column(&self.columns.vector) {
            return Err(missing(&self.columns.vector));
        }
        if let Some(name) = self.columns.attributes.iter().find(|n| !has_column(n)) {
            return Err(missing(name));
        }

        let id_column = self.columns.id.as_deref().filter(|name| has_column(name));

        let wanted: Vec<&str> = std::iter::once(self.columns.vector.as_str())
            .chain(id_column)
            .chain(self.columns.attributes.iter().map(String::as_str))
            .collect();
        let field_indices: Vec<usize> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| wanted.contains(&field.name().as_str()))
            .map(|(index, _)| index)
            .collect();

        let projection = ProjectionMask::roots(builder.parquet_schema(), field_indices);
        let reader = builder
            .with_batch_size(self.batch_size)
            .with_projection(projection)
            .build()?;

        let mut loaded = LoadedFile {
            ids: id_column.map(|_| Vec::new()),
            ..Default::default()
        };
        for name in &self.columns.attributes {
            loaded.attributes.insert(name.clone(), Vec::new());
        }

        for batch in reader {
            self.append(&batch?, id_column, &mut loaded)?;
        }

        Ok(loaded)
    }

    fn row_count(&self, path: &Path) -> Result<u64, ReadError> {
        let builder = self.open(path)?;
        Ok(builder.metadata().file_metadata().num_rows().max(0) as u64)
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, ReadError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ReadError::MissingColumn {
            column: name.to_string(),
            available: batch
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

fn unsupported(column: &str, data_type: &DataType) -> ReadError {
    ReadError::UnsupportedColumnType {
        column: column.to_string(),
        data_type: data_type.to_string(),
    }
}

fn is_float(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Float16 | DataType::Float32 | DataType::Float64
    )
}

/// Flattened child values of a vector column as `f32`.
fn float_values(values: &ArrayRef, column: &str) -> Result<PrimitiveArray<Float32Type>, ReadError> {
    let data_type = values.data_type();
    if !is_float(data_type) && !data_type.is_integer() {
        return Err(unsupported(column, data_type));
    }
    Ok(cast(values, &DataType::Float32)?
        .as_primitive::<Float32Type>()
        .clone())
}

fn push_vector(
    values: &PrimitiveArray<Float32Type>,
    start: usize,
    end: usize,
    column: &str,
    row: usize,
    out: &mut Vec<Vec<f32>>,
) -> Result<(), ReadError> {
    if values.null_count() > 0 && (start..end).any(|j| values.is_null(j)) {
        return Err(ReadError::NullValue {
            column: column.to_string(),
            row,
        });
    }
    out.push(values.values()[start..end].to_vec());
    Ok(())
}

fn list_vectors<O: OffsetSizeTrait>(
    list: &GenericListArray<O>,
    column: &str,
    base_row: usize,
    out: &mut Vec<Vec<f32>>,
) -> Result<(), ReadError> {
    let values = float_values(list.values(), column)?;
    let offsets = list.value_offsets();
    for i in 0..list.len() {
        if list.is_null(i) {
            return Err(ReadError::NullValue {
                column: column.to_string(),
                row: base_row + i,
            });
        }
        let (start, end) = (offsets[i].as_usize(), offsets[i + 1].as_usize());
        push_vector(&values, start, end, column, base_row + i, out)?;
    }
    Ok(())
}

fn append_vectors(
    array: &ArrayRef,
    column: &str,
    base_row: usize,
    out: &mut Vec<Vec<f32>>,
) -> Result<(), ReadError> {
    match array.data_type() {
        DataType::List(_) => list_vectors(array.as_list::<i32>(), column, base_row, out),
        DataType::LargeList(_) => list_vectors(array.as_list::<i64>(), column, base_row, out),
        DataType::FixedSizeList(_, _) => {
            let list = array.as_fixed_size_list();
            let values = float_values(list.values(), column)?;
            let width = list.value_length() as usize;
            for i in 0..list.len() {
                if list.is_null(i) {
                    return Err(ReadError::NullValue {
                        column: column.to_string(),
                        row: base_row + i,
                    });
                }
                let start = list.value_offset(i) as usize;
                push_vector(&values, start, start + width, column, base_row + i, out)?;
            }
            Ok(())
        }
        other => Err(unsupported(column, other)),
    }
}

fn string_ids<O: OffsetSizeTrait>(
    array: &GenericStringArray<O>,
    column: &str,
    base_row: usize,
    out: &mut Vec<RowId>,
) -> Result<(), ReadError> {
    for (i, value) in array.iter().enumerate() {
        let value = value.ok_or_else(|| ReadError::NullValue {
            column: column.to_string(),
            row: base_row + i,
        })?;
        out.push(RowId::Str(value.to_string()));
    }
    Ok(())
}

fn append_ids(
    array: &ArrayRef,
    column: &str,
    base_row: usize,
    out: &mut Vec<RowId>,
) -> Result<(), ReadError> {
    match array.data_type() {
        DataType::Utf8 => string_ids(array.as_string::<i32>(), column, base_row, out),
        DataType::LargeUtf8 => string_ids(array.as_string::<i64>(), column, base_row, out),
        data_type if data_type.is_integer() => {
            // Negative values do not survive the cast and come back as nulls.
            let unsigned = cast(array, &DataType::UInt64)?;
            let unsigned = unsigned.as_primitive::<UInt64Type>();
            for i in 0..array.len() {
                if array.is_null(i) {
                    return Err(ReadError::NullValue {
                        column: column.to_string(),
                        row: base_row + i,
                    });
                }
                if unsigned.is_null(i) {
                    return Err(ReadError::InvalidId {
                        column: column.to_string(),
                        row: base_row + i,
                    });
                }
                out.push(RowId::Num(unsigned.value(i)));
            }
            Ok(())
        }
        other => Err(unsupported(column, other)),
    }
}

fn string_values<O: OffsetSizeTrait>(array: &GenericStringArray<O>, out: &mut Vec<Value>) {
    out.extend(
        array
            .iter()
            .map(|v| v.map_or(Value::Null, |s| Value::String(s.to_string()))),
    );
}

fn append_values(array: &ArrayRef, column: &str, out: &mut Vec<Value>) -> Result<(), ReadError> {
    match array.data_type() {
        DataType::Null => out.extend(std::iter::repeat_n(Value::Null, array.len())),
        DataType::Boolean => out.extend(
            array
                .as_boolean()
                .iter()
                .map(|v| v.map_or(Value::Null, Value::Bool)),
        ),
        DataType::Utf8 => string_values(array.as_string::<i32>(), out),
        DataType::LargeUtf8 => string_values(array.as_string::<i64>(), out),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let values = cast(array, &DataType::Int64)?;
            out.extend(
                values
                    .as_primitive::<Int64Type>()
                    .iter()
                    .map(|v| v.map_or(Value::Null, Value::from)),
            );
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let values = cast(array, &DataType::UInt64)?;
            out.extend(
                values
                    .as_primitive::<UInt64Type>()
                    .iter()
                    .map(|v| v.map_or(Value::Null, Value::from)),
            );
        }
        data_type if is_float(data_type) => {
            let values = cast(array, &DataType::Float64)?;
            out.extend(values.as_primitive::<Float64Type>().iter().map(|v| {
                v.and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }));
        }
        data_type if can_cast_types(data_type, &DataType::Utf8) => {
            let values = cast(array, &DataType::Utf8)?;
            string_values(values.as_string::<i32>(), out);
        }
        other => return Err(unsupported(column, other)),
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::{vectors, write_columns, write_shard};
    use super::*;
    use arrow::array::{FixedSizeListArray, Int64Array};
    use serde_json::json;
    use std::sync::Arc;

    fn loader() -> ParquetLoader {
        ParquetLoader::new(ColumnSelection::new("emb").with_id("id"))
    }

    #[test]
    fn test_load_without_id_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard_0.parquet");
        write_shard(&path, &vectors(0, 3), None, &[]);

        let loaded = loader().load(&path).unwrap();
        assert!(loaded.ids.is_none());
        assert_eq!(loaded.num_rows(), 3);
        assert_eq!(loaded.vectors[2], vec![2.0, 2.0]);
        assert!(loaded.attributes.is_empty());
    }

    #[test]
    fn test_load_with_ids_and_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard_0.parquet");
        write_shard(
            &path,
            &vectors(0, 2),
            Some(&[40, 41]),
            &[("title", vec!["a", "b"]), ("ignored", vec!["x", "y"])],
        );

        let loader = ParquetLoader::new(
            ColumnSelection::new("emb")
                .with_id("id")
                .with_attributes(["title"]),
        );
        let loaded = loader.load(&path).unwrap();

        assert_eq!(loaded.ids, Some(vec![RowId::Num(40), RowId::Num(41)]));
        assert_eq!(loaded.attributes.len(), 1);
        assert_eq!(loaded.attributes["title"], vec![json!("a"), json!("b")]);
    }

    #[test]
    fn test_missing_vector_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard_0.parquet");
        write_shard(&path, &vectors(0, 1), None, &[]);

        let loader = ParquetLoader::new(ColumnSelection::new("embedding"));
        match loader.load(&path) {
            Err(ReadError::MissingColumn { column, available }) => {
                assert_eq!(column, "embedding");
                assert_eq!(available, "emb");
            }
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_attribute_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard_0.parquet");
        write_shard(&path, &vectors(0, 1), None, &[]);

        let loader = ParquetLoader::new(ColumnSelection::new("emb").with_attributes(["lang"]));
        assert!(matches!(
            loader.load(&path),
            Err(ReadError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_row_count_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard_0.parquet");
        write_shard(&path, &vectors(0, 5), None, &[]);

        assert_eq!(loader().row_count(&path).unwrap(), 5);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            loader().load(Path::new("no_such.parquet")),
            Err(ReadError::IoError(_))
        ));
    }

    #[test]
    fn test_fixed_size_f64_vectors_and_negative_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard_0.parquet");
        let emb = FixedSizeListArray::from_iter_primitive::<Float64Type, _, _>(
            vec![
                Some(vec![Some(0.5), Some(1.5)]),
                Some(vec![Some(2.5), Some(3.5)]),
            ],
            2,
        );
        write_columns(
            &path,
            vec![
                ("emb".to_string(), Arc::new(emb) as ArrayRef),
                (
                    "id".to_string(),
                    Arc::new(Int64Array::from(vec![7, -1])) as ArrayRef,
                ),
            ],
        );

        match loader().load(&path) {
            Err(ReadError::InvalidId { column, row }) => {
                assert_eq!(column, "id");
                assert_eq!(row, 1);
            }
            other => panic!("expected invalid id, got {other:?}"),
        }

        let no_ids = ParquetLoader::new(ColumnSelection::new("emb"));
        let loaded = no_ids.load(&path).unwrap();
        assert_eq!(loaded.vectors, vec![vec![0.5, 1.5], vec![2.5, 3.5]]);
    }

    #[test]
    fn test_numeric_attributes_become_json_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard_0.parquet");
        write_columns(
            &path,
            vec![
                (
                    "emb".to_string(),
                    Arc::new(arrow::array::ListArray::from_iter_primitive::<Float32Type, _, _>(
                        vec![Some(vec![Some(1.0)]), Some(vec![Some(2.0)])],
                    )) as ArrayRef,
                ),
                (
                    "year".to_string(),
                    Arc::new(Int64Array::from(vec![Some(1999), None])) as ArrayRef,
                ),
            ],
        );

        let loader = ParquetLoader::new(ColumnSelection::new("emb").with_attributes(["year"]));
        let loaded = loader.load(&path).unwrap();
        assert_eq!(loaded.attributes["year"], vec![json!(1999), Value::Null]);
    }
}
