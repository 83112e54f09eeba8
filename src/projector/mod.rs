//! Result projection
//!
//! Turns column-oriented engine output into an ordered sequence of rows with
//! stable key names, and from there into the typed records presentation
//! consumes.

mod records;
mod value;

pub use records::{AggregateRecord, DetailRecord};
pub use value::ScalarValue;

use crate::error::{PipelineError, Result};
use duckdb::arrow::array::{Array, ArrayRef, AsArray};
use duckdb::arrow::datatypes::{
    DataType, Date32Type, Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type, SchemaRef, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::arrow::util::display::array_value_to_string;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

/// One result row: column names mapped to scalar values, in select order
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<ScalarValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<ScalarValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Value of a column; exact name match first, then case-insensitive
    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        let index = self
            .columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))?;
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.columns
            .iter()
            .map(|c| c.as_str())
            .zip(self.values.iter())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Maps engine result batches to rows
pub struct ResultProjector;

impl ResultProjector {
    /// Project every row of `batches`, keyed by the names in `schema`
    pub fn project(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<Vec<Row>> {
        let columns: Arc<[String]> = schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect::<Vec<_>>()
            .into();

        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        let mut rows = Vec::with_capacity(total);

        for batch in batches {
            if batch.num_columns() != columns.len() {
                return Err(PipelineError::Projection(format!(
                    "batch has {} columns, expected {}",
                    batch.num_columns(),
                    columns.len()
                )));
            }

            for row_idx in 0..batch.num_rows() {
                let values = batch
                    .columns()
                    .iter()
                    .map(|array| scalar_at(array, row_idx))
                    .collect();
                rows.push(Row::new(columns.clone(), values));
            }
        }

        Ok(rows)
    }
}

/// Read one cell of an Arrow array
fn scalar_at(array: &ArrayRef, row: usize) -> ScalarValue {
    if array.is_null(row) {
        return ScalarValue::Null;
    }

    match array.data_type() {
        DataType::Null => ScalarValue::Null,
        DataType::Boolean => ScalarValue::Boolean(array.as_boolean().value(row)),
        DataType::Int8 => ScalarValue::Int64(array.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => ScalarValue::Int64(array.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => ScalarValue::Int64(array.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => ScalarValue::Int64(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => ScalarValue::Int64(array.as_primitive::<UInt8Type>().value(row) as i64),
        DataType::UInt16 => {
            ScalarValue::Int64(array.as_primitive::<UInt16Type>().value(row) as i64)
        }
        DataType::UInt32 => {
            ScalarValue::Int64(array.as_primitive::<UInt32Type>().value(row) as i64)
        }
        DataType::UInt64 => {
            let value = array.as_primitive::<UInt64Type>().value(row);
            match i64::try_from(value) {
                Ok(v) => ScalarValue::Int64(v),
                Err(_) => ScalarValue::Decimal(Decimal::from(value)),
            }
        }
        DataType::Float32 => {
            ScalarValue::Float64(array.as_primitive::<Float32Type>().value(row) as f64)
        }
        DataType::Float64 => ScalarValue::Float64(array.as_primitive::<Float64Type>().value(row)),
        DataType::Decimal128(_, scale) => {
            let raw = array.as_primitive::<Decimal128Type>().value(row);
            ScalarValue::from_decimal128(raw, *scale)
        }
        DataType::Utf8 => ScalarValue::Utf8(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => ScalarValue::Utf8(array.as_string::<i64>().value(row).to_string()),
        DataType::Utf8View => ScalarValue::Utf8(array.as_string_view().value(row).to_string()),
        DataType::Timestamp(unit, _) => {
            let raw = match unit {
                TimeUnit::Second => array.as_primitive::<TimestampSecondType>().value(row),
                TimeUnit::Millisecond => array.as_primitive::<TimestampMillisecondType>().value(row),
                TimeUnit::Microsecond => array.as_primitive::<TimestampMicrosecondType>().value(row),
                TimeUnit::Nanosecond => array.as_primitive::<TimestampNanosecondType>().value(row),
            };
            ScalarValue::from_timestamp(raw, *unit)
        }
        DataType::Date32 => ScalarValue::from_date32(array.as_primitive::<Date32Type>().value(row)),
        _ => match array_value_to_string(array, row) {
            Ok(text) => ScalarValue::Utf8(text),
            Err(_) => ScalarValue::Null,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckdb::arrow::array::{
        Decimal128Array, Float64Array, Int32Array, StringArray, TimestampMicrosecondArray,
    };
    use duckdb::arrow::datatypes::{Field, Schema};

    fn sample_batch() -> (SchemaRef, RecordBatch) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("AWS_SERVICE", DataType::Utf8, true),
            Field::new("TOTAL", DataType::Decimal128(38, 4), true),
            Field::new("RATIO", DataType::Float64, true),
            Field::new("COUNT", DataType::Int32, false),
            Field::new(
                "STARTED",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
        ]));

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![Some("EC2"), None])),
                Arc::new(
                    Decimal128Array::from(vec![Some(150_000), Some(20_000)])
                        .with_precision_and_scale(38, 4)
                        .unwrap(),
                ),
                Arc::new(Float64Array::from(vec![Some(0.25), None])),
                Arc::new(Int32Array::from(vec![2, 1])),
                Arc::new(TimestampMicrosecondArray::from(vec![
                    Some(1_735_689_600_000_000),
                    None,
                ])),
            ],
        )
        .unwrap();

        (schema, batch)
    }

    #[test]
    fn test_project_rows() {
        let (schema, batch) = sample_batch();
        let rows = ResultProjector::project(&schema, &[batch]).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("AWS_SERVICE"), Some(&ScalarValue::Utf8("EC2".into())));
        assert_eq!(rows[0].get("TOTAL"), Some(&ScalarValue::Decimal(Decimal::new(15, 0))));
        assert_eq!(rows[0].get("RATIO"), Some(&ScalarValue::Float64(0.25)));
        assert_eq!(rows[0].get("COUNT"), Some(&ScalarValue::Int64(2)));
        assert_eq!(
            rows[0].get("STARTED").and_then(|v| v.as_timestamp()).map(|t| t.to_string()),
            Some("2025-01-01 00:00:00".to_string())
        );

        assert_eq!(rows[1].get("AWS_SERVICE"), Some(&ScalarValue::Null));
        assert_eq!(rows[1].get("TOTAL"), Some(&ScalarValue::Decimal(Decimal::new(2, 0))));
        assert_eq!(rows[1].get("STARTED"), Some(&ScalarValue::Null));
    }

    #[test]
    fn test_column_order_and_lookup() {
        let (schema, batch) = sample_batch();
        let rows = ResultProjector::project(&schema, &[batch]).unwrap();

        let names: Vec<&str> = rows[0].iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["AWS_SERVICE", "TOTAL", "RATIO", "COUNT", "STARTED"]);
        assert!(rows[0].get("aws_service").is_some());
        assert!(rows[0].get("missing").is_none());
        assert_eq!(rows[0].len(), 5);
    }

    #[test]
    fn test_empty_batches() {
        let (schema, _) = sample_batch();
        let rows = ResultProjector::project(&schema, &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_shape_mismatch() {
        let (_, batch) = sample_batch();
        let narrow = Arc::new(Schema::new(vec![Field::new("A", DataType::Utf8, true)]));
        let err = ResultProjector::project(&narrow, &[batch]).unwrap_err();
        assert!(matches!(err, PipelineError::Projection(_)));
    }

    #[test]
    fn test_row_serializes_as_ordered_map() {
        let (schema, batch) = sample_batch();
        let rows = ResultProjector::project(&schema, &[batch]).unwrap();
        let json = serde_json::to_string(&rows[1]).unwrap();
        assert_eq!(
            json,
            r#"{"AWS_SERVICE":null,"TOTAL":2.0,"RATIO":null,"COUNT":1,"STARTED":null}"#
        );
    }
}
