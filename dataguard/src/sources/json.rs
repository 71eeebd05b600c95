use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, NullArray, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{GuardError, Result};

/// Infers the arrow type of a column of JSON values.
///
/// Nulls are ignored; a column of nulls only is typed `Null`.
pub fn infer_column_type(column: &str, values: &[Value]) -> Result<DataType> {
    let mut inferred: Option<DataType> = None;

    for value in values {
        let kind = match value {
            Value::Null => continue,
            Value::Bool(_) => DataType::Boolean,
            Value::Number(n) if n.is_i64() => DataType::Int64,
            Value::Number(_) => DataType::Float64,
            Value::String(_) => DataType::Utf8,
            Value::Array(_) | Value::Object(_) => {
                return Err(GuardError::data_source(
                    "JSON",
                    format!("column '{column}' contains nested values"),
                ))
            }
        };

        inferred = match (inferred, kind) {
            (None, kind) => Some(kind),
            (Some(a), b) if a == b => Some(a),
            (Some(DataType::Int64), DataType::Float64)
            | (Some(DataType::Float64), DataType::Int64) => Some(DataType::Float64),
            (Some(a), b) => {
                return Err(GuardError::data_source(
                    "JSON",
                    format!("column '{column}' mixes {a} and {b} values"),
                ))
            }
        };
    }

    Ok(inferred.unwrap_or(DataType::Null))
}

fn to_array(data_type: &DataType, values: &[Value]) -> ArrayRef {
    match data_type {
        DataType::Boolean => Arc::new(values.iter().map(Value::as_bool).collect::<BooleanArray>()),
        DataType::Int64 => Arc::new(values.iter().map(Value::as_i64).collect::<Int64Array>()),
        DataType::Float64 => Arc::new(values.iter().map(Value::as_f64).collect::<Float64Array>()),
        DataType::Utf8 => Arc::new(values.iter().map(Value::as_str).collect::<StringArray>()),
        _ => Arc::new(NullArray::new(values.len())),
    }
}

pub(super) fn batch_from_columns<I, K>(columns: I) -> Result<RecordBatch>
where
    I: IntoIterator<Item = (K, Vec<Value>)>,
    K: Into<String>,
{
    let mut fields = Vec::new();
    let mut arrays = Vec::new();
    let mut row_count: Option<usize> = None;

    for (name, values) in columns {
        let name = name.into();
        match row_count {
            Some(expected) if expected != values.len() => {
                return Err(GuardError::data_source(
                    "JSON",
                    format!(
                        "column '{name}' has {} values, expected {expected}",
                        values.len()
                    ),
                ))
            }
            _ => row_count = Some(values.len()),
        }

        let data_type = infer_column_type(&name, &values)?;
        arrays.push(to_array(&data_type, &values));
        fields.push(Field::new(name, data_type, true));
    }

    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(row_count.unwrap_or(0)));
    Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
}
