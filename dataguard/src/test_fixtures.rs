//! Small sources shared by unit tests.

use arrow::array::{BooleanArray, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::sync::Arc;

use crate::core::{Command, Literal, Operand, PredicateApplication};
use crate::sources::LazySource;

/// One nullable `age` column: `[-5, 30, 150, null]`.
pub fn age_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("age", DataType::Int64, true)]));
    RecordBatch::try_new(
        schema,
        vec![Arc::new(Int64Array::from(vec![
            Some(-5),
            Some(30),
            Some(150),
            None,
        ]))],
    )
    .expect("valid age batch")
}

pub fn age_source() -> LazySource {
    LazySource::from_batch(age_batch()).expect("age source")
}

/// Four people:
///
/// | id | sex | pregnant | age |
/// |----|-----|----------|-----|
/// | p1 | F   | true     | 30  |
/// | p2 | M   | true     | 40  |
/// | p3 | M   | null     | 60  |
/// | p4 | F   | false    | 20  |
pub fn people_source() -> LazySource {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("sex", DataType::Utf8, true),
        Field::new("pregnant", DataType::Boolean, true),
        Field::new("age", DataType::Int64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec!["p1", "p2", "p3", "p4"])),
            Arc::new(StringArray::from(vec!["F", "M", "M", "F"])),
            Arc::new(BooleanArray::from(vec![Some(true), Some(true), None, Some(false)])),
            Arc::new(Int64Array::from(vec![30, 40, 60, 20])),
        ],
    )
    .expect("valid people batch");
    LazySource::from_batch(batch).expect("people source")
}

pub fn source_from_json(columns: Vec<(&str, Vec<Value>)>) -> LazySource {
    LazySource::from_json_columns(columns).expect("json source")
}

/// A leaf with literal operands; an empty `values` means no operand.
pub fn leaf(command: Command, subject: &[&str], values: Vec<Literal>) -> PredicateApplication {
    let operand = if values.is_empty() {
        Operand::None
    } else {
        Operand::Values(values)
    };
    PredicateApplication::new(
        command,
        subject.iter().map(|s| s.to_string()).collect(),
        operand,
    )
    .expect("valid leaf")
}
