//! Lazy, read-only views over columnar data.
//!
//! A [`LazySource`] registers an arrow [`RecordBatch`] as a DataFusion table with
//! one extra column, [`ROW_INDEX_COLUMN`], holding the 0-based position of every
//! row. Checks never touch the batch directly: they build deferred queries
//! against the registered table, and failing rows are identified by that index.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dataguard::sources::LazySource;
//! use serde_json::json;
//!
//! # async fn example() -> dataguard::error::Result<()> {
//! let source = LazySource::from_json_columns(vec![
//!     ("age", vec![json!(-5), json!(30), json!(150), json!(null)]),
//! ])?;
//! assert_eq!(source.row_count(), 4);
//! let df = source.scan().await?;
//! # Ok(())
//! # }
//! ```

mod json;

use arrow::array::{ArrayRef, UInt64Array};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::prelude::{DataFrame, SessionContext};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{GuardError, Result};
use crate::security::SqlSecurity;

pub use json::infer_column_type;

/// Name of the row identifier column appended to every registered source.
pub const ROW_INDEX_COLUMN: &str = "__row_idx";

/// Default name a source is registered under.
pub const DEFAULT_TABLE_NAME: &str = "data";

/// A deferred view over one immutable table.
///
/// Each source owns its own [`SessionContext`]; cloning is cheap and clones share
/// the registered table, so concurrent checks can each hold a handle.
#[derive(Clone)]
pub struct LazySource {
    ctx: SessionContext,
    table_name: Arc<str>,
    schema: SchemaRef,
    row_count: usize,
    index_columns: Vec<String>,
}

impl LazySource {
    /// Registers a single batch under the default table name.
    pub fn from_batch(batch: RecordBatch) -> Result<Self> {
        Self::from_batch_named(DEFAULT_TABLE_NAME, batch)
    }

    /// Registers a single batch under `table_name`.
    #[instrument(skip(batch), fields(rows = batch.num_rows(), columns = batch.num_columns()))]
    pub fn from_batch_named(table_name: &str, batch: RecordBatch) -> Result<Self> {
        SqlSecurity::validate_table_name(table_name)?;

        let schema = batch.schema();
        if schema.column_with_name(ROW_INDEX_COLUMN).is_some() {
            return Err(GuardError::data_source(
                "RecordBatch",
                format!("column name '{ROW_INDEX_COLUMN}' is reserved"),
            ));
        }

        let row_count = batch.num_rows();
        let row_index: ArrayRef = Arc::new(UInt64Array::from_iter_values(0..row_count as u64));

        let mut fields: Vec<Arc<Field>> = schema.fields().iter().cloned().collect();
        fields.push(Arc::new(Field::new(ROW_INDEX_COLUMN, DataType::UInt64, false)));
        let indexed_schema = Arc::new(Schema::new_with_metadata(
            fields,
            schema.metadata().clone(),
        ));

        let mut columns = batch.columns().to_vec();
        columns.push(row_index);
        let indexed = RecordBatch::try_new(indexed_schema.clone(), columns)?;

        let ctx = SessionContext::new();
        let table = MemTable::try_new(indexed_schema, vec![vec![indexed]])?;
        ctx.register_table(table_name, Arc::new(table))?;

        debug!(table = table_name, rows = row_count, "Registered lazy source");

        Ok(Self {
            ctx,
            table_name: Arc::from(table_name),
            schema,
            row_count,
            index_columns: Vec::new(),
        })
    }

    /// Registers several batches sharing one schema; rows are numbered in batch order.
    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Self> {
        let batch = concat_batches(&schema, batches)?;
        Self::from_batch(batch)
    }

    /// Builds a source from `(column, values)` pairs, inferring one arrow type per column.
    ///
    /// Booleans become `Boolean`, integral numbers `Int64`, other numbers
    /// `Float64` and strings `Utf8`. A column mixing kinds is rejected.
    pub fn from_json_columns<I, K>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Vec<serde_json::Value>)>,
        K: Into<String>,
    {
        let batch = json::batch_from_columns(columns)?;
        Self::from_batch(batch)
    }

    /// Parses a JSON object mapping column names to value arrays.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let object = value.as_object().ok_or_else(|| {
            GuardError::data_source("JSON", "expected an object mapping columns to arrays")
        })?;

        let mut columns = Vec::with_capacity(object.len());
        for (name, values) in object {
            let values = values.as_array().ok_or_else(|| {
                GuardError::data_source("JSON", format!("column '{name}' is not an array"))
            })?;
            columns.push((name.clone(), values.clone()));
        }
        Self::from_json_columns(columns)
    }

    /// Declares the columns whose values identify failing rows in reports.
    pub fn with_index_columns<I, S>(mut self, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        for column in &columns {
            if !self.has_column(column) {
                return Err(GuardError::column_not_found(column.clone()));
            }
        }
        self.index_columns = columns;
        Ok(self)
    }

    /// Returns a deferred scan of the whole table, row index included.
    pub async fn scan(&self) -> Result<DataFrame> {
        Ok(self.ctx.table(self.table_name.as_ref()).await?)
    }

    /// Runs a query against the source's context.
    pub async fn sql(&self, query: &str) -> Result<DataFrame> {
        Ok(self.ctx.sql(query).await?)
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The escaped table name, ready to splice into a `FROM` clause.
    pub fn quoted_table_name(&self) -> Result<String> {
        SqlSecurity::escape_identifier(&self.table_name)
    }

    /// The schema of the user data, without the row index column.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn index_columns(&self) -> &[String] {
        &self.index_columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.schema.column_with_name(column).is_some()
    }

    pub fn column_type(&self, column: &str) -> Option<&DataType> {
        self.schema
            .column_with_name(column)
            .map(|(_, field)| field.data_type())
    }

    /// Names of all user columns, in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }
}

impl fmt::Debug for LazySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySource")
            .field("table_name", &self.table_name)
            .field("columns", &self.column_names())
            .field("row_count", &self.row_count)
            .field("index_columns", &self.index_columns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("age", DataType::Int64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
                Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_from_batch_appends_row_index() {
        let source = LazySource::from_batch(batch()).unwrap();
        assert_eq!(source.row_count(), 3);
        assert_eq!(source.column_names(), vec!["id", "age"]);
        assert!(!source.has_column(ROW_INDEX_COLUMN));

        let df = source.scan().await.unwrap();
        let batches = df.collect().await.unwrap();
        let schema = batches[0].schema();
        assert!(schema.column_with_name(ROW_INDEX_COLUMN).is_some());
    }

    #[test]
    fn test_reserved_column_rejected() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            ROW_INDEX_COLUMN,
            DataType::Int64,
            false,
        )]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        assert!(LazySource::from_batch(batch).is_err());
    }

    #[test]
    fn test_invalid_table_name() {
        assert!(LazySource::from_batch_named("Bad Name", batch()).is_err());
    }

    #[test]
    fn test_column_introspection() {
        let source = LazySource::from_batch(batch()).unwrap();
        assert_eq!(source.column_type("age"), Some(&DataType::Int64));
        assert_eq!(source.column_type("weight"), None);
    }

    #[test]
    fn test_with_index_columns() {
        let source = LazySource::from_batch(batch()).unwrap();
        let source = source.with_index_columns(["id"]).unwrap();
        assert_eq!(source.index_columns(), &["id".to_string()]);

        let source = LazySource::from_batch(batch()).unwrap();
        assert!(matches!(
            source.with_index_columns(["missing"]),
            Err(GuardError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_from_json_str() {
        let source = LazySource::from_json_str(r#"{"age": [1, 2.5, null], "name": ["a", "b", "c"]}"#)
            .unwrap();
        assert_eq!(source.row_count(), 3);
        assert_eq!(source.column_type("age"), Some(&DataType::Float64));
        assert_eq!(source.column_type("name"), Some(&DataType::Utf8));

        assert!(LazySource::from_json_str("[1, 2]").is_err());
    }
}
