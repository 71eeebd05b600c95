//! Evaluation of expression trees against a lazy source.
//!
//! A tree is compiled post-order into a [`MaskPlan`]. Catalog leaves and
//! composites over them stay deferred SQL expressions; only the terminal step
//! runs a query, once per tree, that yields the mask together with the row
//! index, the values to quote as failure cases and the index columns. Custom
//! leaves must be executed to obtain their mask; a composite with such a child
//! combines materialized masks with arrow's Kleene kernels instead.
//!
//! Mask entries that are NULL count as valid. Only definite `false` entries are
//! failures, which is what exempts rows where the guard of a condition does not
//! hold.

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray};
use arrow::compute::{and_kleene, cast, or_kleene};
use arrow::datatypes::{DataType, UInt64Type};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, instrument, trace};

use crate::core::custom::collect_mask;
use crate::core::{CheckCase, CheckData, Command, ExpressionNode, PredicateApplication};
use crate::error::{GuardError, Result};
use crate::predicates;
use crate::security::SqlSecurity;
use crate::sources::ROW_INDEX_COLUMN;

/// Default number of failure cases quoted per record.
pub const DEFAULT_FAILURE_CASE_LIMIT: usize = 5;

const MASK_COLUMN: &str = "__check_output";

/// A compiled, not yet executed validity mask.
#[derive(Debug, Clone)]
pub enum MaskPlan {
    /// A SQL boolean expression over the source table.
    Deferred(String),
    /// A mask already computed, aligned with the source rows.
    Materialized(BooleanArray),
}

impl MaskPlan {
    pub fn is_deferred(&self) -> bool {
        matches!(self, MaskPlan::Deferred(_))
    }
}

/// The outcome of evaluating one tree against one column binding.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Per-row validity; `true` for valid rows, null entries already folded to `true`.
    pub mask: BooleanArray,
    /// Row identifiers of the invalid rows, ascending.
    pub failing_rows: Vec<u64>,
    /// Rendered values of the checked columns at the first failing rows.
    pub failure_cases: Vec<String>,
    /// `col=value` renderings of the index columns, one entry per failing row.
    pub index_values: Vec<String>,
    /// Columns the result is reported against.
    pub columns: Vec<String>,
    /// The column the tree was bound to, if any.
    pub key: Option<String>,
    pub description: String,
}

impl CheckResult {
    pub fn is_valid(&self) -> bool {
        self.failing_rows.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.failing_rows.len()
    }

    pub fn row_count(&self) -> usize {
        self.mask.len()
    }
}

/// Evaluates expression trees.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    failure_case_limit: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            failure_case_limit: DEFAULT_FAILURE_CASE_LIMIT,
        }
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many failure cases a result quotes.
    pub fn with_failure_case_limit(mut self, limit: usize) -> Self {
        self.failure_case_limit = limit;
        self
    }

    pub fn failure_case_limit(&self) -> usize {
        self.failure_case_limit
    }

    /// Evaluates `node` against the data, bound to `data.key()`.
    #[instrument(skip_all, fields(node = %node, key = ?data.key()))]
    pub async fn evaluate(&self, node: &ExpressionNode, data: &CheckData) -> Result<CheckResult> {
        let (plan, description) = self.compile(node, data).await?;

        let columns = match data.key() {
            Some(key) => vec![key.to_string()],
            None => node.referenced_columns(),
        };
        let sample_columns = match data.key() {
            Some(key) => vec![key.to_string()],
            None => node.subject_columns(),
        };

        let result = self
            .finish(plan, data, &sample_columns, columns, description)
            .await?;
        debug!(
            failures = result.failure_count(),
            rows = result.row_count(),
            "Evaluated expression"
        );
        Ok(result)
    }

    /// Evaluates the joint uniqueness of `columns`: rows whose combination of
    /// values occurs more than once are invalid.
    #[instrument(skip(self, data))]
    pub async fn evaluate_unique_together(
        &self,
        columns: &[String],
        data: &CheckData,
    ) -> Result<CheckResult> {
        if columns.is_empty() {
            return Err(GuardError::InvalidExpression(
                "joint uniqueness needs at least one column".to_string(),
            ));
        }
        let mut quoted = Vec::with_capacity(columns.len());
        for column in columns {
            if !data.source().has_column(column) {
                return Err(GuardError::column_not_found(column.clone()));
            }
            quoted.push(SqlSecurity::escape_identifier(column)?);
        }
        let sql = format!("COUNT(*) OVER (PARTITION BY {}) = 1", quoted.join(", "));
        let description = format!("{} are unique together", columns.join(", "));

        self.finish(
            MaskPlan::Deferred(sql),
            data,
            columns,
            columns.to_vec(),
            description,
        )
        .await
    }

    /// Rows whose non-null `column` value does not cast to the SQL type `target`.
    pub async fn evaluate_castable(
        &self,
        column: &str,
        target: &str,
        data: &CheckData,
    ) -> Result<CheckResult> {
        if !data.source().has_column(column) {
            return Err(GuardError::column_not_found(column));
        }
        let c = SqlSecurity::escape_identifier(column)?;
        let sql = format!("{c} IS NULL OR TRY_CAST({c} AS {target}) IS NOT NULL");
        let columns = vec![column.to_string()];
        let description = format!("{column} casts to {}", target.to_lowercase());

        self.finish(MaskPlan::Deferred(sql), data, &columns, columns.clone(), description)
            .await
    }

    /// Compiles a tree post-order; sibling subtrees compile concurrently.
    pub fn compile<'a>(
        &'a self,
        node: &'a ExpressionNode,
        data: &'a CheckData,
    ) -> BoxFuture<'a, Result<(MaskPlan, String)>> {
        async move {
            match node {
                ExpressionNode::Simple(app) => self.compile_leaf(app, data).await,
                ExpressionNode::Composite(composite) => {
                    let ((left, left_desc), (right, right_desc)) = futures::try_join!(
                        self.compile(composite.left(), data),
                        self.compile(composite.right(), data)
                    )?;
                    let case = composite.case();
                    let description = match case {
                        CheckCase::Conjunction => format!("{left_desc} and {right_desc}"),
                        CheckCase::Disjunction => format!("{left_desc} or {right_desc}"),
                        CheckCase::Condition => format!("when {left_desc} then {right_desc}"),
                    };

                    let plan = match (left, right) {
                        (MaskPlan::Deferred(a), MaskPlan::Deferred(b)) => {
                            MaskPlan::Deferred(combine_sql(case, &a, &b))
                        }
                        (left, right) => {
                            let (a, b) = futures::try_join!(
                                self.materialize(left, data),
                                self.materialize(right, data)
                            )?;
                            MaskPlan::Materialized(combine_masks(case, &a, &b)?)
                        }
                    };
                    Ok((plan, description))
                }
            }
        }
        .boxed()
    }

    async fn compile_leaf(
        &self,
        app: &PredicateApplication,
        data: &CheckData,
    ) -> Result<(MaskPlan, String)> {
        let source = data.source();

        if let Command::Custom(predicate) = app.command() {
            let key = app
                .subject()
                .first()
                .cloned()
                .or_else(|| data.key().map(str::to_string));
            let description = match &key {
                Some(column) => format!("{column} {}", app.command().title().to_lowercase()),
                None => app.command().title().to_lowercase(),
            };
            let name = predicate.name().to_string();
            trace!(predicate = %name, key = ?key, "Evaluating custom predicate");

            let scoped = data.with_key(key);
            let frame = predicate
                .evaluate(&scoped, &app.args())
                .await
                .map_err(|e| wrap_custom_error(&name, e))?;
            let mask = collect_mask(&name, frame, source.row_count())
                .await
                .map_err(|e| wrap_custom_error(&name, e))?;
            return Ok((MaskPlan::Materialized(mask), description));
        }

        let column = app.resolve_column(data.key())?;
        if !source.has_column(column) {
            return Err(GuardError::column_not_found(column));
        }
        for other in app.operand().columns() {
            if !source.has_column(other) {
                return Err(GuardError::column_not_found(other.clone()));
            }
        }

        let types = |name: &str| source.column_type(name).cloned();
        let sql = predicates::sql_fragment(app.command(), column, app.operand(), &types)?;
        trace!(sql = %sql, "Compiled leaf");
        Ok((
            MaskPlan::Deferred(sql),
            predicates::describe(app.command(), column, app.operand()),
        ))
    }

    /// Executes a plan into a row-aligned mask.
    async fn materialize(&self, plan: MaskPlan, data: &CheckData) -> Result<BooleanArray> {
        match plan {
            MaskPlan::Materialized(mask) => Ok(mask),
            MaskPlan::Deferred(sql) => {
                let batches = self.query(Some(&sql), &[], data).await?;
                let mut parts: Vec<BooleanArray> = Vec::with_capacity(batches.len());
                for batch in &batches {
                    parts.push(mask_column(batch)?);
                }
                let refs: Vec<&dyn Array> = parts.iter().map(|p| p as &dyn Array).collect();
                if refs.is_empty() {
                    return Ok(BooleanArray::from(Vec::<bool>::new()));
                }
                Ok(arrow::compute::concat(&refs)?.as_boolean().clone())
            }
        }
    }

    /// Runs `SELECT row index, [mask], extra columns ORDER BY row index`.
    async fn query(
        &self,
        mask_sql: Option<&str>,
        extra_columns: &[String],
        data: &CheckData,
    ) -> Result<Vec<RecordBatch>> {
        let source = data.source();
        let mut projection = vec![SqlSecurity::escape_identifier(ROW_INDEX_COLUMN)?];
        if let Some(sql) = mask_sql {
            projection.push(format!(
                "({sql}) AS {}",
                SqlSecurity::escape_identifier(MASK_COLUMN)?
            ));
        }
        for column in extra_columns {
            projection.push(SqlSecurity::escape_identifier(column)?);
        }

        let query = format!(
            "SELECT {} FROM {} ORDER BY {}",
            projection.join(", "),
            source.quoted_table_name()?,
            SqlSecurity::escape_identifier(ROW_INDEX_COLUMN)?
        );
        trace!(query = %query, "Executing validation query");
        let df = source.sql(&query).await?;
        Ok(df.collect().await?)
    }

    /// The terminal step: one query yielding row ids, failure cases and index values.
    async fn finish(
        &self,
        plan: MaskPlan,
        data: &CheckData,
        sample_columns: &[String],
        columns: Vec<String>,
        description: String,
    ) -> Result<CheckResult> {
        let source = data.source();
        let index_columns: Vec<String> = source.index_columns().to_vec();

        let mut extra: Vec<String> = Vec::new();
        for column in sample_columns.iter().chain(index_columns.iter()) {
            if source.has_column(column) && !extra.contains(column) {
                extra.push(column.clone());
            }
        }

        let (mask_sql, materialized) = match plan {
            MaskPlan::Deferred(sql) => (Some(sql), None),
            MaskPlan::Materialized(mask) => (None, Some(mask)),
        };
        let batches = self.query(mask_sql.as_deref(), &extra, data).await?;

        let mut validity: Vec<bool> = Vec::with_capacity(source.row_count());
        let mut failing_rows = Vec::new();
        let mut failure_cases = Vec::new();
        let mut index_values = Vec::new();
        let mut offset = 0usize;

        for batch in &batches {
            let row_ids = batch.column(0).as_primitive::<UInt64Type>();
            let batch_mask = match &materialized {
                Some(mask) => {
                    if offset + batch.num_rows() > mask.len() {
                        return Err(GuardError::MaskLength {
                            expected: offset + batch.num_rows(),
                            found: mask.len(),
                        });
                    }
                    mask.slice(offset, batch.num_rows())
                }
                None => mask_column(batch)?,
            };
            let first_extra = if materialized.is_some() { 1 } else { 2 };

            for row in 0..batch.num_rows() {
                let valid = batch_mask.is_null(row) || batch_mask.value(row);
                validity.push(valid);
                if valid {
                    continue;
                }

                failing_rows.push(row_ids.value(row));
                if failure_cases.len() < self.failure_case_limit {
                    let values = row_values(batch, &extra, first_extra, sample_columns, row)?;
                    failure_cases.push(failure_case(&values));
                }
                if !index_columns.is_empty() {
                    let values = row_values(batch, &extra, first_extra, &index_columns, row)?;
                    index_values.push(labelled(&values));
                }
            }
            offset += batch.num_rows();
        }

        if validity.len() != source.row_count() {
            return Err(GuardError::MaskLength {
                expected: source.row_count(),
                found: validity.len(),
            });
        }

        Ok(CheckResult {
            mask: BooleanArray::from(validity),
            failing_rows,
            failure_cases,
            index_values,
            columns,
            key: data.key().map(str::to_string),
            description,
        })
    }
}

fn wrap_custom_error(name: &str, err: GuardError) -> GuardError {
    match err {
        GuardError::CustomPredicate { .. } | GuardError::MaskLength { .. } => err,
        other => GuardError::custom_predicate_with_source(
            name,
            other.to_string(),
            Box::new(other),
        ),
    }
}

fn combine_sql(case: CheckCase, a: &str, b: &str) -> String {
    match case {
        CheckCase::Conjunction => format!("({a}) AND ({b})"),
        CheckCase::Disjunction => format!("({a}) OR ({b})"),
        CheckCase::Condition => format!("CASE WHEN ({a}) THEN ({b}) END"),
    }
}

fn combine_masks(case: CheckCase, a: &BooleanArray, b: &BooleanArray) -> Result<BooleanArray> {
    if a.len() != b.len() {
        return Err(GuardError::MaskLength {
            expected: a.len(),
            found: b.len(),
        });
    }
    Ok(match case {
        CheckCase::Conjunction => and_kleene(a, b)?,
        CheckCase::Disjunction => or_kleene(a, b)?,
        CheckCase::Condition => a
            .iter()
            .zip(b.iter())
            .map(|(guard, consequent)| match guard {
                Some(true) => consequent,
                _ => None,
            })
            .collect(),
    })
}

fn mask_column(batch: &RecordBatch) -> Result<BooleanArray> {
    let column: &ArrayRef = batch.column(1);
    if column.data_type() == &DataType::Boolean {
        Ok(column.as_boolean().clone())
    } else {
        Ok(cast(column, &DataType::Boolean)?.as_boolean().clone())
    }
}

fn render_value(array: &ArrayRef, row: usize) -> Result<String> {
    if array.is_null(row) {
        Ok("null".to_string())
    } else {
        Ok(array_value_to_string(array, row)?)
    }
}

/// Looks up `columns` of one row in the projected extra columns.
fn row_values<'c>(
    batch: &RecordBatch,
    extra: &[String],
    first_extra: usize,
    columns: &'c [String],
    row: usize,
) -> Result<Vec<(&'c str, String)>> {
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        let Some(position) = extra.iter().position(|c| c == column) else {
            continue;
        };
        values.push((
            column.as_str(),
            render_value(batch.column(first_extra + position), row)?,
        ));
    }
    Ok(values)
}

fn labelled(values: &[(&str, String)]) -> String {
    values
        .iter()
        .map(|(column, value)| format!("{column}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A failure case: the bare value for one column, `(a=.., b=..)` for several.
fn failure_case(values: &[(&str, String)]) -> String {
    match values {
        [(_, value)] => value.clone(),
        _ => format!("({})", labelled(values)),
    }
}
