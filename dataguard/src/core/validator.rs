//! Validation of a source against one named set of checks.
//!
//! A [`Validator`] runs in three steps: schema findings (missing or mistyped
//! columns, identifying columns that repeat), evaluation of every top-level
//! check, and aggregation into one [`ErrorReport`]. Checks are evaluated
//! concurrently up to [`ValidatorConfig::max_concurrency`], but records are
//! always aggregated in configured order, so reports are reproducible.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dataguard::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> dataguard::error::Result<()> {
//! let schema = SchemaConfig::from_json(r#"{
//!     "name": "patients",
//!     "columns": [{"id": "age", "nullable": false, "checks": [
//!         {"check_case": "conjunction", "expressions": [
//!             {"command": "is_greater_than_or_equal_to", "arg_values": [0]},
//!             {"command": "is_less_than", "arg_values": [150]}
//!         ]}
//!     ]}]
//! }"#)?;
//! let validator = Validator::from_config(&schema, &PredicateRegistry::new())?;
//! let source = LazySource::from_json_columns(vec![
//!     ("age", vec![json!(-5), json!(30), json!(150), json!(null)]),
//! ])?;
//!
//! let collector = ErrorCollector::new();
//! let report = validator.validate(&source, &collector).await;
//! assert_eq!(report.total_errors, 2);
//! # Ok(())
//! # }
//! ```

use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::check::Check;
use super::command::Command;
use super::config::{SchemaConfig, ValidationType};
use super::custom::{CheckData, PredicateRegistry};
use super::expression::{ExpressionNode, PredicateApplication};
use super::level::Level;
use super::operand::Operand;
use crate::error::Result;
use crate::evaluator::{CheckResult, Evaluator, DEFAULT_FAILURE_CASE_LIMIT};
use crate::logging::{truncate_field, LogConfig};
use crate::report::{
    DFErrorSchema, ErrorAggregator, ErrorCollector, ErrorReport, ErrorType, ExceptionSchema,
};
use crate::sources::{LazySource, DEFAULT_TABLE_NAME};
use crate::{log_check, log_data_op};

/// Runtime options of a validator.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    /// Name sources built by the validator are registered under
    pub table_name: String,
    /// Maximum number of top-level checks evaluated at once
    pub max_concurrency: usize,
    /// Number of failure cases quoted in each record's message
    pub failure_case_limit: usize,
    /// Stop adding records to a report after the first critical one
    pub stop_on_critical: bool,
    pub log: LogConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            max_concurrency: num_cpus::get(),
            failure_case_limit: DEFAULT_FAILURE_CASE_LIMIT,
            stop_on_critical: false,
            log: LogConfig::default(),
        }
    }
}

impl ValidatorConfig {
    /// One check at a time.
    pub fn sequential() -> Self {
        Self {
            max_concurrency: 1,
            ..Default::default()
        }
    }

    /// Stops reporting after the first critical record.
    pub fn strict() -> Self {
        Self {
            stop_on_critical: true,
            ..Default::default()
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_failure_case_limit(mut self, limit: usize) -> Self {
        self.failure_case_limit = limit;
        self
    }

    pub fn with_stop_on_critical(mut self, stop: bool) -> Self {
        self.stop_on_critical = stop;
        self
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }
}

/// Presence and type rules of one declared column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRule {
    pub id: String,
    pub data_type: Option<ValidationType>,
    pub required: bool,
}

impl ColumnRule {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_type: None,
            required: true,
        }
    }
}

/// Validates sources against the checks of one schema.
#[derive(Debug, Clone)]
pub struct Validator {
    name: String,
    columns: Vec<ColumnRule>,
    ids: Vec<String>,
    checks: Vec<Arc<Check>>,
    config: ValidatorConfig,
}

impl Validator {
    pub fn builder(name: impl Into<String>) -> ValidatorBuilder {
        ValidatorBuilder::new(name)
    }

    /// Builds a validator from a schema configuration.
    ///
    /// Fails on the first malformed check; nothing is evaluated in that case.
    #[instrument(skip(schema, registry), fields(schema.name = %schema.name))]
    pub fn from_config(schema: &SchemaConfig, registry: &PredicateRegistry) -> Result<Self> {
        let mut builder = Validator::builder(schema.name.clone()).ids(schema.ids.clone());
        let all_columns = schema.column_ids();

        for column in &schema.columns {
            builder = builder.column(ColumnRule {
                id: column.id.clone(),
                data_type: column.data_type,
                required: column.required,
            });
            if !column.nullable {
                builder = builder.check(implicit_check(Command::IsNotNull, &column.id)?);
            }
            if column.unique {
                builder = builder.check(implicit_check(Command::IsUnique, &column.id)?);
            }
            for config in &column.checks {
                builder = builder.check(Check::from_config(
                    config,
                    registry,
                    Some(&column.id),
                    &all_columns,
                )?);
            }
        }

        for config in &schema.checks {
            builder = builder.check(Check::from_config(config, registry, None, &all_columns)?);
        }

        let validator = builder.build();
        debug!(checks = validator.checks.len(), "Built validator from config");
        Ok(validator)
    }

    /// Like [`from_config`](Self::from_config), but records a failure as a
    /// critical error report in `collector` instead of returning it.
    pub fn from_config_collecting(
        schema: &SchemaConfig,
        registry: &PredicateRegistry,
        collector: &ErrorCollector,
    ) -> Option<Self> {
        match Self::from_config(schema, registry) {
            Ok(validator) => Some(validator),
            Err(err) => {
                warn!(schema.name = %schema.name, error = %err, "Invalid validation config");
                collector.add_critical_error(&err, None);
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checks(&self) -> &[Arc<Check>] {
        &self.checks
    }

    pub fn columns(&self) -> &[ColumnRule] {
        &self.columns
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the validator and appends the report and exceptions to `collector`.
    pub async fn validate(&self, source: &LazySource, collector: &ErrorCollector) -> ErrorReport {
        let (report, exceptions) = self.run(source).await;
        collector.add_exceptions(exceptions);
        collector.add_error_report(report.clone());
        report
    }

    /// Registers `batch` under the configured table name and validates it.
    pub async fn validate_batch(
        &self,
        batch: RecordBatch,
        collector: &ErrorCollector,
    ) -> Result<ErrorReport> {
        let source = LazySource::from_batch_named(&self.config.table_name, batch)?;
        Ok(self.validate(&source, collector).await)
    }

    /// Runs the validator. Always completes: faults of individual checks are
    /// returned as exceptions next to the report.
    #[instrument(skip(self, source), fields(
        validator.name = %self.name,
        validator.checks = self.checks.len(),
        source.rows = source.row_count()
    ))]
    pub async fn run(&self, source: &LazySource) -> (ErrorReport, Vec<ExceptionSchema>) {
        info!(
            validator.name = %self.name,
            validator.checks = self.checks.len(),
            "Starting validation"
        );

        let mut aggregator = ErrorAggregator::new(self.name.clone())
            .with_stop_on_critical(self.config.stop_on_critical);
        let evaluator = Evaluator::new().with_failure_case_limit(self.config.failure_case_limit);

        let absent = self.absent_columns(source);
        let source = self.index_source(source, &absent);
        self.schema_findings(&evaluator, &source, &mut aggregator).await;

        if !self.ids.is_empty() && self.ids.iter().all(|id| source.has_column(id)) {
            self.check_ids(&evaluator, &source, &mut aggregator).await;
        }

        let mut runnable = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            if let Some(target) = check.target() {
                if absent.contains(target) {
                    debug!(
                        check.name = %check.title(),
                        column = target,
                        "Skipping check on absent column"
                    );
                    continue;
                }
            }
            let bindings: Vec<Option<String>> = check
                .bindings()
                .into_iter()
                .filter(|key| key.as_ref().map_or(true, |k| !absent.contains(k)))
                .collect();
            if !bindings.is_empty() {
                runnable.push((check.clone(), bindings));
            }
        }

        let outcomes: Vec<(Arc<Check>, Result<Vec<CheckResult>>)> =
            stream::iter(runnable.into_iter().map(|(check, bindings)| {
                let source = source.clone();
                async move {
                    let outcome = evaluate_check(evaluator, &check, &bindings, &source).await;
                    (check, outcome)
                }
            }))
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        for (check, outcome) in outcomes {
            if let Ok(results) = &outcome {
                log_check!(
                    self.config.log,
                    check.name = %truncate_field(check.title(), self.config.log.max_field_length),
                    check.level = %check.level(),
                    failures = results.iter().map(CheckResult::failure_count).sum::<usize>(),
                    "Check evaluated"
                );
            }
            aggregator.record(&check, outcome);
        }

        let (report, exceptions) = aggregator.finish();
        info!(
            validator.name = %self.name,
            report.total_errors = report.total_errors,
            report.exceptions = exceptions.len(),
            "Validation completed"
        );
        (report, exceptions)
    }

    /// Declared columns and ids the source lacks.
    fn absent_columns(&self, source: &LazySource) -> HashSet<String> {
        self.columns
            .iter()
            .map(|rule| &rule.id)
            .chain(self.ids.iter())
            .filter(|column| !source.has_column(column))
            .cloned()
            .collect()
    }

    /// Records missing and mistyped columns in declaration order, ids last.
    async fn schema_findings(
        &self,
        evaluator: &Evaluator,
        source: &LazySource,
        aggregator: &mut ErrorAggregator,
    ) {
        let mut reported = HashSet::new();
        for rule in &self.columns {
            match source.column_type(&rule.id) {
                None => {
                    if rule.required {
                        reported.insert(rule.id.clone());
                        aggregator.push_error(missing_column(&rule.id));
                    } else {
                        debug!(column = %rule.id, "Optional column absent");
                    }
                }
                Some(actual) => {
                    if let Some(expected) = rule.data_type {
                        self.type_findings(evaluator, source, &rule.id, expected, actual, aggregator)
                            .await;
                    }
                }
            }
        }

        for id in &self.ids {
            if !source.has_column(id) && !reported.contains(id) {
                reported.insert(id.clone());
                aggregator.push_error(missing_column(id));
            }
        }
    }

    /// Text columns declared `date` or `datetime` are cast; only the rows whose
    /// values do not cast are reported.
    async fn type_findings(
        &self,
        evaluator: &Evaluator,
        source: &LazySource,
        column: &str,
        expected: ValidationType,
        actual: &DataType,
        aggregator: &mut ErrorAggregator,
    ) {
        if expected.matches(actual) {
            return;
        }
        let message = format!("expected series '{column}' to have type {expected}, got {actual}");
        let record = DFErrorSchema::new(ErrorType::WrongDatatype, message, Level::Error, "Data type")
            .with_column_names(vec![column.to_string()]);

        let Some(target) = expected.text_cast_target(actual) else {
            aggregator.push_error(record);
            return;
        };
        let outcome = match CheckData::new(source, None).await {
            Ok(data) => evaluator.evaluate_castable(column, target, &data).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(result) if result.is_valid() => {
                debug!(column, cast = target, "Text column casts to declared type");
            }
            Ok(result) => {
                let message = format!(
                    "{}; failure cases: {}",
                    record.message,
                    result.failure_cases.join(", ")
                );
                aggregator.push_error(
                    DFErrorSchema { message, ..record }
                        .with_row_ids(result.failing_rows)
                        .with_idx_columns(result.index_values),
                );
            }
            Err(err) => aggregator.push_exception(ExceptionSchema::from_error(
                &err,
                Level::Critical,
                Some("Data type"),
            )),
        }
    }

    /// The source with the identifying columns as index columns.
    fn index_source(&self, source: &LazySource, absent: &HashSet<String>) -> LazySource {
        let ids: Vec<String> = self
            .ids
            .iter()
            .filter(|id| !absent.contains(*id))
            .cloned()
            .collect();
        if ids.is_empty() {
            return source.clone();
        }
        match source.clone().with_index_columns(ids.clone()) {
            Ok(indexed) => {
                log_data_op!(self.config.log, index_columns = ?ids, "Indexed source by ids");
                indexed
            }
            Err(err) => {
                warn!(error = %err, "Could not set index columns");
                source.clone()
            }
        }
    }

    async fn check_ids(
        &self,
        evaluator: &Evaluator,
        source: &LazySource,
        aggregator: &mut ErrorAggregator,
    ) {
        let outcome = match CheckData::new(source, None).await {
            Ok(data) => evaluator.evaluate_unique_together(&self.ids, &data).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(result) if result.is_valid() => {}
            Ok(result) => aggregator.push_error(
                DFErrorSchema::new(
                    ErrorType::Duplicates,
                    format!(
                        "columns {:?} do not identify rows uniquely; failure cases: {}",
                        self.ids,
                        result.failure_cases.join(", ")
                    ),
                    Level::Error,
                    "Unique ids",
                )
                .with_column_names(self.ids.clone())
                .with_row_ids(result.failing_rows)
                .with_idx_columns(result.index_values),
            ),
            Err(err) => {
                aggregator.push_exception(ExceptionSchema::from_error(
                    &err,
                    Level::Critical,
                    Some("Unique ids"),
                ));
            }
        }
    }
}

fn missing_column(column: &str) -> DFErrorSchema {
    DFErrorSchema::new(
        ErrorType::ColumnNotInDataframe,
        format!("column '{column}' not in dataframe"),
        Level::Error,
        "Column in dataframe",
    )
    .with_column_names(vec![column.to_string()])
}

fn implicit_check(command: Command, column: &str) -> Result<Check> {
    let node = ExpressionNode::simple(PredicateApplication::new(command, Vec::new(), Operand::None)?);
    Check::builder(node).target(column).build()
}

async fn evaluate_check(
    evaluator: Evaluator,
    check: &Check,
    bindings: &[Option<String>],
    source: &LazySource,
) -> Result<Vec<CheckResult>> {
    let mut results = Vec::with_capacity(bindings.len());
    for key in bindings {
        let data = CheckData::new(source, key.clone()).await?;
        results.push(evaluator.evaluate(check.node(), &data).await?);
    }
    Ok(results)
}

/// Builder for [`Validator`].
#[derive(Debug, Clone)]
pub struct ValidatorBuilder {
    name: String,
    columns: Vec<ColumnRule>,
    ids: Vec<String>,
    checks: Vec<Arc<Check>>,
    config: ValidatorConfig,
}

impl ValidatorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            ids: Vec::new(),
            checks: Vec::new(),
            config: ValidatorConfig::default(),
        }
    }

    pub fn column(mut self, rule: ColumnRule) -> Self {
        self.columns.push(rule);
        self
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = ids;
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn checks<I>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = Check>,
    {
        self.checks.extend(checks.into_iter().map(Arc::new));
        self
    }

    pub fn config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Validator {
        Validator {
            name: self.name,
            columns: self.columns,
            ids: self.ids,
            checks: self.checks,
            config: self.config,
        }
    }
}
