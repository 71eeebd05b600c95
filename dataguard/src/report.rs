//! Error records, reports and the collector.
//!
//! Findings of a validation run become [`DFErrorSchema`] records: exactly one per
//! failing top-level check and column binding, however many leaves of the check
//! failed. Faults raised while evaluating a check become [`ExceptionSchema`]
//! entries instead, so one broken check never hides the results of the others.
//!
//! The [`ErrorCollector`] gathers the reports of one or more runs. It is an
//! explicit handle owned by the caller; clones share the same storage.
//!
//! # Examples
//!
//! ```rust
//! use dataguard::report::{DFErrorSchema, ErrorCollector, ErrorReport, ErrorType};
//! use dataguard::core::Level;
//!
//! let collector = ErrorCollector::new();
//! let record = DFErrorSchema::new(ErrorType::SeriesContainsNulls, "age has nulls", Level::Error, "Is not null")
//!     .with_column_names(vec!["age".to_string()])
//!     .with_row_ids(vec![3]);
//! collector.add_error_report(ErrorReport::new("patients", vec![record]));
//!
//! assert_eq!(collector.total_errors(), 1);
//! let json = collector.to_json().unwrap();
//! assert!(json.contains("\"SERIES_CONTAINS_NULLS\""));
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{Check, Level};
use crate::error::{GuardError, Result};
use crate::evaluator::CheckResult;

/// Name of the report recorded for configuration failures.
pub const CRITICAL_ERROR_REPORT: &str = "Critical Error Report";

/// The reason a record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// A top-level `is_not_null` check failed.
    SeriesContainsNulls,
    /// A top-level `is_unique` check failed.
    SeriesContainsDuplicates,
    /// Any other check failed.
    DataframeCheck,
    /// A required column is absent.
    ColumnNotInDataframe,
    /// A column does not have its declared type.
    WrongDatatype,
    /// The identifying columns do not identify rows uniquely.
    Duplicates,
    /// The configuration itself could not be turned into checks.
    CheckError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::SeriesContainsNulls => "SERIES_CONTAINS_NULLS",
            ErrorType::SeriesContainsDuplicates => "SERIES_CONTAINS_DUPLICATES",
            ErrorType::DataframeCheck => "DATAFRAME_CHECK",
            ErrorType::ColumnNotInDataframe => "COLUMN_NOT_IN_DATAFRAME",
            ErrorType::WrongDatatype => "WRONG_DATATYPE",
            ErrorType::Duplicates => "DUPLICATES",
            ErrorType::CheckError => "CHECK_ERROR",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DFErrorSchema {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub message: String,
    pub level: Level,
    pub title: String,
    pub traceback: Option<String>,
    pub column_names: Vec<String>,
    pub row_ids: Vec<u64>,
    pub idx_columns: Vec<String>,
}

impl DFErrorSchema {
    pub fn new(
        error_type: ErrorType,
        message: impl Into<String>,
        level: Level,
        title: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            message: message.into(),
            level,
            title: title.into(),
            traceback: None,
            column_names: Vec::new(),
            row_ids: Vec::new(),
            idx_columns: Vec::new(),
        }
    }

    /// The record for a failing check result, or `None` if every row is valid.
    pub fn from_result(check: &Check, result: &CheckResult) -> Option<Self> {
        if result.is_valid() {
            return None;
        }
        let message = format!(
            "{}; failure cases: {}",
            check.error_msg(result.key.as_deref()),
            result.failure_cases.join(", ")
        );
        Some(
            Self::new(check.error_type(), message, check.level(), check.title())
                .with_column_names(result.columns.clone())
                .with_row_ids(result.failing_rows.clone())
                .with_idx_columns(result.index_values.clone()),
        )
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    pub fn with_column_names(mut self, column_names: Vec<String>) -> Self {
        self.column_names = column_names;
        self
    }

    pub fn with_row_ids(mut self, row_ids: Vec<u64>) -> Self {
        self.row_ids = row_ids;
        self
    }

    pub fn with_idx_columns(mut self, idx_columns: Vec<String>) -> Self {
        self.idx_columns = idx_columns;
        self
    }
}

/// A fault captured while evaluating a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionSchema {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub level: Level,
    pub traceback: String,
    /// Messages of the chained source errors, outermost first.
    #[serde(default)]
    pub context: Vec<String>,
    /// Title of the check that raised the fault.
    #[serde(default)]
    pub check: Option<String>,
}

impl ExceptionSchema {
    pub fn from_error(err: &GuardError, level: Level, check: Option<&str>) -> Self {
        let context = source_chain(err);
        Self {
            error_type: err.kind().to_string(),
            message: err.to_string(),
            level,
            traceback: render_traceback(err),
            context,
            check: check.map(str::to_string),
        }
    }
}

fn source_chain(err: &GuardError) -> Vec<String> {
    let mut chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

/// Renders an error and its sources, one per line.
pub fn render_traceback(err: &GuardError) -> String {
    let mut lines = vec![format!("{}: {}", err.kind(), err)];
    for cause in source_chain(err) {
        lines.push(format!("Caused by: {cause}"));
    }
    lines.join("\n")
}

/// All records of one run against one named configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub name: String,
    pub errors: Vec<DFErrorSchema>,
    pub total_errors: usize,
    pub id: Uuid,
}

impl ErrorReport {
    pub fn new(name: impl Into<String>, errors: Vec<DFErrorSchema>) -> Self {
        Self {
            name: name.into(),
            total_errors: errors.len(),
            errors,
            id: Uuid::new_v4(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records at `level` or above.
    pub fn errors_at_least(&self, level: Level) -> impl Iterator<Item = &DFErrorSchema> {
        self.errors.iter().filter(move |e| e.level >= level)
    }

    pub fn has_critical(&self) -> bool {
        self.errors.iter().any(|e| e.level == Level::Critical)
    }
}

/// Turns check results into one report, in the order they are recorded.
#[derive(Debug)]
pub struct ErrorAggregator {
    name: String,
    stop_on_critical: bool,
    stopped: bool,
    errors: Vec<DFErrorSchema>,
    exceptions: Vec<ExceptionSchema>,
}

impl ErrorAggregator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stop_on_critical: false,
            stopped: false,
            errors: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    /// Stops accepting records after the first critical one.
    pub fn with_stop_on_critical(mut self, stop: bool) -> Self {
        self.stop_on_critical = stop;
        self
    }

    /// Builds a report straight from results of checks.
    pub fn aggregate<'a, I>(name: impl Into<String>, results: I) -> ErrorReport
    where
        I: IntoIterator<Item = (&'a Check, &'a CheckResult)>,
    {
        let mut aggregator = Self::new(name);
        for (check, result) in results {
            aggregator.add_result(check, result);
        }
        aggregator.finish().0
    }

    /// Records the outcome of one top-level check: its results, or the fault it raised.
    pub fn record(&mut self, check: &Check, outcome: Result<Vec<CheckResult>>) {
        match outcome {
            Ok(results) => {
                for result in &results {
                    self.add_result(check, result);
                }
            }
            Err(err) => {
                warn!(
                    check.name = %check.title(),
                    error = %err,
                    "Check raised an exception"
                );
                self.exceptions.push(ExceptionSchema::from_error(
                    &err,
                    Level::Critical,
                    Some(check.title()),
                ));
            }
        }
    }

    pub fn add_result(&mut self, check: &Check, result: &CheckResult) {
        if let Some(record) = DFErrorSchema::from_result(check, result) {
            debug!(
                check.name = %check.title(),
                check.level = %check.level(),
                failures = record.row_ids.len(),
                "Check failed"
            );
            self.push_error(record);
        }
    }

    pub fn push_error(&mut self, record: DFErrorSchema) {
        if self.stopped {
            debug!(title = %record.title, "Skipping record after critical error");
            return;
        }
        let critical = record.level == Level::Critical;
        self.errors.push(record);
        if critical && self.stop_on_critical {
            warn!(report = %self.name, "Critical error found, stopping further error processing");
            self.stopped = true;
        }
    }

    pub fn push_exception(&mut self, exception: ExceptionSchema) {
        self.exceptions.push(exception);
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns true once a critical record stopped processing.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn finish(self) -> (ErrorReport, Vec<ExceptionSchema>) {
        (ErrorReport::new(self.name, self.errors), self.exceptions)
    }

    /// Finishes the report and appends it, with the exceptions, to `collector`.
    pub fn commit(self, collector: &ErrorCollector) -> ErrorReport {
        let (report, exceptions) = self.finish();
        collector.add_exceptions(exceptions);
        collector.add_error_report(report.clone());
        report
    }
}

/// Serialized form of a collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorCollectorSchema {
    pub error_reports: Vec<ErrorReport>,
    pub exceptions: Vec<ExceptionSchema>,
}

impl ErrorCollectorSchema {
    pub fn total_errors(&self) -> usize {
        self.error_reports.iter().map(|r| r.total_errors).sum()
    }
}

/// Append-only accumulation of reports and exceptions.
#[derive(Debug, Clone, Default)]
pub struct ErrorCollector {
    inner: Arc<Mutex<ErrorCollectorSchema>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ErrorCollectorSchema> {
        // appends are never left half-done, so a poisoned lock is still consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_error_report(&self, report: ErrorReport) {
        info!(
            report.name = %report.name,
            report.total_errors = report.total_errors,
            "Adding error report to collector"
        );
        self.lock().error_reports.push(report);
    }

    pub fn add_exception(&self, exception: ExceptionSchema) {
        self.lock().exceptions.push(exception);
    }

    pub fn add_exceptions(&self, exceptions: impl IntoIterator<Item = ExceptionSchema>) {
        self.lock().exceptions.extend(exceptions);
    }

    /// Records a one-record critical report for a configuration failure.
    pub fn add_critical_error(&self, err: &GuardError, message: Option<&str>) {
        let record = DFErrorSchema::new(
            ErrorType::CheckError,
            message.map(str::to_string).unwrap_or_else(|| err.to_string()),
            Level::Critical,
            format!("{}: {}", err.kind(), err),
        )
        .with_traceback(render_traceback(err));
        self.add_error_report(ErrorReport::new(CRITICAL_ERROR_REPORT, vec![record]));
    }

    /// A snapshot of everything collected so far.
    pub fn get_errors(&self) -> ErrorCollectorSchema {
        self.lock().clone()
    }

    /// Sum of `total_errors` over all reports.
    pub fn total_errors(&self) -> usize {
        self.lock().total_errors()
    }

    pub fn report_count(&self) -> usize {
        self.lock().error_reports.len()
    }

    pub fn exception_count(&self) -> usize {
        self.lock().exceptions.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.error_reports.clear();
        inner.exceptions.clear();
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.lock())?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.lock())?)
    }
}
