//! Error types for the dataguard validation library.
//!
//! Validation *findings* (a column containing nulls, a value out of range) are
//! never errors: they are reported as [`DFErrorSchema`](crate::report::DFErrorSchema)
//! records. The [`GuardError`] enum covers everything else: malformed expression
//! trees, bad operands, missing columns, type mismatches and failures of the
//! underlying DataFusion engine.

use thiserror::Error;

/// The main error type for the dataguard library.
#[derive(Error, Debug)]
pub enum GuardError {
    /// An expression tree violates a structural invariant (wrong child count,
    /// unbound column, ...). Raised while the tree is being built.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    /// The operands supplied for a command do not fit its arity or type.
    #[error("Invalid operand for '{command}': {message}")]
    InvalidOperand {
        /// Name of the command the operand was given to
        command: String,
        /// Detailed error message
        message: String,
    },

    /// A command name is neither a catalog predicate nor a registered custom predicate.
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// A user supplied predicate failed while producing its mask.
    #[error("Custom predicate '{name}' failed: {message}")]
    CustomPredicate {
        /// Name the predicate was registered under
        name: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A validity mask does not line up with the rows of the source.
    #[error("Mask length mismatch: expected {expected} rows, found {found}")]
    MaskLength { expected: usize, found: usize },

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from data source operations.
    #[error("Data source error: {message}")]
    DataSource {
        /// Type of data source (e.g., "RecordBatch", "JSON")
        source_type: String,
        /// Detailed error message
        message: String,
    },

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error when a required column is not found in the dataset.
    #[error("Column '{column}' not found in dataset")]
    ColumnNotFound { column: String },

    /// Error when data types don't match expected types.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Security-related error.
    #[error("Security error: {0}")]
    SecurityError(String),
}

/// A type alias for `Result<T, GuardError>`.
pub type Result<T> = std::result::Result<T, GuardError>;

impl GuardError {
    /// Creates a new invalid operand error.
    pub fn invalid_operand(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOperand {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Creates a new data source error.
    pub fn data_source(source_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataSource {
            source_type: source_type.into(),
            message: message.into(),
        }
    }

    /// Creates a new custom predicate error.
    pub fn custom_predicate(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CustomPredicate {
            name: name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new custom predicate error wrapping the error that caused it.
    pub fn custom_predicate_with_source(
        name: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::CustomPredicate {
            name: name.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a column-not-found error.
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
        }
    }

    /// Returns the short name of the error variant.
    ///
    /// This is the `type` tag used when the error is captured into an
    /// [`ExceptionSchema`](crate::report::ExceptionSchema).
    pub fn kind(&self) -> &'static str {
        match self {
            GuardError::InvalidExpression(_) => "InvalidExpression",
            GuardError::InvalidOperand { .. } => "InvalidOperand",
            GuardError::UnknownCommand(_) => "UnknownCommand",
            GuardError::CustomPredicate { .. } => "CustomPredicate",
            GuardError::MaskLength { .. } => "MaskLength",
            GuardError::DataFusion(_) => "DataFusion",
            GuardError::Arrow(_) => "Arrow",
            GuardError::DataSource { .. } => "DataSource",
            GuardError::Io(_) => "Io",
            GuardError::Configuration(_) => "Configuration",
            GuardError::Serialization(_) => "Serialization",
            GuardError::ColumnNotFound { .. } => "ColumnNotFound",
            GuardError::TypeMismatch { .. } => "TypeMismatch",
            GuardError::Internal(_) => "Internal",
            GuardError::SecurityError(_) => "SecurityError",
        }
    }

    /// Returns true for errors raised while building an expression tree.
    ///
    /// These are fatal: the tree is rejected before any evaluation starts.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            GuardError::InvalidExpression(_)
                | GuardError::InvalidOperand { .. }
                | GuardError::UnknownCommand(_)
        )
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        GuardError::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<GuardError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            GuardError::Internal(inner) => GuardError::Internal(format!("{msg}: {inner}")),
            other => GuardError::Internal(format!("{msg}: {other}")),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            match e.into() {
                GuardError::Internal(inner) => GuardError::Internal(format!("{msg}: {inner}")),
                other => GuardError::Internal(format!("{msg}: {other}")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_invalid_expression_error() {
        let err = GuardError::InvalidExpression("conjunction needs 2 children".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid expression: conjunction needs 2 children"
        );
        assert!(err.is_structural());
        assert_eq!(err.kind(), "InvalidExpression");
    }

    #[test]
    fn test_custom_predicate_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = GuardError::custom_predicate_with_source(
            "in_range",
            "could not build mask",
            Box::new(source),
        );

        assert!(err.source().is_some());
        assert!(!err.is_structural());
    }

    #[test]
    fn test_column_not_found() {
        let err = GuardError::column_not_found("age");
        assert_eq!(err.to_string(), "Column 'age' not found in dataset");
        assert_eq!(err.kind(), "ColumnNotFound");
    }

    #[test]
    fn test_type_mismatch() {
        let err = GuardError::TypeMismatch {
            expected: "Int64".to_string(),
            found: "Utf8".to_string(),
        };
        assert_eq!(err.to_string(), "Type mismatch: expected Int64, found Utf8");
    }

    #[test]
    fn test_error_context() {
        fn failing_operation() -> Result<()> {
            Err(GuardError::Internal("Something went wrong".to_string()))
        }

        let err = failing_operation()
            .context("During evaluation")
            .unwrap_err();
        assert!(err.to_string().contains("During evaluation"));
    }
}
