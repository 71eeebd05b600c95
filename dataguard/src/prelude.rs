//! Prelude for commonly used types and traits.

pub use crate::core::{
    Check, CheckConfig, ColumnConfig, Command, CustomPredicate, ExpressionConfig, ExpressionNode,
    FnPredicate, Level, Literal, PredicateApplication, PredicateRegistry, SchemaConfig, Validator,
    ValidatorConfig,
};
pub use crate::error::{ErrorContext, GuardError, Result};
pub use crate::logging::LogConfig;
pub use crate::report::{DFErrorSchema, ErrorCollector, ErrorReport, ErrorType};
pub use crate::sources::LazySource;
