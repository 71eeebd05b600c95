//! # dataguard - rule-based validation of tabular data
//!
//! dataguard validates columnar data against checks declared in configuration.
//! A check is an expression tree: leaves apply a predicate from a fixed catalog
//! (or a registered custom predicate) to one column, and inner nodes combine two
//! subtrees by conjunction, disjunction or condition. Every tree is compiled to
//! one deferred DataFusion expression and evaluated once, so a composed check
//! yields exactly one error record no matter how many leaves fail.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dataguard::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let schema = SchemaConfig::from_json(r#"{
//!     "name": "patients",
//!     "columns": [
//!         {"id": "age", "nullable": false, "checks": [
//!             {"check_case": "conjunction", "expressions": [
//!                 {"command": "is_greater_than_or_equal_to", "arg_values": [0]},
//!                 {"command": "is_less_than", "arg_values": [150]}
//!             ]}
//!         ]}
//!     ]
//! }"#)?;
//!
//! let validator = Validator::from_config(&schema, &PredicateRegistry::new())?;
//! let source = LazySource::from_json_columns(vec![
//!     ("age", vec![json!(-5), json!(30), json!(150), json!(null)]),
//! ])?;
//!
//! let collector = ErrorCollector::new();
//! let report = validator.validate(&source, &collector).await;
//! for error in &report.errors {
//!     println!("{}: {} (rows {:?})", error.error_type, error.message, error.row_ids);
//! }
//! println!("{}", collector.to_json_pretty()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`core`]: commands, expression trees, checks, configuration and the validator
//! - [`evaluator`]: compilation of trees to validity masks
//! - [`report`]: error records, reports and the collector
//! - [`sources`]: lazy views over arrow data
//! - [`logging`]: structured logging setup

pub mod core;
pub mod error;
pub mod evaluator;
pub mod logging;
pub mod predicates;
pub mod prelude;
pub mod report;
pub mod security;
pub mod sources;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
