//! Core validation types.
//!
//! ## Overview
//!
//! - **[`Validator`]**: the checks of one schema, run against a source
//! - **[`Check`]**: one expression tree with a name, a [`Level`] and a message
//! - **[`ExpressionNode`]**: a [`PredicateApplication`] leaf, or a conjunction,
//!   disjunction or condition over two subtrees
//! - **[`Command`]**: the predicate a leaf applies, from the catalog or a
//!   registered [`CustomPredicate`]
//!
//! ## Architecture
//!
//! ```text
//! Validator
//!     ├── Check (Level: Error, bound to "age")
//!     │   └── Conjunction
//!     │       ├── is_greater_than_or_equal_to [0]
//!     │       └── is_less_than [150]
//!     └── Check (Level: Warning, frame-level)
//!         └── Condition
//!             ├── is_equal_to "M" on sex
//!             └── is_equal_to false on pregnant
//! ```
//!
//! Configurations deserialize into [`SchemaConfig`], [`ColumnConfig`] and
//! [`CheckConfig`]; [`Validator::from_config`] turns them into checks.

mod check;
mod command;
mod config;
pub mod custom;
mod expression;
mod level;
mod operand;
mod validator;

pub use check::{Check, CheckBuilder, CheckMode};
pub use command::{CheckCase, Command, OperandArity};
pub use config::{
    CheckConfig, ColumnConfig, CompositeExpressionConfig, ExpressionConfig, SchemaConfig,
    SimpleExpressionConfig, ValidationType,
};
pub use custom::{CheckData, CustomPredicate, FnPredicate, PredicateArgs, PredicateRegistry};
pub use expression::{
    CompositeNode, ExpressionBuilder, ExpressionNode, PredicateApplication,
    PredicateApplicationBuilder,
};
pub use level::Level;
pub use operand::{Literal, Operand};
pub use validator::{ColumnRule, Validator, ValidatorBuilder, ValidatorConfig};
