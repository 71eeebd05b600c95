//! Top-level checks.
//!
//! A [`Check`] wraps one expression tree with its presentation (name, level,
//! message) and its binding: a column-level check is bound to its target column,
//! a frame-level check either spans the columns its leaves name (combined) or is
//! replicated once per column (a single leaf listing several subjects, or none).
//!
//! ```rust
//! use dataguard::core::{Check, Command, ExpressionNode, Level, PredicateApplication};
//!
//! let node = ExpressionNode::simple(
//!     PredicateApplication::builder(Command::IsNotNull)
//!         .subject(["age", "weight"])
//!         .build()
//!         .unwrap(),
//! );
//! let check = Check::builder(node).level(Level::Critical).build().unwrap();
//! assert_eq!(check.bindings(), vec![Some("age".to_string()), Some("weight".to_string())]);
//! ```

use tracing::debug;

use super::config::CheckConfig;
use super::custom::PredicateRegistry;
use super::expression::{ExpressionBuilder, ExpressionNode};
use super::level::Level;
use super::Command;
use crate::error::{GuardError, Result};
use crate::report::ErrorType;

/// How a check maps onto columns.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckMode {
    /// Evaluated once, bound to the target column if there is one.
    Combined,
    /// Evaluated once per listed column, each evaluation bound to that column.
    Replicated(Vec<String>),
}

/// A top-level check.
#[derive(Debug, Clone)]
pub struct Check {
    title: String,
    level: Level,
    error_msg: Option<String>,
    node: ExpressionNode,
    target: Option<String>,
    mode: CheckMode,
    error_type: ErrorType,
}

impl Check {
    /// Starts building a check around `node`.
    pub fn builder(node: ExpressionNode) -> CheckBuilder {
        CheckBuilder::new(node)
    }

    /// Builds a check from a configuration record.
    ///
    /// `target` binds the check to a column; `all_columns` is what an empty
    /// subject of a frame-level check expands to.
    pub fn from_config(
        config: &CheckConfig,
        registry: &PredicateRegistry,
        target: Option<&str>,
        all_columns: &[String],
    ) -> Result<Self> {
        let node = ExpressionBuilder::new(registry).build(&config.expression)?;
        let mut builder = Check::builder(node)
            .level(config.error_level)
            .replicate_over(all_columns.to_vec());
        if let Some(name) = &config.name {
            builder = builder.name(name.clone());
        }
        if let Some(msg) = &config.error_msg {
            builder = builder.error_msg(msg.clone());
        }
        if let Some(target) = target {
            builder = builder.target(target);
        }
        builder.build()
    }

    /// The configured name, or the generated title.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn node(&self) -> &ExpressionNode {
        &self.node
    }

    /// The column a column-level check is bound to.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn mode(&self) -> &CheckMode {
        &self.mode
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// The keys the check is evaluated under, one evaluation each.
    pub fn bindings(&self) -> Vec<Option<String>> {
        match &self.mode {
            CheckMode::Combined => vec![self.target.clone()],
            CheckMode::Replicated(columns) => columns.iter().cloned().map(Some).collect(),
        }
    }

    /// The message for a failure under `key`: the configured message, or one
    /// generated from the tree.
    pub fn error_msg(&self, key: Option<&str>) -> String {
        if let Some(msg) = &self.error_msg {
            return msg.clone();
        }
        match (&self.mode, key, self.node.as_simple()) {
            (CheckMode::Replicated(_), Some(key), Some(app)) => {
                ExpressionNode::simple(app.with_subject(vec![key.to_string()])).message()
            }
            _ => self.node.message(),
        }
    }
}

/// Builder for [`Check`].
#[derive(Debug, Clone)]
pub struct CheckBuilder {
    node: ExpressionNode,
    name: Option<String>,
    level: Level,
    error_msg: Option<String>,
    target: Option<String>,
    all_columns: Vec<String>,
}

impl CheckBuilder {
    pub fn new(node: ExpressionNode) -> Self {
        Self {
            node,
            name: None,
            level: Level::default(),
            error_msg: None,
            target: None,
            all_columns: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Binds the check to one column.
    pub fn target(mut self, column: impl Into<String>) -> Self {
        self.target = Some(column.into());
        self
    }

    /// Columns a frame-level leaf without subject is replicated over.
    pub fn replicate_over(mut self, columns: Vec<String>) -> Self {
        self.all_columns = columns;
        self
    }

    pub fn build(self) -> Result<Check> {
        let title = self.name.clone().unwrap_or_else(|| self.node.title());
        let error_type = match self.node.as_simple().map(|app| app.command()) {
            Some(Command::IsNotNull) => ErrorType::SeriesContainsNulls,
            Some(Command::IsUnique) => ErrorType::SeriesContainsDuplicates,
            _ => ErrorType::DataframeCheck,
        };

        let (node, mode) = match (&self.target, &self.node) {
            (Some(_), node) => (node.clone(), CheckMode::Combined),
            (None, ExpressionNode::Simple(app)) if app.subject().len() == 1 => {
                (self.node.clone(), CheckMode::Combined)
            }
            (None, ExpressionNode::Simple(app)) => {
                let columns = if app.subject().is_empty() {
                    self.all_columns.clone()
                } else {
                    app.subject().to_vec()
                };
                if columns.is_empty() {
                    return Err(GuardError::InvalidExpression(format!(
                        "check '{title}' has no subject and no columns to apply to"
                    )));
                }
                debug!(check = %title, columns = ?columns, "Replicating frame-level check");
                (
                    ExpressionNode::simple(app.with_subject(Vec::new())),
                    CheckMode::Replicated(columns),
                )
            }
            (None, node) if node.requires_key() && !node.has_custom() => {
                return Err(GuardError::InvalidExpression(format!(
                    "frame-level check '{title}' has a leaf without subject"
                )));
            }
            (None, node) => (node.clone(), CheckMode::Combined),
        };

        Ok(Check {
            title,
            level: self.level,
            error_msg: self.error_msg,
            node,
            target: self.target,
            mode,
            error_type,
        })
    }
}
