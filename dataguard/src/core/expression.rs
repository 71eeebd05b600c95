//! Expression trees: predicate applications combined by boolean composition.

use std::fmt;
use tracing::debug;

use super::command::{CheckCase, Command, OperandArity};
use super::config::ExpressionConfig;
use super::custom::{PredicateArgs, PredicateRegistry};
use super::operand::{quote_list, Literal, Operand};
use crate::error::{GuardError, Result};

/// A leaf of an expression tree: one command applied to a subject.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateApplication {
    command: Command,
    subject: Vec<String>,
    operand: Operand,
}

impl PredicateApplication {
    /// Creates a leaf, rejecting operands that do not fit the command's arity.
    pub fn new(command: Command, subject: Vec<String>, operand: Operand) -> Result<Self> {
        validate_arity(&command, &operand)?;
        Ok(Self {
            command,
            subject,
            operand,
        })
    }

    /// Starts building a leaf for `command`.
    pub fn builder(command: Command) -> PredicateApplicationBuilder {
        PredicateApplicationBuilder {
            command,
            subject: Vec::new(),
            operand: Operand::None,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn subject(&self) -> &[String] {
        &self.subject
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// The column the leaf is evaluated against: its first subject column, or
    /// the key of the check it belongs to.
    pub fn resolve_column<'a>(&'a self, key: Option<&'a str>) -> Result<&'a str> {
        self.subject
            .first()
            .map(String::as_str)
            .or(key)
            .ok_or_else(|| {
                GuardError::InvalidExpression(format!(
                    "'{}' has no subject and is not bound to a column",
                    self.command
                ))
            })
    }

    /// Arguments as handed to custom predicates.
    pub fn args(&self) -> PredicateArgs {
        let (arg_values, arg_columns) = self.operand.to_args();
        PredicateArgs {
            subject: self.subject.clone(),
            arg_values,
            arg_columns,
        }
    }

    pub(crate) fn with_subject(&self, subject: Vec<String>) -> Self {
        Self {
            command: self.command.clone(),
            subject,
            operand: self.operand.clone(),
        }
    }

    fn title(&self) -> String {
        self.command.title()
    }

    fn message(&self) -> String {
        let verb = self.title().to_lowercase();
        let mut msg = if self.subject.is_empty() {
            format!("The column under validation {verb}")
        } else {
            format!(
                "Column(s) {} {verb}",
                quote_list(self.subject.iter().cloned())
            )
        };
        if let Some(operand) = self.operand.describe() {
            msg.push(' ');
            msg.push_str(&operand);
        }
        msg
    }
}

/// Builder for [`PredicateApplication`].
#[derive(Debug, Clone)]
pub struct PredicateApplicationBuilder {
    command: Command,
    subject: Vec<String>,
    operand: Operand,
}

impl PredicateApplicationBuilder {
    pub fn subject<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subject = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn value(self, value: impl Into<Literal>) -> Self {
        self.values([value])
    }

    pub fn values<I, L>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        self.operand = Operand::Values(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.operand = Operand::Columns(vec![column.into()]);
        self
    }

    pub fn build(self) -> Result<PredicateApplication> {
        PredicateApplication::new(self.command, self.subject, self.operand)
    }
}

fn validate_arity(command: &Command, operand: &Operand) -> Result<()> {
    let name = command.as_str();
    match (command.arity(), operand) {
        (OperandArity::Any, _) => Ok(()),
        (OperandArity::None, Operand::None) => Ok(()),
        (OperandArity::None, _) => Err(GuardError::invalid_operand(
            name,
            "command does not take arg_values or arg_columns",
        )),
        (OperandArity::Single, Operand::Values(_) | Operand::Columns(_)) if operand.len() == 1 => {
            Ok(())
        }
        (OperandArity::Single, _) => Err(GuardError::invalid_operand(
            name,
            format!("expected exactly one operand, got {}", operand.len()),
        )),
        (OperandArity::List, Operand::Values(values)) if !values.is_empty() => Ok(()),
        (OperandArity::List, Operand::Columns(_)) => Err(GuardError::invalid_operand(
            name,
            "column operands are not supported, use arg_values",
        )),
        (OperandArity::List, _) => Err(GuardError::invalid_operand(
            name,
            "expected one or more arg_values",
        )),
    }
}

/// A boolean combination of exactly two children.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeNode {
    case: CheckCase,
    left: Box<ExpressionNode>,
    right: Box<ExpressionNode>,
}

impl CompositeNode {
    pub fn case(&self) -> CheckCase {
        self.case
    }

    /// The first child; the guard of a condition.
    pub fn left(&self) -> &ExpressionNode {
        &self.left
    }

    /// The second child; the consequent of a condition.
    pub fn right(&self) -> &ExpressionNode {
        &self.right
    }
}

/// A node of an expression tree. Each node owns its children.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    Simple(PredicateApplication),
    Composite(CompositeNode),
}

impl ExpressionNode {
    pub fn simple(application: PredicateApplication) -> Self {
        ExpressionNode::Simple(application)
    }

    pub fn composite(case: CheckCase, left: ExpressionNode, right: ExpressionNode) -> Self {
        ExpressionNode::Composite(CompositeNode {
            case,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Valid where both children are valid.
    pub fn conjunction(left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::composite(CheckCase::Conjunction, left, right)
    }

    /// Valid where at least one child is valid.
    pub fn disjunction(left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::composite(CheckCase::Disjunction, left, right)
    }

    /// Checks `consequent` only on rows where `guard` holds.
    pub fn condition(guard: ExpressionNode, consequent: ExpressionNode) -> Self {
        Self::composite(CheckCase::Condition, guard, consequent)
    }

    pub fn as_simple(&self) -> Option<&PredicateApplication> {
        match self {
            ExpressionNode::Simple(app) => Some(app),
            ExpressionNode::Composite(_) => None,
        }
    }

    /// Generated title, e.g. `Is not null` or `When Is equal to, Then Is null`.
    pub fn title(&self) -> String {
        match self {
            ExpressionNode::Simple(app) => app.title(),
            ExpressionNode::Composite(node) => {
                let (a, b) = (node.left.title(), node.right.title());
                match node.case {
                    CheckCase::Conjunction => format!("{a} and {b}"),
                    CheckCase::Disjunction => format!("{a} or {b}"),
                    CheckCase::Condition => format!("When {a}, Then {b}"),
                }
            }
        }
    }

    /// Generated error message, e.g. `Column(s) "age" is greater than or equal to "0"`.
    pub fn message(&self) -> String {
        match self {
            ExpressionNode::Simple(app) => app.message(),
            ExpressionNode::Composite(node) => {
                let (a, b) = (node.left.message(), node.right.message());
                match node.case {
                    CheckCase::Conjunction => format!("{a} and {b}"),
                    CheckCase::Disjunction => format!("{a} or {b}"),
                    CheckCase::Condition => format!("When {a} Then {b}"),
                }
            }
        }
    }

    /// Visits every leaf, left to right.
    pub fn for_each_leaf<'a>(&'a self, f: &mut dyn FnMut(&'a PredicateApplication)) {
        match self {
            ExpressionNode::Simple(app) => f(app),
            ExpressionNode::Composite(node) => {
                node.left.for_each_leaf(f);
                node.right.for_each_leaf(f);
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        self.for_each_leaf(&mut |_| count += 1);
        count
    }

    /// Columns named by subjects, deduplicated in first-appearance order.
    pub fn subject_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        self.for_each_leaf(&mut |app| {
            if let Some(first) = app.subject.first() {
                if !columns.contains(first) {
                    columns.push(first.clone());
                }
            }
        });
        columns
    }

    /// Every column the tree reads, operand columns included.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut columns = self.subject_columns();
        self.for_each_leaf(&mut |app| {
            for column in app.operand.columns() {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        });
        columns
    }

    /// Returns true if some leaf has no subject and must take the check's key.
    pub fn requires_key(&self) -> bool {
        let mut unbound = false;
        self.for_each_leaf(&mut |app| unbound |= app.subject.is_empty());
        unbound
    }

    /// Returns true if some leaf is a user supplied predicate.
    pub fn has_custom(&self) -> bool {
        let mut custom = false;
        self.for_each_leaf(&mut |app| custom |= app.command.is_custom());
        custom
    }
}

impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title())
    }
}

/// Converts configuration records into expression trees.
///
/// Construction fails fast: wrong child counts, unknown commands and operands
/// that do not fit a command are rejected here, before anything is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionBuilder<'a> {
    registry: &'a PredicateRegistry,
}

impl<'a> ExpressionBuilder<'a> {
    pub fn new(registry: &'a PredicateRegistry) -> Self {
        Self { registry }
    }

    pub fn build(&self, config: &ExpressionConfig) -> Result<ExpressionNode> {
        match config {
            ExpressionConfig::Simple(simple) => {
                let command = self.registry.resolve(&simple.command)?;
                let operand = Operand::from_args(
                    &simple.command,
                    simple.arg_values.clone(),
                    simple.arg_columns.clone(),
                )?;
                let subject = simple.subject.clone().unwrap_or_default();
                Ok(ExpressionNode::Simple(PredicateApplication::new(
                    command, subject, operand,
                )?))
            }
            ExpressionConfig::Composite(composite) => {
                let [left, right] = composite.expressions.as_slice() else {
                    return Err(GuardError::InvalidExpression(format!(
                        "{} requires exactly 2 expressions, got {}",
                        composite.check_case,
                        composite.expressions.len()
                    )));
                };
                debug!(case = %composite.check_case, "Building composite expression");
                Ok(ExpressionNode::composite(
                    composite.check_case,
                    self.build(left)?,
                    self.build(right)?,
                ))
            }
        }
    }
}
