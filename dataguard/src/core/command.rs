//! The closed set of predicate commands and composition cases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::custom::CustomPredicate;
use crate::error::{GuardError, Result};

/// How many operands a command accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandArity {
    /// The command takes no operand (`is_null`, `is_unique`, ...)
    None,
    /// Exactly one literal or one comparison column
    Single,
    /// One or more literals
    List,
    /// Anything; the predicate interprets its own arguments
    Any,
}

/// A predicate command: one arm per catalog operation plus user supplied predicates.
///
/// Configuration refers to commands by their snake_case name; [`Command::parse`]
/// turns such a name into a variant once, at construction time, so that the
/// evaluator dispatches on the enum and never on strings.
#[derive(Clone)]
pub enum Command {
    IsEqualTo,
    IsEqualToOrBothMissing,
    IsGreaterThanOrEqualTo,
    IsGreaterThan,
    IsLessThanOrEqualTo,
    IsLessThan,
    IsNotEqualTo,
    IsNotEqualToAndNotBothMissing,
    IsUnique,
    IsDuplicated,
    IsIn,
    IsNull,
    IsNotNull,
    /// A user supplied predicate participating as a leaf.
    Custom(Arc<dyn CustomPredicate>),
}

impl Command {
    /// All catalog commands, in catalog order.
    pub const CATALOG: [Command; 13] = [
        Command::IsEqualTo,
        Command::IsEqualToOrBothMissing,
        Command::IsGreaterThanOrEqualTo,
        Command::IsGreaterThan,
        Command::IsLessThanOrEqualTo,
        Command::IsLessThan,
        Command::IsNotEqualTo,
        Command::IsNotEqualToAndNotBothMissing,
        Command::IsUnique,
        Command::IsDuplicated,
        Command::IsIn,
        Command::IsNull,
        Command::IsNotNull,
    ];

    /// Wraps a user supplied predicate.
    pub fn custom(predicate: Arc<dyn CustomPredicate>) -> Self {
        Command::Custom(predicate)
    }

    /// Returns the configuration name of the command.
    pub fn as_str(&self) -> &str {
        match self {
            Command::IsEqualTo => "is_equal_to",
            Command::IsEqualToOrBothMissing => "is_equal_to_or_both_missing",
            Command::IsGreaterThanOrEqualTo => "is_greater_than_or_equal_to",
            Command::IsGreaterThan => "is_greater_than",
            Command::IsLessThanOrEqualTo => "is_less_than_or_equal_to",
            Command::IsLessThan => "is_less_than",
            Command::IsNotEqualTo => "is_not_equal_to",
            Command::IsNotEqualToAndNotBothMissing => "is_not_equal_to_and_not_both_missing",
            Command::IsUnique => "is_unique",
            Command::IsDuplicated => "is_duplicated",
            Command::IsIn => "is_in",
            Command::IsNull => "is_null",
            Command::IsNotNull => "is_not_null",
            Command::Custom(predicate) => predicate.name(),
        }
    }

    /// Looks up a catalog command by name.
    ///
    /// Returns `None` for names outside the catalog; those may still resolve to a
    /// registered custom predicate.
    pub fn from_catalog(name: &str) -> Option<Self> {
        Self::CATALOG.iter().find(|c| c.as_str() == name).cloned()
    }

    /// Parses a catalog command name.
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_catalog(name).ok_or_else(|| GuardError::UnknownCommand(name.to_string()))
    }

    /// Returns the operand arity the command requires.
    pub fn arity(&self) -> OperandArity {
        match self {
            Command::IsEqualTo
            | Command::IsEqualToOrBothMissing
            | Command::IsGreaterThanOrEqualTo
            | Command::IsGreaterThan
            | Command::IsLessThanOrEqualTo
            | Command::IsLessThan
            | Command::IsNotEqualTo
            | Command::IsNotEqualToAndNotBothMissing => OperandArity::Single,
            Command::IsIn => OperandArity::List,
            Command::IsUnique | Command::IsDuplicated | Command::IsNull | Command::IsNotNull => {
                OperandArity::None
            }
            Command::Custom(_) => OperandArity::Any,
        }
    }

    /// Returns true if the command accepts a comparison column as operand.
    pub fn accepts_column_operand(&self) -> bool {
        matches!(self.arity(), OperandArity::Single | OperandArity::Any)
    }

    /// Returns true for commands whose validity depends on the whole column
    /// rather than the row alone.
    pub fn is_window(&self) -> bool {
        matches!(self, Command::IsUnique | Command::IsDuplicated)
    }

    /// Returns true for user supplied predicates.
    pub fn is_custom(&self) -> bool {
        matches!(self, Command::Custom(_))
    }

    /// Renders the human readable title, e.g. `Is not null`.
    pub fn title(&self) -> String {
        let spaced = self.as_str().replace('_', " ");
        let mut chars = spaced.chars();
        match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.flat_map(|c| c.to_lowercase()))
                .collect(),
            None => String::new(),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Custom(predicate) => f.debug_tuple("Custom").field(&predicate.name()).finish(),
            other => f.write_str(other.as_str()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Command::Custom(a), Command::Custom(b)) => Arc::ptr_eq(a, b) || a.name() == b.name(),
            (Command::Custom(_), _) | (_, Command::Custom(_)) => false,
            (a, b) => a.as_str() == b.as_str(),
        }
    }
}

impl FromStr for Command {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// The boolean combination applied by a composite node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckCase {
    /// The second child is checked only on rows where the first holds.
    Condition,
    /// Both children must hold.
    Conjunction,
    /// At least one child must hold.
    Disjunction,
}

impl CheckCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCase::Condition => "condition",
            CheckCase::Conjunction => "conjunction",
            CheckCase::Disjunction => "disjunction",
        }
    }
}

impl fmt::Display for CheckCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_names() {
        for command in Command::CATALOG.iter() {
            let parsed = Command::parse(command.as_str()).unwrap();
            assert_eq!(&parsed, command);
        }
    }

    #[test]
    fn test_unknown_command() {
        let err = Command::parse("is_between").unwrap_err();
        assert!(matches!(err, GuardError::UnknownCommand(name) if name == "is_between"));
    }

    #[test]
    fn test_titles() {
        assert_eq!(Command::IsNotNull.title(), "Is not null");
        assert_eq!(
            Command::IsGreaterThanOrEqualTo.title(),
            "Is greater than or equal to"
        );
    }

    #[test]
    fn test_arity() {
        assert_eq!(Command::IsLessThan.arity(), OperandArity::Single);
        assert_eq!(Command::IsIn.arity(), OperandArity::List);
        assert_eq!(Command::IsUnique.arity(), OperandArity::None);
        assert!(!Command::IsIn.accepts_column_operand());
        assert!(Command::IsDuplicated.is_window());
    }

    #[test]
    fn test_check_case_serde() {
        let case: CheckCase = serde_json::from_str("\"disjunction\"").unwrap();
        assert_eq!(case, CheckCase::Disjunction);
        assert_eq!(serde_json::to_string(&CheckCase::Condition).unwrap(), "\"condition\"");
    }
}
