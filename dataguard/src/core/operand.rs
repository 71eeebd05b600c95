//! Literal and column operands of predicate applications.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GuardError, Result};
use crate::security::SqlSecurity;

/// A literal comparison value as it appears in a check configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    /// Renders the literal as a SQL expression.
    ///
    /// Non-finite floats have no SQL literal form and are rejected.
    pub fn to_sql(&self) -> Result<String> {
        match self {
            Literal::Null => Ok("NULL".to_string()),
            Literal::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Literal::Int(i) => Ok(i.to_string()),
            Literal::Float(f) if f.is_finite() => Ok(format!("{f:?}")),
            Literal::Float(f) => Err(GuardError::invalid_operand(
                "literal",
                format!("non-finite number {f} cannot be compared"),
            )),
            Literal::Str(s) => Ok(SqlSecurity::escape_string_literal(s)),
        }
    }

    /// Returns a short name of the literal's kind, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Bool(_) => "boolean",
            Literal::Int(_) => "integer",
            Literal::Float(_) => "float",
            Literal::Str(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Int(value as i64)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Str(value)
    }
}

/// The right-hand side of a predicate application.
///
/// Literal values are broadcast across rows; column operands are compared row by row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Operand {
    #[default]
    None,
    Values(Vec<Literal>),
    Columns(Vec<String>),
}

impl Operand {
    /// Builds an operand from the optional configuration lists.
    ///
    /// Supplying both lists is ambiguous and rejected; empty lists count as absent.
    pub fn from_args(
        command: &str,
        arg_values: Option<Vec<Literal>>,
        arg_columns: Option<Vec<String>>,
    ) -> Result<Self> {
        let values = arg_values.filter(|v| !v.is_empty());
        let columns = arg_columns.filter(|c| !c.is_empty());
        match (values, columns) {
            (Some(_), Some(_)) => Err(GuardError::invalid_operand(
                command,
                "arg_values and arg_columns are mutually exclusive",
            )),
            (Some(values), None) => Ok(Operand::Values(values)),
            (None, Some(columns)) => Ok(Operand::Columns(columns)),
            (None, None) => Ok(Operand::None),
        }
    }

    /// Number of operand entries.
    pub fn len(&self) -> usize {
        match self {
            Operand::None => 0,
            Operand::Values(v) => v.len(),
            Operand::Columns(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column names referenced by the operand.
    pub fn columns(&self) -> &[String] {
        match self {
            Operand::Columns(c) => c,
            _ => &[],
        }
    }

    /// Renders the operand for generated messages: a single entry is quoted,
    /// several are listed in brackets.
    pub fn describe(&self) -> Option<String> {
        match self {
            Operand::None => None,
            Operand::Values(values) => Some(quote_list(values.iter().map(|v| v.to_string()))),
            Operand::Columns(columns) => Some(quote_list(columns.iter().cloned())),
        }
    }

    pub(crate) fn values(&self) -> Option<&[Literal]> {
        match self {
            Operand::Values(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn to_args(&self) -> (Option<Vec<Literal>>, Option<Vec<String>>) {
        match self {
            Operand::None => (None, None),
            Operand::Values(v) => (Some(v.clone()), None),
            Operand::Columns(c) => (None, Some(c.clone())),
        }
    }
}

/// Quotes a single item, or lists several as `["a", "b"]`.
pub(crate) fn quote_list(items: impl Iterator<Item = String>) -> String {
    let items: Vec<String> = items.collect();
    if items.len() == 1 {
        format!("\"{}\"", items[0])
    } else {
        let quoted: Vec<String> = items.iter().map(|i| format!("\"{i}\"")).collect();
        format!("[{}]", quoted.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_deserialize_untagged() {
        let values: Vec<Literal> = serde_json::from_str(r#"[null, true, 3, 2.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Literal::Null,
                Literal::Bool(true),
                Literal::Int(3),
                Literal::Float(2.5),
                Literal::Str("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_literal_to_sql() {
        assert_eq!(Literal::Int(-5).to_sql().unwrap(), "-5");
        assert_eq!(Literal::Float(1.0).to_sql().unwrap(), "1.0");
        assert_eq!(Literal::Str("O'Neil".into()).to_sql().unwrap(), "'O''Neil'");
        assert_eq!(Literal::Null.to_sql().unwrap(), "NULL");
        assert!(Literal::Float(f64::NAN).to_sql().is_err());
    }

    #[test]
    fn test_operand_from_args() {
        let op = Operand::from_args("is_equal_to", Some(vec![Literal::Int(1)]), None).unwrap();
        assert_eq!(op.len(), 1);

        let op = Operand::from_args("is_equal_to", None, Some(vec!["b".to_string()])).unwrap();
        assert_eq!(op.columns(), &["b".to_string()]);

        assert!(Operand::from_args(
            "is_equal_to",
            Some(vec![Literal::Int(1)]),
            Some(vec!["b".to_string()])
        )
        .is_err());

        let op = Operand::from_args("is_null", Some(vec![]), None).unwrap();
        assert_eq!(op, Operand::None);
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            Operand::Values(vec![Literal::Int(0)]).describe().unwrap(),
            "\"0\""
        );
        assert_eq!(
            Operand::Values(vec![Literal::from("a"), Literal::from("b")])
                .describe()
                .unwrap(),
            "[\"a\", \"b\"]"
        );
        assert!(Operand::None.describe().is_none());
    }
}
