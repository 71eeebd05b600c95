//! Declarative configuration records.
//!
//! These are the serde shapes a configuration loader produces. They carry names
//! (commands are plain strings here) and are turned into typed expression trees
//! by [`ExpressionBuilder`](super::ExpressionBuilder).
//!
//! ```rust
//! use dataguard::core::SchemaConfig;
//!
//! let config = SchemaConfig::from_json(r#"{
//!     "name": "patients",
//!     "columns": [
//!         {"id": "age", "data_type": "integer", "nullable": false, "checks": [
//!             {"check_case": "conjunction", "expressions": [
//!                 {"command": "is_greater_than_or_equal_to", "arg_values": [0]},
//!                 {"command": "is_less_than", "arg_values": [150]}
//!             ]}
//!         ]}
//!     ]
//! }"#).unwrap();
//! assert_eq!(config.columns[0].checks.len(), 1);
//! ```

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::command::CheckCase;
use super::level::Level;
use super::operand::Literal;
use crate::error::Result;

/// A configured check: presentation attributes plus a simple or composite expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub error_level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(flatten)]
    pub expression: ExpressionConfig,
}

impl CheckConfig {
    /// A check with default presentation around `expression`.
    pub fn new(expression: ExpressionConfig) -> Self {
        Self {
            name: None,
            error_level: Level::default(),
            error_msg: None,
            expression,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.error_level = level;
        self
    }

    pub fn with_error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }
}

/// A simple or composite expression record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpressionConfig {
    Composite(CompositeExpressionConfig),
    Simple(SimpleExpressionConfig),
}

impl ExpressionConfig {
    /// A simple expression applying `command`.
    pub fn simple(command: impl Into<String>) -> SimpleExpressionConfig {
        SimpleExpressionConfig {
            command: command.into(),
            subject: None,
            arg_values: None,
            arg_columns: None,
        }
    }

    pub fn conjunction(left: ExpressionConfig, right: ExpressionConfig) -> Self {
        Self::composite(CheckCase::Conjunction, left, right)
    }

    pub fn disjunction(left: ExpressionConfig, right: ExpressionConfig) -> Self {
        Self::composite(CheckCase::Disjunction, left, right)
    }

    pub fn condition(guard: ExpressionConfig, consequent: ExpressionConfig) -> Self {
        Self::composite(CheckCase::Condition, guard, consequent)
    }

    fn composite(check_case: CheckCase, a: ExpressionConfig, b: ExpressionConfig) -> Self {
        ExpressionConfig::Composite(CompositeExpressionConfig {
            check_case,
            expressions: vec![a, b],
        })
    }
}

impl From<SimpleExpressionConfig> for ExpressionConfig {
    fn from(value: SimpleExpressionConfig) -> Self {
        ExpressionConfig::Simple(value)
    }
}

/// A leaf record: a command name with its subject and operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleExpressionConfig {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg_values: Option<Vec<Literal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg_columns: Option<Vec<String>>,
}

impl SimpleExpressionConfig {
    pub fn subject<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subject = Some(columns.into_iter().map(Into::into).collect());
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
        self.arg_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.arg_columns = Some(vec![column.into()]);
        self
    }

    /// Wraps the leaf into a check record with default presentation.
    pub fn into_check(self) -> CheckConfig {
        CheckConfig::new(self.into())
    }
}

/// A composite record. `expressions` must hold exactly two children; this is
/// enforced when the tree is built, not when the record is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeExpressionConfig {
    pub check_case: CheckCase,
    pub expressions: Vec<ExpressionConfig>,
}

/// Declared logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationType {
    Date,
    Datetime,
    Boolean,
    Decimal,
    Integer,
    Varchar,
    Categorical,
}

impl ValidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationType::Date => "date",
            ValidationType::Datetime => "datetime",
            ValidationType::Boolean => "boolean",
            ValidationType::Decimal => "decimal",
            ValidationType::Integer => "integer",
            ValidationType::Varchar => "varchar",
            ValidationType::Categorical => "categorical",
        }
    }

    /// Returns true if an arrow column of `data_type` satisfies the declared type.
    ///
    /// A column holding only nulls (`DataType::Null`) satisfies every type and
    /// integer columns satisfy `decimal`. Text columns declared `date` or
    /// `datetime` do not match here; see [`ValidationType::text_cast_target`].
    pub fn matches(&self, data_type: &DataType) -> bool {
        if matches!(data_type, DataType::Null) {
            return true;
        }
        match self {
            ValidationType::Date => matches!(data_type, DataType::Date32 | DataType::Date64),
            ValidationType::Datetime => matches!(data_type, DataType::Timestamp(_, _)),
            ValidationType::Boolean => matches!(data_type, DataType::Boolean),
            ValidationType::Decimal => matches!(
                data_type,
                DataType::Float16
                    | DataType::Float32
                    | DataType::Float64
                    | DataType::Decimal128(_, _)
                    | DataType::Decimal256(_, _)
            ) || data_type.is_integer(),
            ValidationType::Integer => data_type.is_integer(),
            ValidationType::Varchar | ValidationType::Categorical => match data_type {
                DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => true,
                DataType::Dictionary(_, value) => self.matches(value),
                _ => false,
            },
        }
    }

    /// The SQL type a text column declared with this type is cast to. Such a
    /// column is accepted when every non-null value casts.
    pub fn text_cast_target(&self, data_type: &DataType) -> Option<&'static str> {
        if matches!(data_type, DataType::Null) || !ValidationType::Varchar.matches(data_type) {
            return None;
        }
        match self {
            ValidationType::Date => Some("DATE"),
            ValidationType::Datetime => Some("TIMESTAMP"),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// Rules for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<ValidationType>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

impl ColumnConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_type: None,
            nullable: true,
            unique: false,
            required: true,
            checks: Vec::new(),
        }
    }

    pub fn data_type(mut self, data_type: ValidationType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn check(mut self, check: CheckConfig) -> Self {
        self.checks.push(check);
        self
    }
}

/// Rules for a whole table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    /// Columns that jointly identify a row.
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Frame-level checks.
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

impl SchemaConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            ids: Vec::new(),
            metadata: HashMap::new(),
            checks: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn column(mut self, column: ColumnConfig) -> Self {
        self.columns.push(column);
        self
    }

    pub fn check(mut self, check: CheckConfig) -> Self {
        self.checks.push(check);
        self
    }

    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Names of the declared columns, in declaration order.
    pub fn column_ids(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.id.clone()).collect()
    }
}
