//! The predicate catalog.
//!
//! Every catalog [`Command`] compiles to a SQL boolean fragment over one column.
//! The fragment is true for valid rows, false for invalid rows and may be NULL
//! (for instance `NULL >= 0`), which the evaluator treats as valid.
//!
//! | command | fragment |
//! |---|---|
//! | `is_equal_to` | `c = v` |
//! | `is_equal_to_or_both_missing` | `c IS NOT DISTINCT FROM v` |
//! | `is_greater_than_or_equal_to` | `c >= v` |
//! | `is_greater_than` | `c > v` |
//! | `is_less_than_or_equal_to` | `c <= v` |
//! | `is_less_than` | `c < v` |
//! | `is_not_equal_to` | `c <> v` |
//! | `is_not_equal_to_and_not_both_missing` | `c IS DISTINCT FROM v` |
//! | `is_unique` | `COUNT(*) OVER (PARTITION BY c) = 1` |
//! | `is_duplicated` | `COUNT(*) OVER (PARTITION BY c) > 1` |
//! | `is_in` | `c IN (v1, v2, ...)`, or `(c IN (...)) OR c IS NULL` when null is listed |
//! | `is_null` | `c IS NULL` |
//! | `is_not_null` | `c IS NOT NULL` |

use arrow::datatypes::DataType;

use crate::core::{Command, Literal, Operand};
use crate::error::{GuardError, Result};
use crate::security::SqlSecurity;

/// Coarse type families used to reject comparisons that cannot succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeFamily {
    Numeric,
    Text,
    Boolean,
    Temporal,
    Other,
    Unknown,
}

fn family(data_type: &DataType) -> TypeFamily {
    match data_type {
        DataType::Null => TypeFamily::Unknown,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => TypeFamily::Numeric,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => TypeFamily::Text,
        DataType::Dictionary(_, value) => family(value),
        DataType::Boolean => TypeFamily::Boolean,
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => TypeFamily::Temporal,
        _ => TypeFamily::Other,
    }
}

fn literal_fits(literal: &Literal, column_family: TypeFamily) -> bool {
    match (literal, column_family) {
        (Literal::Null, _) | (_, TypeFamily::Unknown) | (_, TypeFamily::Other) => true,
        (Literal::Int(_) | Literal::Float(_), TypeFamily::Numeric) => true,
        (Literal::Bool(_), TypeFamily::Boolean) => true,
        // string literals are cast to dates and timestamps by the engine
        (Literal::Str(_), TypeFamily::Text | TypeFamily::Temporal) => true,
        _ => false,
    }
}

fn check_literal(
    command: &Command,
    column: &str,
    literal: &Literal,
    column_type: Option<&DataType>,
) -> Result<String> {
    if let Some(data_type) = column_type {
        if !literal_fits(literal, family(data_type)) {
            return Err(GuardError::TypeMismatch {
                expected: format!("{data_type} value for column '{column}'"),
                found: format!("{} operand of '{}'", literal.kind(), command.as_str()),
            });
        }
    }
    literal.to_sql()
}

/// Renders the single right-hand side of a comparison command.
fn comparison_operand(
    command: &Command,
    column: &str,
    operand: &Operand,
    column_type: Option<&DataType>,
    operand_types: &dyn Fn(&str) -> Option<DataType>,
) -> Result<String> {
    match operand {
        Operand::Values(values) if values.len() == 1 => {
            check_literal(command, column, &values[0], column_type)
        }
        Operand::Columns(columns) if columns.len() == 1 => {
            let other = &columns[0];
            if let (Some(left), Some(right)) = (column_type, operand_types(other)) {
                let (lf, rf) = (family(left), family(&right));
                let comparable = lf == rf
                    || matches!(lf, TypeFamily::Unknown | TypeFamily::Other)
                    || matches!(rf, TypeFamily::Unknown | TypeFamily::Other);
                if !comparable {
                    return Err(GuardError::TypeMismatch {
                        expected: format!("{left} (column '{column}')"),
                        found: format!("{right} (column '{other}')"),
                    });
                }
            }
            SqlSecurity::escape_identifier(other)
        }
        _ => Err(GuardError::invalid_operand(
            command.as_str(),
            format!("expected exactly one operand, got {}", operand.len()),
        )),
    }
}

/// Compiles a catalog command applied to `column` into a SQL boolean fragment.
///
/// `column_types` resolves the arrow type of a column of the source; it is used
/// to reject operands whose type cannot be compared with the column.
pub fn sql_fragment(
    command: &Command,
    column: &str,
    operand: &Operand,
    column_types: &dyn Fn(&str) -> Option<DataType>,
) -> Result<String> {
    let c = SqlSecurity::escape_identifier(column)?;
    let column_type = column_types(column);
    let column_type = column_type.as_ref();

    let binary = |op: &str| -> Result<String> {
        let rhs = comparison_operand(command, column, operand, column_type, column_types)?;
        Ok(format!("{c} {op} {rhs}"))
    };

    match command {
        Command::IsEqualTo => binary("="),
        Command::IsEqualToOrBothMissing => binary("IS NOT DISTINCT FROM"),
        Command::IsGreaterThanOrEqualTo => binary(">="),
        Command::IsGreaterThan => binary(">"),
        Command::IsLessThanOrEqualTo => binary("<="),
        Command::IsLessThan => binary("<"),
        Command::IsNotEqualTo => binary("<>"),
        Command::IsNotEqualToAndNotBothMissing => binary("IS DISTINCT FROM"),
        Command::IsUnique => Ok(format!("COUNT(*) OVER (PARTITION BY {c}) = 1")),
        Command::IsDuplicated => Ok(format!("COUNT(*) OVER (PARTITION BY {c}) > 1")),
        Command::IsIn => {
            let values = operand.values().filter(|v| !v.is_empty()).ok_or_else(|| {
                GuardError::invalid_operand("is_in", "expected one or more literal values")
            })?;
            // a NULL inside IN (...) turns every non-member into NULL
            let accepts_null = values.iter().any(Literal::is_null);
            let rendered = values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| check_literal(command, column, v, column_type))
                .collect::<Result<Vec<_>>>()?;
            Ok(match (rendered.is_empty(), accepts_null) {
                (true, _) => format!("{c} IS NULL"),
                (false, false) => format!("{c} IN ({})", rendered.join(", ")),
                (false, true) => format!("({c} IN ({})) OR {c} IS NULL", rendered.join(", ")),
            })
        }
        Command::IsNull => Ok(format!("{c} IS NULL")),
        Command::IsNotNull => Ok(format!("{c} IS NOT NULL")),
        Command::Custom(predicate) => Err(GuardError::Internal(format!(
            "custom predicate '{}' has no SQL form",
            predicate.name()
        ))),
    }
}

/// Describes a predicate application, e.g. `age is greater than or equal to 0`.
pub fn describe(command: &Command, column: &str, operand: &Operand) -> String {
    let verb = command.title().to_lowercase();
    match operand {
        Operand::None => format!("{column} {verb}"),
        Operand::Values(values) if values.len() == 1 => format!("{column} {verb} {}", values[0]),
        Operand::Values(values) => {
            let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            format!("{column} {verb} [{}]", rendered.join(", "))
        }
        Operand::Columns(columns) => format!("{column} {verb} {}", columns.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(column: &str) -> Option<DataType> {
        match column {
            "age" | "min_age" => Some(DataType::Int64),
            "name" => Some(DataType::Utf8),
            "flag" => Some(DataType::Boolean),
            _ => None,
        }
    }

    fn values(items: Vec<Literal>) -> Operand {
        Operand::Values(items)
    }

    #[test]
    fn test_comparison_fragments() {
        let zero = values(vec![Literal::Int(0)]);
        assert_eq!(
            sql_fragment(&Command::IsGreaterThanOrEqualTo, "age", &zero, &types).unwrap(),
            "\"age\" >= 0"
        );
        assert_eq!(
            sql_fragment(&Command::IsEqualToOrBothMissing, "age", &zero, &types).unwrap(),
            "\"age\" IS NOT DISTINCT FROM 0"
        );
        assert_eq!(
            sql_fragment(&Command::IsNotEqualToAndNotBothMissing, "age", &zero, &types).unwrap(),
            "\"age\" IS DISTINCT FROM 0"
        );
    }

    #[test]
    fn test_column_operand() {
        let operand = Operand::Columns(vec!["min_age".to_string()]);
        assert_eq!(
            sql_fragment(&Command::IsGreaterThan, "age", &operand, &types).unwrap(),
            "\"age\" > \"min_age\""
        );

        let operand = Operand::Columns(vec!["name".to_string()]);
        assert!(matches!(
            sql_fragment(&Command::IsGreaterThan, "age", &operand, &types),
            Err(GuardError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_is_in_and_nulls() {
        let operand = values(vec![Literal::from("a"), Literal::from("b'c")]);
        assert_eq!(
            sql_fragment(&Command::IsIn, "name", &operand, &types).unwrap(),
            "\"name\" IN ('a', 'b''c')"
        );
        assert_eq!(
            sql_fragment(&Command::IsNull, "name", &Operand::None, &types).unwrap(),
            "\"name\" IS NULL"
        );
        assert!(sql_fragment(&Command::IsIn, "name", &Operand::None, &types).is_err());
    }

    #[test]
    fn test_is_in_with_null_member() {
        let operand = values(vec![Literal::Int(1), Literal::Null]);
        assert_eq!(
            sql_fragment(&Command::IsIn, "age", &operand, &types).unwrap(),
            "(\"age\" IN (1)) OR \"age\" IS NULL"
        );

        let operand = values(vec![Literal::Null]);
        assert_eq!(
            sql_fragment(&Command::IsIn, "age", &operand, &types).unwrap(),
            "\"age\" IS NULL"
        );
    }

    #[test]
    fn test_uniqueness_fragments() {
        assert_eq!(
            sql_fragment(&Command::IsUnique, "age", &Operand::None, &types).unwrap(),
            "COUNT(*) OVER (PARTITION BY \"age\") = 1"
        );
        assert_eq!(
            sql_fragment(&Command::IsDuplicated, "age", &Operand::None, &types).unwrap(),
            "COUNT(*) OVER (PARTITION BY \"age\") > 1"
        );
    }

    #[test]
    fn test_literal_type_mismatch() {
        let operand = values(vec![Literal::from("ten")]);
        assert!(matches!(
            sql_fragment(&Command::IsLessThan, "age", &operand, &types),
            Err(GuardError::TypeMismatch { .. })
        ));

        let operand = values(vec![Literal::Bool(true)]);
        assert!(sql_fragment(&Command::IsEqualTo, "flag", &operand, &types).is_ok());
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let operand = values(vec![Literal::Int(1), Literal::Int(2)]);
        assert!(matches!(
            sql_fragment(&Command::IsLessThan, "age", &operand, &types),
            Err(GuardError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn test_describe() {
        let zero = values(vec![Literal::Int(0)]);
        assert_eq!(
            describe(&Command::IsGreaterThanOrEqualTo, "age", &zero),
            "age is greater than or equal to 0"
        );
        assert_eq!(describe(&Command::IsNotNull, "age", &Operand::None), "age is not null");
    }
}
