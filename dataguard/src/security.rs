//! SQL hardening for generated validation queries.
//!
//! Every column and table name that ends up in a query passes through
//! [`SqlSecurity::escape_identifier`]; every string literal through
//! [`SqlSecurity::escape_string_literal`].

use crate::error::{GuardError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum accepted identifier length.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// SQL identifier validation and escaping utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates and escapes a SQL identifier (table name, column name, etc.).
    ///
    /// The identifier is always wrapped in double quotes with internal quotes
    /// doubled, so arbitrary column names (spaces, mixed case, punctuation) are
    /// referenced literally and can never break out of the identifier.
    ///
    /// # Examples
    /// ```rust
    /// use dataguard::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("age").unwrap(), "\"age\"");
    /// assert_eq!(
    ///     SqlSecurity::escape_identifier("my \"col\"").unwrap(),
    ///     "\"my \"\"col\"\"\""
    /// );
    /// assert!(SqlSecurity::escape_identifier("").is_err());
    /// assert!(SqlSecurity::escape_identifier(&"x".repeat(200)).is_err());
    /// ```
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;

        let escaped = identifier.replace('"', "\"\"");
        Ok(format!("\"{escaped}\""))
    }

    /// Validates a SQL identifier without escaping it.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.is_empty() || identifier.trim().is_empty() {
            return Err(GuardError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > MAX_IDENTIFIER_LENGTH {
            return Err(GuardError::SecurityError(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"
            )));
        }

        if identifier.chars().any(|c| c.is_control()) {
            return Err(GuardError::SecurityError(
                "SQL identifier cannot contain control characters".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates the name a source is registered under.
    ///
    /// Table names are generated into `FROM` clauses unquoted by DataFusion's
    /// table registration, so they are restricted to plain lowercase identifiers.
    pub fn validate_table_name(name: &str) -> Result<()> {
        static TABLE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new(r"^[a-z_][a-z0-9_]*$").expect("Hard-coded regex pattern should be valid")
        });

        Self::validate_identifier(name)?;
        if !TABLE_NAME_REGEX.is_match(name) {
            return Err(GuardError::SecurityError(format!(
                "Invalid table name '{name}'. Table names must start with a lowercase letter or underscore and contain only lowercase letters, digits and underscores"
            )));
        }
        Ok(())
    }

    /// Escapes a string for use as a single-quoted SQL literal.
    pub fn escape_string_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}
