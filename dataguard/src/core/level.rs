//! Severity levels attached to checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GuardError;

/// The severity a failing check is reported with.
///
/// Levels are ordered by severity: `Critical > Error > Warning`. The level is
/// carried unchanged from the check configuration into every record the check
/// produces; the engine never escalates or downgrades it.
///
/// # Examples
///
/// ```rust
/// use dataguard::core::Level;
///
/// assert!(Level::Critical > Level::Error);
/// assert_eq!(Level::default(), Level::Error);
/// assert_eq!("warning".parse::<Level>().unwrap(), Level::Warning);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Findings that should be reviewed but do not block consumers
    Warning = 0,
    /// Regular data quality violations
    #[default]
    Error = 1,
    /// Violations that make the data unusable
    Critical = 2,
}

impl Level {
    /// Returns the lowercase name of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
        }
    }

    /// Returns true if this level is at least as severe as `other`.
    pub fn is_at_least(&self, other: Level) -> bool {
        *self >= other
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warning" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "critical" => Ok(Level::Critical),
            other => Err(GuardError::Configuration(format!(
                "unknown error level '{other}', expected one of warning, error, critical"
            ))),
        }
    }
}
