//! User supplied predicates.
//!
//! A custom predicate receives a [`CheckData`] handle restricted to a lazy view of
//! the whole source and the column the check is bound to, and returns a lazy
//! frame carrying one boolean validity column. Custom predicates are plain
//! [`Command`](super::Command) leaves: they compose with conjunction, disjunction
//! and condition exactly like catalog commands.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dataguard::core::{FnPredicate, PredicateRegistry};
//! use dataguard::sources::ROW_INDEX_COLUMN;
//! use datafusion::prelude::*;
//!
//! let mut registry = PredicateRegistry::new();
//! registry
//!     .register(FnPredicate::new("is_even", |data, _args| {
//!         let key = data.require_key()?;
//!         let frame = data.scan().select(vec![
//!             col(ROW_INDEX_COLUMN),
//!             (ident(key) % lit(2)).eq(lit(0)).alias("valid"),
//!         ])?;
//!         Ok(frame)
//!     }))
//!     .unwrap();
//! ```

use arrow::array::{Array, AsArray, BooleanArray};
use arrow::compute::concat;
use arrow::datatypes::DataType;
use async_trait::async_trait;
use datafusion::prelude::{col, DataFrame};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use super::command::Command;
use super::operand::Literal;
use crate::error::{GuardError, Result};
use crate::sources::{LazySource, ROW_INDEX_COLUMN};

/// The data a custom predicate may look at.
#[derive(Clone)]
pub struct CheckData {
    frame: DataFrame,
    key: Option<String>,
    source: LazySource,
}

impl CheckData {
    /// Creates the handle for one check against `source`.
    pub async fn new(source: &LazySource, key: Option<String>) -> Result<Self> {
        Ok(Self {
            frame: source.scan().await?,
            key,
            source: source.clone(),
        })
    }

    /// A deferred scan over the full source, row index column included.
    pub fn scan(&self) -> DataFrame {
        self.frame.clone()
    }

    /// The column the check is bound to, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The bound column, or an error for frame-level checks without one.
    pub fn require_key(&self) -> Result<&str> {
        self.key().ok_or_else(|| {
            GuardError::InvalidExpression("check is not bound to a column".to_string())
        })
    }

    /// Number of rows in the source; a returned mask must have exactly this length.
    pub fn row_count(&self) -> usize {
        self.source.row_count()
    }

    pub(crate) fn source(&self) -> &LazySource {
        &self.source
    }

    pub(crate) fn with_key(&self, key: Option<String>) -> Self {
        Self {
            frame: self.frame.clone(),
            key,
            source: self.source.clone(),
        }
    }
}

impl Debug for CheckData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckData")
            .field("key", &self.key)
            .field("source", &self.source)
            .finish()
    }
}

/// Arguments of the leaf a custom predicate is applied from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateArgs {
    pub subject: Vec<String>,
    pub arg_values: Option<Vec<Literal>>,
    pub arg_columns: Option<Vec<String>>,
}

/// A predicate implemented outside the catalog.
///
/// The returned frame must hold a boolean column (the first boolean column other
/// than the row index is used) with one entry per source row. When the frame
/// keeps the row index column, rows are reordered by it before the mask is read.
/// Null entries count as valid.
#[async_trait]
pub trait CustomPredicate: Debug + Send + Sync {
    /// The command name this predicate is referenced by in configurations.
    fn name(&self) -> &str;

    /// Evaluates the predicate, producing a lazy frame with the validity column.
    async fn evaluate(&self, data: &CheckData, args: &PredicateArgs) -> Result<DataFrame>;
}

/// Adapts a synchronous closure into a [`CustomPredicate`].
pub struct FnPredicate<F> {
    name: String,
    func: F,
}

impl<F> FnPredicate<F>
where
    F: Fn(&CheckData, &PredicateArgs) -> Result<DataFrame> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> CustomPredicate for FnPredicate<F>
where
    F: Fn(&CheckData, &PredicateArgs) -> Result<DataFrame> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, data: &CheckData, args: &PredicateArgs) -> Result<DataFrame> {
        (self.func)(data, args)
    }
}

/// Named custom predicates available to configurations.
#[derive(Debug, Clone, Default)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Arc<dyn CustomPredicate>>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a predicate under its own name.
    ///
    /// Catalog command names cannot be shadowed, and each name registers once.
    pub fn register(&mut self, predicate: impl CustomPredicate + 'static) -> Result<&mut Self> {
        self.register_arc(Arc::new(predicate))
    }

    pub fn register_arc(&mut self, predicate: Arc<dyn CustomPredicate>) -> Result<&mut Self> {
        let name = predicate.name().to_string();
        if Command::from_catalog(&name).is_some() {
            return Err(GuardError::Configuration(format!(
                "custom predicate '{name}' shadows a built-in command"
            )));
        }
        if self.predicates.contains_key(&name) {
            return Err(GuardError::Configuration(format!(
                "custom predicate '{name}' is already registered"
            )));
        }
        self.predicates.insert(name, predicate);
        Ok(self)
    }

    /// Builder-style registration.
    pub fn with(mut self, predicate: impl CustomPredicate + 'static) -> Result<Self> {
        self.register(predicate)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomPredicate>> {
        self.predicates.get(name).cloned()
    }

    /// Resolves a command name against the catalog first, then the registry.
    pub fn resolve(&self, name: &str) -> Result<Command> {
        Command::from_catalog(name)
            .or_else(|| self.get(name).map(Command::Custom))
            .ok_or_else(|| GuardError::UnknownCommand(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.predicates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Executes a predicate's frame and extracts its row-aligned validity mask.
pub(crate) async fn collect_mask(
    name: &str,
    frame: DataFrame,
    expected_rows: usize,
) -> Result<BooleanArray> {
    let frame = if frame
        .schema()
        .has_column_with_unqualified_name(ROW_INDEX_COLUMN)
    {
        frame.sort(vec![col(ROW_INDEX_COLUMN).sort(true, false)])?
    } else {
        frame
    };

    let mask_index = frame
        .schema()
        .fields()
        .iter()
        .position(|f| f.data_type() == &DataType::Boolean && f.name() != ROW_INDEX_COLUMN)
        .ok_or_else(|| {
            GuardError::custom_predicate(name, "returned frame has no boolean validity column")
        })?;

    let batches = frame.collect().await?;
    let parts: Vec<&dyn Array> = batches
        .iter()
        .map(|b| b.column(mask_index).as_ref())
        .collect();

    let mask = if parts.is_empty() {
        BooleanArray::from(Vec::<bool>::new())
    } else {
        concat(&parts)?.as_boolean().clone()
    };

    if mask.len() != expected_rows {
        return Err(GuardError::MaskLength {
            expected: expected_rows,
            found: mask.len(),
        });
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::age_source;
    use datafusion::prelude::{ident, lit};

    fn positive() -> FnPredicate<impl Fn(&CheckData, &PredicateArgs) -> Result<DataFrame>> {
        FnPredicate::new("is_positive", |data: &CheckData, _args: &PredicateArgs| {
            let key = data.require_key()?;
            Ok(data.scan().select(vec![
                col(ROW_INDEX_COLUMN),
                ident(key).gt(lit(0)).alias("valid"),
            ])?)
        })
    }

    #[test]
    fn test_registry_resolution() {
        let registry = PredicateRegistry::new().with(positive()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("is_positive").unwrap().is_custom());
        assert_eq!(registry.resolve("is_null").unwrap(), Command::IsNull);
        assert!(matches!(
            registry.resolve("is_odd"),
            Err(GuardError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_registry_rejects_shadowing() {
        let shadow = FnPredicate::new("is_null", |data: &CheckData, _: &PredicateArgs| {
            Ok(data.scan())
        });
        assert!(PredicateRegistry::new().with(shadow).is_err());

        let mut registry = PredicateRegistry::new();
        registry.register(positive()).unwrap();
        assert!(registry.register(positive()).is_err());
    }

    #[tokio::test]
    async fn test_collect_mask() {
        let source = age_source();
        let data = CheckData::new(&source, Some("age".to_string())).await.unwrap();
        let frame = positive()
            .evaluate(&data, &PredicateArgs::default())
            .await
            .unwrap();
        let mask = collect_mask("is_positive", frame, source.row_count())
            .await
            .unwrap();

        assert_eq!(mask.len(), 4);
        assert!(!mask.value(0));
        assert!(mask.value(1));
        assert!(mask.value(2));
        assert!(mask.is_null(3));
    }

    #[tokio::test]
    async fn test_collect_mask_wrong_length() {
        let source = age_source();
        let data = CheckData::new(&source, Some("age".to_string())).await.unwrap();
        let frame = data
            .scan()
            .limit(0, Some(2))
            .unwrap()
            .select(vec![ident("age").is_not_null().alias("valid")])
            .unwrap();

        let err = collect_mask("short", frame, 4).await.unwrap_err();
        assert!(matches!(err, GuardError::MaskLength { expected: 4, found: 2 }));
    }

    #[tokio::test]
    async fn test_collect_mask_without_boolean_column() {
        let source = age_source();
        let data = CheckData::new(&source, None).await.unwrap();
        let err = collect_mask("bad", data.scan(), 4).await.unwrap_err();
        assert!(matches!(err, GuardError::CustomPredicate { .. }));
        assert!(data.require_key().is_err());
    }
}
