//! Custom predicates registered by name and referenced from configurations.

use arrow::array::AsArray;
use arrow::datatypes::Float64Type;
use async_trait::async_trait;
use datafusion::functions_aggregate::expr_fn::avg;
use datafusion::prelude::{col, ident, lit, DataFrame};
use dataguard::core::{CheckData, PredicateArgs};
use dataguard::prelude::*;
use dataguard::sources::ROW_INDEX_COLUMN;
use serde_json::json;

fn is_even() -> impl CustomPredicate {
    FnPredicate::new("is_even", |data: &CheckData, _args: &PredicateArgs| {
        let key = data.require_key()?;
        Ok(data.scan().select(vec![
            col(ROW_INDEX_COLUMN),
            (ident(key) % lit(2)).eq(lit(0)).alias("valid"),
        ])?)
    })
}

/// Rows may not exceed `factor` times the column mean.
#[derive(Debug)]
struct WithinMeanFactor;

#[async_trait]
impl CustomPredicate for WithinMeanFactor {
    fn name(&self) -> &str {
        "is_within_mean_factor"
    }

    async fn evaluate(&self, data: &CheckData, args: &PredicateArgs) -> Result<DataFrame> {
        let key = data.require_key()?;
        let factor = match args.arg_values.as_deref() {
            Some([Literal::Int(v)]) => *v as f64,
            Some([Literal::Float(v)]) => *v,
            _ => {
                return Err(GuardError::custom_predicate(
                    self.name(),
                    "expected one numeric arg_value",
                ))
            }
        };

        let batches = data
            .scan()
            .aggregate(vec![], vec![avg(ident(key)).alias("mean")])?
            .collect()
            .await?;
        let mean = batches[0].column(0).as_primitive::<Float64Type>().value(0);

        Ok(data.scan().select(vec![
            col(ROW_INDEX_COLUMN),
            ident(key).lt_eq(lit(mean * factor)).alias("valid"),
        ])?)
    }
}

fn registry() -> PredicateRegistry {
    PredicateRegistry::new()
        .with(is_even())
        .unwrap()
        .with(WithinMeanFactor)
        .unwrap()
        .with(FnPredicate::new(
            "always_fails",
            |_: &CheckData, _: &PredicateArgs| -> Result<DataFrame> {
                Err(GuardError::custom_predicate("always_fails", "boom"))
            },
        ))
        .unwrap()
}

fn numbers() -> LazySource {
    LazySource::from_json_columns(vec![(
        "n",
        vec![json!(2), json!(3), json!(150), json!(null)],
    )])
    .unwrap()
}

#[tokio::test]
async fn test_custom_leaf_composes_with_catalog_leaf() {
    let schema = SchemaConfig::from_value(json!({
        "name": "numbers",
        "columns": [{"id": "n", "checks": [
            {"check_case": "conjunction", "expressions": [
                {"command": "is_even"},
                {"command": "is_less_than", "arg_values": [100]}
            ]}
        ]}]
    }))
    .unwrap();
    let validator = Validator::from_config(&schema, &registry()).unwrap();

    let (report, exceptions) = validator.run(&numbers()).await;

    assert!(exceptions.is_empty());
    assert_eq!(report.total_errors, 1);
    assert_eq!(report.errors[0].row_ids, vec![1, 2]);
    assert_eq!(report.errors[0].title, "Is even and Is less than");
    assert!(report.errors[0].message.ends_with("failure cases: 3, 150"));
}

#[tokio::test]
async fn test_async_predicate_with_arguments() {
    let schema = SchemaConfig::from_value(json!({
        "name": "numbers",
        "checks": [
            {"command": "is_within_mean_factor", "subject": ["n"], "arg_values": [2]}
        ]
    }))
    .unwrap();
    let validator = Validator::from_config(&schema, &registry()).unwrap();

    let (report, exceptions) = validator.run(&numbers()).await;

    assert!(exceptions.is_empty());
    // mean of 2, 3, 150 is 51.67
    assert_eq!(report.total_errors, 1);
    assert_eq!(report.errors[0].row_ids, vec![2]);
    assert_eq!(report.errors[0].column_names, vec!["n"]);
}

#[tokio::test]
async fn test_failing_predicate_is_isolated() {
    let schema = SchemaConfig::from_value(json!({
        "name": "numbers",
        "columns": [{"id": "n", "checks": [
            {"command": "always_fails"},
            {"command": "is_not_null"}
        ]}]
    }))
    .unwrap();
    let validator = Validator::from_config(&schema, &registry()).unwrap();

    let collector = ErrorCollector::new();
    let report = validator.validate(&numbers(), &collector).await;

    assert_eq!(report.total_errors, 1);
    assert_eq!(report.errors[0].error_type, ErrorType::SeriesContainsNulls);

    let exceptions = collector.get_errors().exceptions;
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].error_type, "CustomPredicate");
    assert_eq!(exceptions[0].level, Level::Critical);
    assert_eq!(exceptions[0].check.as_deref(), Some("Always fails"));
    assert!(exceptions[0].message.contains("boom"));
}

#[tokio::test]
async fn test_mask_of_wrong_length_is_an_exception() {
    let registry = PredicateRegistry::new()
        .with(FnPredicate::new(
            "first_row_only",
            |data: &CheckData, _: &PredicateArgs| {
                let key = data.require_key()?;
                Ok(data
                    .scan()
                    .limit(0, Some(1))?
                    .select(vec![ident(key).is_not_null().alias("valid")])?)
            },
        ))
        .unwrap();
    let schema = SchemaConfig::from_value(json!({
        "name": "numbers",
        "columns": [{"id": "n", "checks": [{"command": "first_row_only"}]}]
    }))
    .unwrap();
    let validator = Validator::from_config(&schema, &registry).unwrap();

    let (report, exceptions) = validator.run(&numbers()).await;

    assert!(report.is_empty());
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].error_type, "MaskLength");
}

#[test]
fn test_registry_rejects_catalog_names() {
    let shadow = FnPredicate::new("is_unique", |data: &CheckData, _: &PredicateArgs| {
        Ok(data.scan())
    });
    assert!(matches!(
        PredicateRegistry::new().with(shadow),
        Err(GuardError::Configuration(_))
    ));
}
