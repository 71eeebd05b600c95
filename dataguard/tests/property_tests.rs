//! Property-based tests of evaluation and aggregation.
//!
//! - masks always have one entry per source row
//! - a composed check never produces more records than its leaves run as
//!   separate checks
//! - `is_equal_to_or_both_missing` of a column with itself holds on every row
//! - failing rows of a column-level check are exactly the rows a direct
//!   computation rejects

use dataguard::core::{CheckData, ExpressionNode, PredicateApplication};
use dataguard::evaluator::Evaluator;
use dataguard::prelude::*;
use proptest::prelude::*;
use serde_json::{json, Value};

fn nullable_ints() -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(prop::option::of(-200i64..200), 1..40)
}

fn source(values: &[Option<i64>]) -> LazySource {
    let values: Vec<Value> = values.iter().map(|v| json!(v)).collect();
    LazySource::from_json_columns(vec![("x", values)]).unwrap()
}

fn compare(command: Command, bound: i64) -> ExpressionNode {
    ExpressionNode::simple(
        PredicateApplication::builder(command)
            .value(bound)
            .build()
            .unwrap(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_mask_covers_every_row(values in nullable_ints(), bound in -200i64..200) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let source = source(&values);
            let data = CheckData::new(&source, Some("x".to_string())).await.unwrap();
            let node = ExpressionNode::conjunction(
                compare(Command::IsGreaterThan, bound),
                ExpressionNode::simple(
                    PredicateApplication::builder(Command::IsNotNull).build().unwrap(),
                ),
            );
            let result = Evaluator::new().evaluate(&node, &data).await.unwrap();

            prop_assert_eq!(result.mask.len(), values.len());

            let expected: Vec<u64> = values
                .iter()
                .enumerate()
                .filter(|(_, v)| v.map_or(true, |v| v <= bound))
                .map(|(i, _)| i as u64)
                .collect();
            prop_assert_eq!(&result.failing_rows, &expected);
            Ok(())
        })?;
    }

    #[test]
    fn test_composition_never_adds_records(
        values in nullable_ints(),
        low in -200i64..0,
        high in 0i64..200,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let source = source(&values);
            let composed = Validator::builder("composed")
                .check(
                    Check::builder(ExpressionNode::conjunction(
                        compare(Command::IsGreaterThanOrEqualTo, low),
                        compare(Command::IsLessThan, high),
                    ))
                    .target("x")
                    .build()
                    .unwrap(),
                )
                .build();
            let separate = Validator::builder("separate")
                .check(
                    Check::builder(compare(Command::IsGreaterThanOrEqualTo, low))
                        .target("x")
                        .build()
                        .unwrap(),
                )
                .check(
                    Check::builder(compare(Command::IsLessThan, high))
                        .target("x")
                        .build()
                        .unwrap(),
                )
                .build();

            let (composed, _) = composed.run(&source).await;
            let (separate, _) = separate.run(&source).await;

            prop_assert!(composed.total_errors <= 1);
            prop_assert!(composed.total_errors <= separate.total_errors);
            prop_assert_eq!(composed.total_errors == 0, separate.total_errors == 0);
            Ok(())
        })?;
    }

    #[test]
    fn test_missing_equal_to_itself(values in nullable_ints()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let source = source(&values);
            let data = CheckData::new(&source, Some("x".to_string())).await.unwrap();
            let node = ExpressionNode::simple(
                PredicateApplication::builder(Command::IsEqualToOrBothMissing)
                    .column("x")
                    .build()
                    .unwrap(),
            );
            let result = Evaluator::new().evaluate(&node, &data).await.unwrap();

            prop_assert!(result.is_valid());
            Ok(())
        })?;
    }
}
