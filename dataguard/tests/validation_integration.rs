//! End-to-end validation runs: configuration in, reports out.

use dataguard::prelude::*;
use dataguard::report::ErrorCollectorSchema;
use serde_json::json;

fn ages() -> LazySource {
    LazySource::from_json_columns(vec![(
        "age",
        vec![json!(-5), json!(30), json!(150), json!(null)],
    )])
    .unwrap()
}

fn validator(schema: serde_json::Value) -> Validator {
    let schema = SchemaConfig::from_value(schema).unwrap();
    Validator::from_config(&schema, &PredicateRegistry::new()).unwrap()
}

#[tokio::test]
async fn test_composed_check_yields_one_record() {
    let validator = validator(json!({
        "name": "patients",
        "columns": [{
            "id": "age",
            "checks": [
                {"command": "is_not_null"},
                {"check_case": "conjunction", "expressions": [
                    {"command": "is_greater_than_or_equal_to", "arg_values": [0]},
                    {"command": "is_less_than", "arg_values": [150]}
                ]}
            ]
        }]
    }));

    let collector = ErrorCollector::new();
    let report = validator.validate(&ages(), &collector).await;

    assert_eq!(report.name, "patients");
    assert_eq!(report.total_errors, 2);

    let nulls = &report.errors[0];
    assert_eq!(nulls.error_type, ErrorType::SeriesContainsNulls);
    assert_eq!(nulls.row_ids, vec![3]);
    assert_eq!(nulls.column_names, vec!["age"]);
    assert_eq!(nulls.level, Level::Error);

    let range = &report.errors[1];
    assert_eq!(range.error_type, ErrorType::DataframeCheck);
    assert_eq!(range.row_ids, vec![0, 2]);
    assert_eq!(
        range.title,
        "Is greater than or equal to and Is less than"
    );
    assert!(range.message.ends_with("; failure cases: -5, 150"));

    assert_eq!(collector.total_errors(), 2);
    assert_eq!(collector.exception_count(), 0);
}

#[tokio::test]
async fn test_separate_checks_yield_one_record_each() {
    let validator = validator(json!({
        "name": "patients",
        "columns": [{
            "id": "age",
            "checks": [
                {"command": "is_not_null"},
                {"command": "is_greater_than_or_equal_to", "arg_values": [0]},
                {"command": "is_less_than", "arg_values": [150]}
            ]
        }]
    }));

    let (report, exceptions) = validator.run(&ages()).await;

    assert!(exceptions.is_empty());
    let rows: Vec<Vec<u64>> = report.errors.iter().map(|e| e.row_ids.clone()).collect();
    assert_eq!(rows, vec![vec![3], vec![0], vec![2]]);
}

#[tokio::test]
async fn test_replicated_check_reports_per_column() {
    let validator = validator(json!({
        "name": "vitals",
        "checks": [
            {"command": "is_not_null", "subject": ["age", "weight"], "error_level": "warning"}
        ]
    }));
    let source = LazySource::from_json_columns(vec![
        ("age", vec![json!(1), json!(null), json!(3)]),
        ("weight", vec![json!(null), json!(2.5), json!(3.0)]),
    ])
    .unwrap();

    let (report, _) = validator.run(&source).await;

    assert_eq!(report.total_errors, 2);
    assert_eq!(report.errors[0].column_names, vec!["age"]);
    assert_eq!(report.errors[0].row_ids, vec![1]);
    assert_eq!(
        report.errors[0].message,
        "Column(s) \"age\" is not null; failure cases: null"
    );
    assert_eq!(report.errors[1].column_names, vec!["weight"]);
    assert_eq!(report.errors[1].row_ids, vec![0]);
    assert!(report.errors.iter().all(|e| e.level == Level::Warning));
}

#[tokio::test]
async fn test_condition_exempts_rows_where_guard_fails() {
    let validator = validator(json!({
        "name": "people",
        "checks": [{
            "name": "men are not pregnant",
            "check_case": "condition",
            "expressions": [
                {"command": "is_equal_to", "subject": ["sex"], "arg_values": ["M"]},
                {"command": "is_equal_to", "subject": ["pregnant"], "arg_values": [false]}
            ]
        }]
    }));
    let source = LazySource::from_json_columns(vec![
        ("sex", vec![json!("F"), json!("M"), json!("M"), json!("F")]),
        ("pregnant", vec![json!(true), json!(true), json!(false), json!(null)]),
    ])
    .unwrap();

    let (report, _) = validator.run(&source).await;

    assert_eq!(report.total_errors, 1);
    let record = &report.errors[0];
    assert_eq!(record.title, "men are not pregnant");
    assert_eq!(record.row_ids, vec![1]);
    assert_eq!(record.column_names, vec!["sex", "pregnant"]);
    assert!(record.message.ends_with("(sex=M, pregnant=true)"));
}

#[tokio::test]
async fn test_disjunction_fails_only_when_both_sides_fail() {
    let validator = validator(json!({
        "name": "ages",
        "columns": [{
            "id": "age",
            "checks": [{"check_case": "disjunction", "expressions": [
                {"command": "is_null"},
                {"command": "is_in", "arg_values": [30, 150]}
            ]}]
        }]
    }));

    let (report, _) = validator.run(&ages()).await;

    assert_eq!(report.total_errors, 1);
    assert_eq!(report.errors[0].row_ids, vec![0]);
    assert_eq!(report.errors[0].error_type, ErrorType::DataframeCheck);
}

#[tokio::test]
async fn test_column_operand_compares_row_by_row() {
    let validator = validator(json!({
        "name": "ranges",
        "columns": [{
            "id": "low",
            "checks": [{"command": "is_less_than_or_equal_to", "arg_columns": ["high"]}]
        }, {"id": "high"}]
    }));
    let source = LazySource::from_json_columns(vec![
        ("low", vec![json!(1), json!(5), json!(3)]),
        ("high", vec![json!(2), json!(4), json!(3)]),
    ])
    .unwrap();

    let (report, _) = validator.run(&source).await;
    assert_eq!(report.total_errors, 1);
    assert_eq!(report.errors[0].row_ids, vec![1]);
}

#[tokio::test]
async fn test_ids_identify_failing_rows() {
    let validator = validator(json!({
        "name": "patients",
        "ids": ["patient"],
        "columns": [
            {"id": "patient", "unique": true},
            {"id": "age", "checks": [{"command": "is_less_than", "arg_values": [100]}]}
        ]
    }));
    let source = LazySource::from_json_columns(vec![
        ("patient", vec![json!("a"), json!("b"), json!("b")]),
        ("age", vec![json!(20), json!(120), json!(30)]),
    ])
    .unwrap();

    let (report, _) = validator.run(&source).await;

    let types: Vec<ErrorType> = report.errors.iter().map(|e| e.error_type).collect();
    assert_eq!(
        types,
        vec![
            ErrorType::Duplicates,
            ErrorType::SeriesContainsDuplicates,
            ErrorType::DataframeCheck
        ]
    );
    assert_eq!(report.errors[1].row_ids, vec![1, 2]);
    assert_eq!(report.errors[2].row_ids, vec![1]);
    assert_eq!(report.errors[2].idx_columns, vec!["patient=b"]);
}

#[tokio::test]
async fn test_stop_on_critical() {
    let schema = SchemaConfig::from_value(json!({
        "name": "patients",
        "columns": [{
            "id": "age",
            "checks": [
                {"command": "is_greater_than_or_equal_to", "arg_values": [0], "error_level": "critical"},
                {"command": "is_not_null"}
            ]
        }]
    }))
    .unwrap();
    let validator = Validator::from_config(&schema, &PredicateRegistry::new())
        .unwrap()
        .with_config(ValidatorConfig::strict());

    let (report, _) = validator.run(&ages()).await;

    assert_eq!(report.total_errors, 1);
    assert!(report.has_critical());
}

#[tokio::test]
async fn test_collector_accumulates_runs() {
    let collector = ErrorCollector::new();
    let first = validator(json!({
        "name": "first",
        "columns": [{"id": "age", "nullable": false}]
    }));
    let second = validator(json!({
        "name": "second",
        "columns": [{"id": "age", "checks": [{"command": "is_in", "arg_values": [0, 30]}]}]
    }));

    first.validate(&ages(), &collector).await;
    second.validate(&ages(), &collector).await;

    let json = collector.to_json().unwrap();
    let parsed: ErrorCollectorSchema = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.error_reports.len(), 2);
    assert_eq!(parsed.error_reports[0].name, "first");
    assert_eq!(parsed.total_errors(), 2);
    assert_eq!(parsed.error_reports[1].errors[0].row_ids, vec![0, 2]);

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        value["error_reports"][0]["errors"][0]["type"],
        "SERIES_CONTAINS_NULLS"
    );
}

#[tokio::test]
async fn test_invalid_config_becomes_critical_report() {
    let schema = SchemaConfig::from_value(json!({
        "name": "broken",
        "columns": [{"id": "age", "checks": [{"command": "is_positive"}]}]
    }))
    .unwrap();

    let collector = ErrorCollector::new();
    let validator =
        Validator::from_config_collecting(&schema, &PredicateRegistry::new(), &collector);

    assert!(validator.is_none());
    let errors = collector.get_errors();
    assert_eq!(errors.error_reports[0].name, "Critical Error Report");
    assert_eq!(errors.error_reports[0].errors[0].error_type, ErrorType::CheckError);
    assert!(errors.error_reports[0].errors[0].traceback.is_some());
}

#[tokio::test]
async fn test_is_in_with_null_member_rejects_other_values() {
    let validator = validator(json!({
        "name": "codes",
        "columns": [{"id": "code", "checks": [{"command": "is_in", "arg_values": [1, null]}]}]
    }));
    let source = LazySource::from_json_columns(vec![(
        "code",
        vec![json!(1), json!(5), json!(null)],
    )])
    .unwrap();

    let (report, exceptions) = validator.run(&source).await;

    assert!(exceptions.is_empty());
    assert_eq!(report.total_errors, 1);
    assert_eq!(report.errors[0].row_ids, vec![1]);
    assert!(report.errors[0].message.ends_with("; failure cases: 5"));
}

#[tokio::test]
async fn test_declared_types_accept_castable_data() {
    let validator = validator(json!({
        "name": "visits",
        "columns": [
            {"id": "weight", "data_type": "decimal"},
            {"id": "d", "data_type": "date"},
            {"id": "at", "data_type": "datetime"}
        ]
    }));
    let source = LazySource::from_json_columns(vec![
        ("weight", vec![json!(70), json!(80)]),
        ("d", vec![json!("2024-01-01"), json!("2024-02-01")]),
        ("at", vec![json!("2024-01-01T08:30:00"), json!(null)]),
    ])
    .unwrap();

    let (report, exceptions) = validator.run(&source).await;

    assert!(exceptions.is_empty());
    assert_eq!(report.total_errors, 0);
}

#[tokio::test]
async fn test_uncastable_dates_are_wrong_datatype() {
    let validator = validator(json!({
        "name": "visits",
        "columns": [{"id": "d", "data_type": "date"}, {"id": "n", "data_type": "date"}]
    }));
    let source = LazySource::from_json_columns(vec![
        ("d", vec![json!("2024-01-01"), json!("not a date"), json!("2024-13-40")]),
        ("n", vec![json!(1), json!(2), json!(3)]),
    ])
    .unwrap();

    let (report, _) = validator.run(&source).await;

    assert_eq!(report.total_errors, 2);
    let dates = &report.errors[0];
    assert_eq!(dates.error_type, ErrorType::WrongDatatype);
    assert_eq!(dates.column_names, vec!["d"]);
    assert_eq!(dates.row_ids, vec![1, 2]);

    let numbers = &report.errors[1];
    assert_eq!(numbers.error_type, ErrorType::WrongDatatype);
    assert_eq!(numbers.column_names, vec!["n"]);
    assert!(numbers.row_ids.is_empty());
}
