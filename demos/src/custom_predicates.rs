//! Registering custom predicates and composing them with catalog commands.
//!
//! Run with:
//! ```bash
//! cargo run --example custom_predicates
//! ```

use datafusion::prelude::*;
use dataguard::core::{CheckData, PredicateArgs};
use dataguard::prelude::*;
use dataguard::sources::ROW_INDEX_COLUMN;
use serde_json::json;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut registry = PredicateRegistry::new();
    registry.register(FnPredicate::new(
        "is_multiple_of",
        |data: &CheckData, args: &PredicateArgs| {
            let key = data.require_key()?;
            let divisor = match args.arg_values.as_deref() {
                Some([Literal::Int(d)]) if *d != 0 => *d,
                _ => {
                    return Err(GuardError::custom_predicate(
                        "is_multiple_of",
                        "expected one non-zero integer",
                    ))
                }
            };
            Ok(data.scan().select(vec![
                col(ROW_INDEX_COLUMN),
                (ident(key) % lit(divisor)).eq(lit(0)).alias("valid"),
            ])?)
        },
    ))?;

    let config = SchemaConfig::from_value(json!({
        "name": "orders",
        "columns": [
            {"id": "order_id"},
            {"id": "quantity", "checks": [
                {"name": "packs of six", "check_case": "disjunction", "expressions": [
                    {"command": "is_multiple_of", "arg_values": [6]},
                    {"command": "is_less_than", "arg_values": [6]}
                ]}
            ]}
        ],
        "ids": ["order_id"]
    }))?;

    let source = LazySource::from_json_columns(vec![
        ("order_id", vec![json!("A-1"), json!("A-2"), json!("A-3"), json!("A-4")]),
        ("quantity", vec![json!(12), json!(4), json!(9), json!(null)]),
    ])?;

    let validator = Validator::from_config(&config, &registry)?;
    let (report, exceptions) = validator.run(&source).await;

    for error in &report.errors {
        println!("{}: {}", error.title, error.message);
        println!("    failing orders: {}", error.idx_columns.join(", "));
    }
    for exception in &exceptions {
        println!("exception in {:?}: {}", exception.check, exception.message);
    }
    Ok(())
}
