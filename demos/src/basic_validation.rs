//! Basic validation of a CSV file against a JSON configuration.
//!
//! Shows how composed checks produce one record each, how frame-level checks
//! are replicated per column and how the collector serializes everything.
//!
//! Run with:
//! ```bash
//! cargo run --example basic_validation
//! ```

use datafusion::prelude::*;
use dataguard::logging::setup::{init_logging, LoggingConfig};
use dataguard::prelude::*;

const CONFIG: &str = r#"{
    "name": "patients",
    "ids": ["patient_id"],
    "columns": [
        {"id": "patient_id", "data_type": "integer", "nullable": false, "unique": true},
        {"id": "sex", "data_type": "varchar", "checks": [
            {"command": "is_in", "arg_values": ["F", "M"]}
        ]},
        {"id": "age", "data_type": "integer", "nullable": false, "checks": [
            {"name": "plausible age", "check_case": "conjunction", "expressions": [
                {"command": "is_greater_than_or_equal_to", "arg_values": [0]},
                {"command": "is_less_than", "arg_values": [120]}
            ]}
        ]},
        {"id": "weight", "data_type": "decimal"},
        {"id": "height", "data_type": "decimal"}
    ],
    "checks": [
        {"error_level": "warning", "command": "is_greater_than", "subject": ["weight", "height"], "arg_values": [0]},
        {"name": "men are never pregnant", "error_level": "critical", "check_case": "condition", "expressions": [
            {"command": "is_equal_to", "subject": ["sex"], "arg_values": ["M"]},
            {"command": "is_equal_to", "subject": ["pregnant"], "arg_values": [false]}
        ]}
    ]
}"#;

const CSV: &str = "patient_id,sex,age,weight,height,pregnant
1,F,28,61.5,1.68,true
2,M,35,80.0,1.81,false
3,M,-4,77.2,1.75,true
4,F,131,0.0,1.60,false
5,X,42,70.1,,false
5,F,,58.3,1.59,";

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::default().with_dataguard_level(tracing::Level::INFO))?;

    let file_path = std::env::temp_dir().join("patients.csv");
    std::fs::write(&file_path, CSV)?;

    let ctx = SessionContext::new();
    let frame = ctx
        .read_csv(
            file_path.to_string_lossy().as_ref(),
            CsvReadOptions::default(),
        )
        .await?;
    let schema = frame.schema().inner().clone();
    let batches = frame.collect().await?;
    let source = LazySource::from_batches(schema, &batches)?;

    println!("Validating {} rows...\n", source.row_count());

    let config = SchemaConfig::from_json(CONFIG)?;
    let collector = ErrorCollector::new();
    let Some(validator) = Validator::from_config_collecting(&config, &PredicateRegistry::new(), &collector)
    else {
        println!("{}", collector.to_json_pretty()?);
        return Ok(());
    };

    let report = validator.validate(&source, &collector).await;
    for error in &report.errors {
        println!(
            "[{}] {} ({}): {}",
            error.level, error.error_type, error.title, error.message
        );
        println!("    rows: {:?}", error.row_ids);
        if !error.idx_columns.is_empty() {
            println!("    ids:  {}", error.idx_columns.join("; "));
        }
    }
    println!("\n{} error(s) in report {}", report.total_errors, report.id);

    println!("\nCollected JSON:\n{}", collector.to_json_pretty()?);
    Ok(())
}
