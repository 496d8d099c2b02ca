use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(data) = data {
                response["data"] = data;
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
            if let Some(data) = data {
                print_fields(&data);
            }
        }
    }
    Ok(())
}

/// Output a per-item warning (eg. seeding an account that already exists)
pub fn output_skipped(output_format: &OutputFormat, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "skipped": message }))?);
        }
        OutputFormat::Text => {
            println!("- {}", message);
        }
    }
    Ok(())
}

fn print_fields(data: &Value) {
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                match value {
                    Value::Object(_) | Value::Array(_) => println!("  {}: {}", key, value),
                    Value::String(s) => println!("  {}: {}", key, s),
                    other => println!("  {}: {}", key, other),
                }
            }
        }
        other => println!("  {}", other),
    }
}
