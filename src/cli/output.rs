//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, TesseraArgs};
use crate::conformance::{FixedReport, RunReport};
use crate::error::Result;

/// Result of the `verify` command.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub fixed: Vec<FixedReport>,
    pub runs: Vec<RunReport>,
    pub duration_ms: u64,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &TesseraArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &TesseraArgs) -> Result<()> {
    let value = serde_json::to_value(result)?;

    if std::any::type_name::<T>().contains("VerifyOutcome") {
        output_verify_outcome_human(&value)?;
    } else {
        output_generic_human(&value)?;
    }

    if args.verbosity() > 0 {
        println!();
        println!("{message}");
    }
    Ok(())
}

/// Output a verify outcome in human format.
fn output_verify_outcome_human(value: &serde_json::Value) -> Result<()> {
    let Some(obj) = value.as_object() else {
        return output_generic_human(value);
    };

    if let Some(fixed) = obj.get("fixed").and_then(|f| f.as_array()) {
        println!("Fixed postings:");
        println!("═══════════════");
        for report in fixed {
            println!(
                "  {:<8} {} terms, {} docs enumerations",
                field_str(report, "codec"),
                field_u64(report, "terms"),
                field_u64(report, "docs")
            );
        }
        println!();
    }

    if let Some(runs) = obj.get("runs").and_then(|r| r.as_array()) {
        println!("Randomized runs:");
        println!("════════════════");
        for run in runs {
            let codec = run.get("codec").map(format_codec).unwrap_or_default();
            println!("  {codec}");
            println!("    seed:      {}", field_u64(run, "seed"));
            if let Some(files) = run.get("files") {
                println!("    files:     {}", format_value(files));
            }
            println!(
                "    model:     {} fields, {} terms, {} postings",
                field_u64(run, "fields"),
                field_u64(run, "terms"),
                field_u64(run, "postings")
            );
            let threads = run.get("threads").and_then(|t| t.as_array()).map_or(0, Vec::len);
            println!("    threads:   {threads}");
            if let Some(total) = run.get("total").and_then(|t| t.as_object()) {
                for (key, val) in total {
                    println!("    {:<24} {}", format!("{key}:"), format_value(val));
                }
            }
            println!("    time:      {}ms", field_u64(run, "elapsed_ms"));
        }
        println!();
    }

    if let Some(duration) = obj.get("duration_ms").and_then(|d| d.as_u64()) {
        println!("Total time: {duration}ms");
    }
    Ok(())
}

/// Output generic data in human format.
fn output_generic_human(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                let formatted_val = format_value(val);
                println!("{key}: {formatted_val}");
            }
        }
        _ => {
            let formatted_value = format_value(value);
            println!("{formatted_value}");
        }
    }
    Ok(())
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &TesseraArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

fn field_str<'a>(value: &'a serde_json::Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("unknown")
}

fn field_u64(value: &serde_json::Value, key: &str) -> u64 {
    value.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

/// Render an internally tagged codec configuration as `Type(key=value, ...)`.
fn format_codec(value: &serde_json::Value) -> String {
    let Some(obj) = value.as_object() else {
        return format_value(value);
    };
    let name = obj.get("type").and_then(|t| t.as_str()).unwrap_or("unknown");
    let params = obj
        .iter()
        .filter(|(key, _)| key.as_str() != "type")
        .map(|(key, val)| format!("{key}={}", format_value(val)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{name}({params})")
}

/// Format a JSON value for display.
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        serde_json::Value::Object(_) => "[object]".to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!("test")), "test");
        assert_eq!(format_value(&json!(42)), "42");
        assert_eq!(format_value(&json!(false)), "false");
        assert_eq!(format_value(&json!([1, 2])), "[1, 2]");
        assert_eq!(format_value(&serde_json::Value::Null), "null");
    }

    #[test]
    fn test_format_codec() {
        let codec = json!({ "type": "Block", "skip_interval": 4, "term_index_interval": 16 });
        assert_eq!(
            format_codec(&codec),
            "Block(skip_interval=4, term_index_interval=16)"
        );
        assert_eq!(format_codec(&json!({ "type": "Simple" })), "Simple()");
    }

    #[test]
    fn test_field_accessors() {
        let value = json!({ "codec": "simple", "terms": 100 });
        assert_eq!(field_str(&value, "codec"), "simple");
        assert_eq!(field_str(&value, "missing"), "unknown");
        assert_eq!(field_u64(&value, "terms"), 100);
        assert_eq!(field_u64(&value, "codec"), 0);
    }
}
