use crate::cli::OutputFormat;
use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => print_error(&format!("Cannot render output: {e}")),
        },
        OutputFormat::Table => print_as_table(value),
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn print_as_table(value: &Value) {
    let Some(obj) = value.as_object() else {
        println!("{}", scalar(value));
        return;
    };
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in obj {
        builder.push_record([key.clone(), scalar(val)]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_rendering() {
        assert_eq!(scalar(&json!(null)), "-");
        assert_eq!(scalar(&json!("Patient/1")), "Patient/1");
        assert_eq!(scalar(&json!(true)), "true");
        assert_eq!(scalar(&json!({ "a": 1 })), "{\"a\":1}");
    }
}
