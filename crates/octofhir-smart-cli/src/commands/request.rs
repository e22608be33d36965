use anyhow::{Context, Result};
use octofhir_smart_launch::RequestDescriptor;
use serde_json::{Value, json};

use crate::cli::OutputFormat;
use crate::output::print_value;

/// Parses `raw` as a JSON request object when it looks like one, otherwise as a path.
pub fn normalize(raw: &str, format: OutputFormat) -> Result<()> {
    let trimmed = raw.trim();
    let value = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str::<Value>(trimmed).context("Invalid JSON request")?
    } else {
        Value::String(trimmed.to_string())
    };

    let request = RequestDescriptor::try_from(value)?.into_request();
    let report = json!({
        "method": request.method.as_str(),
        "url": request.url,
        "headers": request.headers,
        "body": request.body,
        "flat": true,
    });
    print_value(&report, format);
    Ok(())
}
