use serde_json::{Map, Value};

use super::ToolError;

/// Rejects any argument the tool does not declare.
pub fn expect_only(args: &Map<String, Value>, allowed: &[&str]) -> Result<(), ToolError> {
    let mut unexpected = args
        .keys()
        .filter(|key| !allowed.contains(&key.as_str()))
        .cloned()
        .collect::<Vec<String>>();
    if unexpected.is_empty() {
        return Ok(());
    }
    unexpected.sort();
    Err(ToolError::InvalidArguments(format!(
        "unexpected argument(s): {} (expected: {})",
        unexpected.join(", "),
        allowed.join(", ")
    )))
}

pub fn required_str(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    match args.get(key) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        Some(Value::String(_)) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must not be empty"
        ))),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a string, got {}",
            type_name(other)
        ))),
        None => Err(ToolError::InvalidArguments(format!("'{key}' is required"))),
    }
}

/// Accepts a JSON number or a numeric string such as `"250"`.
pub fn required_number(args: &Map<String, Value>, key: &str) -> Result<f64, ToolError> {
    let parsed = match args.get(key) {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(_) => None,
        None => return Err(ToolError::InvalidArguments(format!("'{key}' is required"))),
    };

    parsed
        .filter(|value| value.is_finite())
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a number")))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
