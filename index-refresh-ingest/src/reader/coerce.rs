//! Value coercion for tabular cells and document id extraction.

use serde_json::{Map, Number, Value};

/// Coerce one tabular cell.
///
/// Empty cells become null, canonical boolean tokens become booleans,
/// integer and finite decimal tokens become numbers. Anything else stays text.
pub fn coerce_cell(raw: &str) -> Value {
    let token = raw.trim();
    if token.is_empty() {
        return Value::Null;
    }

    match token {
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(i) = token.parse::<i64>() {
        return Value::Number(i.into());
    }
    if looks_numeric(token) {
        if let Some(n) = token.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }

    Value::String(token.to_string())
}

/// Digits with an optional sign, decimal point and exponent.
///
/// Keeps tokens like `inf` or `NaN` as text, which `f64::from_str` would accept.
fn looks_numeric(token: &str) -> bool {
    let body = token.strip_prefix(['+', '-']).unwrap_or(token);
    body.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
}

/// Resolve the document id from the identifier field.
///
/// A missing, null or blank field means the index assigns the id. Strings
/// and numbers are used as-is. Any other type is rejected, since the bulk
/// API would refuse it for every record of the batch.
pub fn extract_id(fields: &Map<String, Value>, id_field: &str) -> Result<Option<String>, String> {
    match fields.get(id_field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s.to_string()))
            }
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(format!(
            "identifier field '{}' must be a string or number, found {}",
            id_field,
            type_name(other)
        )),
    }
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
