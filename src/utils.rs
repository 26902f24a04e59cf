// Serde helpers shared by the wire types

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accept an identifier sent either as a JSON string or a number
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Human-readable message of an error body, using the conventional fields
pub fn error_message(body: &Value) -> Option<String> {
    for field in ["detail", "message", "error"] {
        if let Some(message) = body.get(field).and_then(|v| v.as_str()) {
            return Some(message.to_string());
        }
    }

    if let Some(first) = body
        .get("non_field_errors")
        .and_then(|v| v.as_array())
        .and_then(|errors| errors.first())
        .and_then(|v| v.as_str())
    {
        return Some(first.to_string());
    }

    match body {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}
