//! Structured extraction from completion text.
//!
//! Models asked for "JSON only" still wrap it in Markdown fences or add a
//! sentence around it. Fences are stripped, a surrounding object is located,
//! and anything that still does not parse is reported as `ExtractionFailed`
//! with the raw completion attached.

use serde_json::{Map, Value};

use crate::core::errors::ApiError;

/// Removes a leading ```` ``` ```` / ```` ```json ```` line and a trailing
/// ```` ``` ````.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parses a JSON object out of `raw`.
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, ApiError> {
    let stripped = strip_code_fences(raw);

    let parsed = serde_json::from_str::<Value>(stripped).or_else(|first_err| {
        // Fall back to the outermost braces when the model added prose.
        match (stripped.find('{'), stripped.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str::<Value>(&stripped[start..=end]).map_err(|_| first_err)
            }
            _ => Err(first_err),
        }
    });

    match parsed {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(failed(
            format!("expected a JSON object, got {}", json_kind(&other)),
            raw,
        )),
        Err(err) => Err(failed(format!("completion was not valid JSON: {}", err), raw)),
    }
}

/// Reads `fields` from an extracted object as display strings. Numbers and
/// booleans are rendered; a missing or null field fails the extraction.
pub fn string_fields(
    object: &Map<String, Value>,
    fields: &[&str],
    raw: &str,
) -> Result<Vec<(String, String)>, ApiError> {
    fields
        .iter()
        .map(|field| {
            let value = match object.get(*field) {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                Some(Value::Null) | None => {
                    return Err(failed(format!("field '{}' is missing", field), raw))
                }
                Some(other) => other.to_string(),
            };
            Ok((field.to_string(), value))
        })
        .collect()
}

fn failed(message: String, raw: &str) -> ApiError {
    tracing::warn!(reason = %message, raw_len = raw.len(), "Structured extraction failed");
    ApiError::ExtractionFailed {
        message,
        raw: raw.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_json_fence() {
        let object = extract_json_object("```json\n{\"sender_name\":\"A\"}\n```").unwrap();
        assert_eq!(Value::Object(object), json!({"sender_name": "A"}));
    }

    #[test]
    fn strips_bare_fence_and_whitespace() {
        assert_eq!(strip_code_fences("  ```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn finds_object_inside_prose() {
        let object = extract_json_object("Sure! Here it is: {\"amount\": 5000} Hope this helps.").unwrap();
        assert_eq!(object["amount"], json!(5000));
    }

    #[test]
    fn invalid_json_keeps_raw_text() {
        let raw = "I could not find any names in that complaint.";
        match extract_json_object(raw).unwrap_err() {
            ApiError::ExtractionFailed { raw: kept, .. } => assert_eq!(kept, raw),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(matches!(
            extract_json_object("[1, 2]"),
            Err(ApiError::ExtractionFailed { .. })
        ));
    }

    #[test]
    fn string_fields_render_scalars_and_reject_missing() {
        let object = extract_json_object(r#"{"sender_name":"A","amount":5000}"#).unwrap();
        let fields = string_fields(&object, &["sender_name", "amount"], "raw").unwrap();
        assert_eq!(fields[1], ("amount".to_string(), "5000".to_string()));

        let err = string_fields(&object, &["act"], "raw").unwrap_err();
        assert!(matches!(err, ApiError::ExtractionFailed { message, .. } if message.contains("act")));
    }
}
