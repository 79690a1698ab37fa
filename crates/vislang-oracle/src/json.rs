//! Leading-JSON decoding of oracle text
//!
//! Models wrap answers in markdown fences and sometimes append commentary
//! after the object. Only the first JSON value is decoded; anything after it
//! is ignored.

use crate::error::DecodeError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Remove a surrounding markdown code fence, if any
#[must_use]
pub fn strip_fences(text: &str) -> &str {
    let mut text = text.trim();
    if text.starts_with("```") {
        text = match text.find('\n') {
            Some(newline) => &text[newline + 1..],
            None => "",
        };
    }
    if text.ends_with("```") {
        if let Some(close) = text.rfind("```") {
            text = &text[..close];
        }
    }
    text.trim()
}

/// Decode the leading JSON value of the text
///
/// # Errors
/// `DecodeError::Syntax` when the text does not start with a complete value.
pub fn decode_leading(text: &str) -> Result<Value, DecodeError> {
    let body = strip_fences(text);
    let mut stream = serde_json::Deserializer::from_str(body).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(DecodeError::Syntax(e.to_string())),
        None => Err(DecodeError::Syntax("empty response".to_string())),
    }
}

/// Decode the leading JSON object into a typed response
///
/// # Errors
/// - `DecodeError::Syntax` for malformed text
/// - `DecodeError::Shape` when the value is not an object or lacks required keys
pub fn decode_object<T: DeserializeOwned>(text: &str) -> Result<T, DecodeError> {
    let value = decode_leading(text)?;
    if !value.is_object() {
        return Err(DecodeError::Shape(format!(
            "expected a JSON object, got {}",
            kind(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| DecodeError::Shape(e.to_string()))
}

fn kind(value: &Value) -> &'static str {
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
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        fields: Vec<String>,
    }

    #[test]
    fn plain_object() {
        assert_eq!(decode_leading(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn fenced_object() {
        let text = "```json\n{\"a\": [1, 2]}\n```";
        assert_eq!(decode_leading(text).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn trailing_commentary_is_ignored() {
        let text = "{\"a\": true}\n\nI chose this because it is clear.";
        assert_eq!(decode_leading(text).unwrap(), json!({"a": true}));
    }

    #[test]
    fn unbalanced_braces_are_syntax_errors() {
        let err = decode_leading(r#"{"vegalite_spec": {"mark": "bar""#).unwrap_err();
        assert!(matches!(err, DecodeError::Syntax(_)));
        assert!(matches!(decode_leading("   "), Err(DecodeError::Syntax(_))));
    }

    #[test]
    fn typed_decode_checks_shape() {
        let ok: Answer = decode_object(r#"{"fields": ["a"]}"#).unwrap();
        assert_eq!(ok.fields, vec!["a"]);

        let not_object = decode_object::<Answer>("[1]").unwrap_err();
        assert!(matches!(not_object, DecodeError::Shape(ref m) if m.contains("an array")));

        let missing = decode_object::<Answer>(r#"{"other": 1}"#).unwrap_err();
        assert!(matches!(missing, DecodeError::Shape(_)));
    }
}
