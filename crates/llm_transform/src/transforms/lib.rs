use base64::Engine;
use jsonrepair::{repair_json, Options};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::errors::TransformError;

pub trait ExtractText {
    fn extract_text(&self) -> String;
}

/// Helper to create a current unix timestamp
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Random identifier with a vendor-style prefix, e.g. `msg_…`, `call_…`.
pub fn generate_id(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4().simple())
}

// ============================================================================
// TOOL ARGUMENTS
// ============================================================================

const EMPTY_ARGUMENTS: &str = "{}";

/// Normalizes model-produced tool arguments into valid JSON text.
///
/// Empty input becomes `{}`, valid JSON passes through untouched, malformed
/// JSON is repaired and re-serialized compactly, and anything beyond repair
/// becomes `{}`. Never fails.
pub fn repair_tool_arguments(arguments: &str) -> String {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return EMPTY_ARGUMENTS.to_string();
    }
    if serde_json::from_str::<Value>(trimmed).is_ok() {
        return arguments.to_string();
    }

    match repair_json(trimmed, &Options::default()) {
        Ok(repaired) => match serde_json::from_str::<Value>(&repaired) {
            Ok(value) => {
                debug!("repaired tool arguments: {} -> {}", arguments, repaired);
                value.to_string()
            }
            Err(e) => {
                warn!("repaired tool arguments still invalid ({}), using {{}}", e);
                EMPTY_ARGUMENTS.to_string()
            }
        },
        Err(e) => {
            warn!("unable to repair tool arguments ({}), using {{}}", e);
            EMPTY_ARGUMENTS.to_string()
        }
    }
}

/// Tool arguments as a JSON object, for vendors that take structured input.
pub fn parse_tool_arguments(arguments: &str) -> Value {
    let repaired = repair_tool_arguments(arguments);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => {
            warn!("tool arguments are not an object: {}", other);
            Value::Object(Map::new())
        }
        Err(_) => Value::Object(Map::new()),
    }
}

/// Structured tool input back to argument text.
pub fn arguments_to_string(input: &Value) -> String {
    match input {
        Value::Null => EMPTY_ARGUMENTS.to_string(),
        Value::String(s) => repair_tool_arguments(s),
        other => other.to_string(),
    }
}

// ============================================================================
// DATA URLS
// ============================================================================

/// Splits `data:<media-type>;base64,<data>` into `(media_type, data)`.
/// Returns `None` for anything that is not a base64 data URL.
pub fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;
    let media_type = if media_type.is_empty() {
        "application/octet-stream"
    } else {
        media_type
    };
    Some((media_type.to_string(), data.to_string()))
}

pub fn to_data_url(media_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", media_type, data)
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>, TransformError> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| TransformError::InvalidRequest(format!("invalid base64 image data: {}", e)))
}

/// File extension for an image media type, used for multipart file names.
pub fn extension_for_media_type(media_type: &str) -> &'static str {
    match media_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repair_tool_arguments() {
        assert_eq!(repair_tool_arguments(""), "{}");
        assert_eq!(repair_tool_arguments("   "), "{}");
        assert_eq!(repair_tool_arguments(r#"{"a": 1}"#), r#"{"a": 1}"#);

        let repaired = repair_tool_arguments(r#"{"invalid": json}"#);
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value, json!({"invalid": "json"}));
    }

    #[test]
    fn test_repair_truncated_arguments() {
        let repaired = repair_tool_arguments(r#"{"city": "Paris", "units": "c"#);
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["city"], "Paris");
    }

    #[test]
    fn test_parse_tool_arguments_always_object() {
        assert_eq!(parse_tool_arguments(""), json!({}));
        assert_eq!(parse_tool_arguments("[1,2]"), json!({}));
        assert_eq!(parse_tool_arguments(r#"{"x":true}"#), json!({"x": true}));
    }

    #[test]
    fn test_data_url_round_trip() {
        let url = to_data_url("image/png", "iVBORw0KGgo=");
        assert_eq!(url, "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(
            parse_data_url(&url),
            Some(("image/png".to_string(), "iVBORw0KGgo=".to_string()))
        );
        assert_eq!(parse_data_url("https://example.com/cat.png"), None);
        assert_eq!(parse_data_url("data:text/plain,hello"), None);
    }

    #[test]
    fn test_generate_id_prefix() {
        let id = generate_id("call_");
        assert!(id.starts_with("call_"));
        assert_eq!(id.len(), "call_".len() + 32);
    }
}
