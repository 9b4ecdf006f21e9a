//! Error taxonomy shared by every converter, transformer and stream.
//!
//! [`TransformError`] is what the library returns; [`ResponseError`] is the
//! structured, vendor-neutral form of an error that ends up in a canonical
//! [`Response`](crate::canonical::Response) or in a vendor error envelope.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    InvalidModel,
    UnsupportedOperation,
    Upstream,
    Internal,
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("upstream error ({}): {}", .0.status_code, .0.detail.message)]
    Upstream(ResponseError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransformError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformError::InvalidRequest(_) | TransformError::Json(_) => ErrorKind::InvalidRequest,
            TransformError::InvalidModel(_) => ErrorKind::InvalidModel,
            TransformError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            TransformError::Upstream(_) => ErrorKind::Upstream,
            TransformError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TransformError::InvalidRequest(_)
            | TransformError::Json(_)
            | TransformError::UnsupportedOperation(_) => StatusCode::BAD_REQUEST,
            TransformError::InvalidModel(_) => StatusCode::NOT_FOUND,
            TransformError::Upstream(err) => StatusCode::from_u16(err.status_code)
                .unwrap_or(StatusCode::BAD_GATEWAY),
            TransformError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured form used when rendering the error in a vendor envelope.
    pub fn to_response_error(&self) -> ResponseError {
        match self {
            TransformError::Upstream(err) => err.clone(),
            TransformError::InvalidRequest(message) => {
                ResponseError::new(400, message.clone(), "invalid_request_error")
            }
            TransformError::Json(err) => {
                ResponseError::new(400, format!("invalid JSON body: {}", err), "invalid_request_error")
            }
            TransformError::InvalidModel(message) => {
                ResponseError::new(404, message.clone(), "not_found_error")
                    .with_code("model_not_found")
            }
            TransformError::UnsupportedOperation(message) => {
                ResponseError::new(400, message.clone(), "invalid_request_error")
                    .with_code("unsupported_operation")
            }
            TransformError::Internal(message) => {
                ResponseError::new(500, message.clone(), "api_error")
            }
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        TransformError::InvalidRequest(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        TransformError::UnsupportedOperation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TransformError::Internal(message.into())
    }
}

impl From<ResponseError> for TransformError {
    fn from(err: ResponseError) -> Self {
        TransformError::Upstream(err)
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub param: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ResponseError {
    pub status_code: u16,
    pub detail: ErrorDetail,
}

impl ResponseError {
    pub fn new(status_code: u16, message: impl Into<String>, error_type: impl Into<String>) -> Self {
        ResponseError {
            status_code,
            detail: ErrorDetail {
                message: message.into(),
                error_type: Some(error_type.into()),
                code: None,
                param: None,
            },
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.detail.code = Some(code.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.detail.message
    }

    pub fn error_type(&self) -> &str {
        self.detail
            .error_type
            .as_deref()
            .unwrap_or_else(|| default_error_type(self.status_code))
    }

    /// Best-effort parse of a vendor error body.
    ///
    /// Understands `{"error": {...}}` (OpenAI, Responses, Gemini),
    /// `{"type": "error", "error": {...}}` (Anthropic), `{"error": "text"}`,
    /// a top-level `message`, and plain text. Anything else falls back to the
    /// status line's reason phrase.
    pub fn from_upstream(status_code: u16, body: &[u8]) -> Self {
        let mut detail = match serde_json::from_slice::<Value>(body) {
            Ok(value) => detail_from_value(&value),
            Err(_) => {
                let text = String::from_utf8_lossy(body).trim().to_string();
                ErrorDetail {
                    message: text,
                    ..Default::default()
                }
            }
        };

        if detail.message.is_empty() {
            detail.message = StatusCode::from_u16(status_code)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("upstream error")
                .to_string();
        }
        if detail.error_type.is_none() {
            detail.error_type = Some(default_error_type(status_code).to_string());
        }

        ResponseError {
            status_code,
            detail,
        }
    }
}

fn detail_from_value(value: &Value) -> ErrorDetail {
    match value.get("error") {
        Some(Value::Object(obj)) => ErrorDetail {
            message: string_field(obj.get("message")).unwrap_or_default(),
            // Gemini puts the symbolic name in `status` and a number in `code`.
            error_type: string_field(obj.get("type")).or_else(|| string_field(obj.get("status"))),
            code: string_field(obj.get("code")),
            param: string_field(obj.get("param")),
        },
        Some(Value::String(message)) => ErrorDetail {
            message: message.clone(),
            error_type: string_field(value.get("type")).filter(|t| t != "error"),
            ..Default::default()
        },
        _ => ErrorDetail {
            message: string_field(value.get("message"))
                .or_else(|| string_field(value.get("detail")))
                .unwrap_or_default(),
            ..Default::default()
        },
    }
}

fn string_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn default_error_type(status_code: u16) -> &'static str {
    match status_code {
        400 => "invalid_request_error",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        413 => "request_too_large",
        429 => "rate_limit_error",
        529 => "overloaded_error",
        s if s >= 500 => "api_error",
        _ => "invalid_request_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_openai_error_body() {
        let body = br#"{"error":{"message":"Incorrect API key","type":"invalid_request_error","code":"invalid_api_key","param":null}}"#;
        let err = ResponseError::from_upstream(401, body);
        assert_eq!(err.status_code, 401);
        assert_eq!(err.message(), "Incorrect API key");
        assert_eq!(err.error_type(), "invalid_request_error");
        assert_eq!(err.detail.code.as_deref(), Some("invalid_api_key"));
        assert!(err.detail.param.is_none());
    }

    #[test]
    fn test_parses_anthropic_error_body() {
        let body = br#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = ResponseError::from_upstream(529, body);
        assert_eq!(err.message(), "Overloaded");
        assert_eq!(err.error_type(), "overloaded_error");
    }

    #[test]
    fn test_parses_gemini_error_body() {
        let body = br#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        let err = ResponseError::from_upstream(400, body);
        assert_eq!(err.message(), "API key not valid.");
        assert_eq!(err.error_type(), "INVALID_ARGUMENT");
        assert_eq!(err.detail.code.as_deref(), Some("400"));
    }

    #[test]
    fn test_falls_back_to_status_text() {
        let err = ResponseError::from_upstream(503, b"");
        assert_eq!(err.message(), "Service Unavailable");
        assert_eq!(err.error_type(), "api_error");

        let err = ResponseError::from_upstream(502, b"bad gateway from proxy");
        assert_eq!(err.message(), "bad gateway from proxy");
    }

    #[test]
    fn test_kind_status_mapping() {
        assert_eq!(
            TransformError::invalid_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TransformError::InvalidModel("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        let upstream = TransformError::from(ResponseError::new(429, "slow down", "rate_limit_error"));
        assert_eq!(upstream.kind(), ErrorKind::Upstream);
        assert_eq!(upstream.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            TransformError::internal("boom").to_response_error().error_type(),
            "api_error"
        );
    }
}
