//! Transport-neutral HTTP values exchanged with the (external) HTTP layer.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use std::collections::HashMap;

use crate::errors::{ResponseError, TransformError};

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_EVENT_STREAM: &str = "text/event-stream";

/// Which parser the outbound response needs; set by outbounds that route one
/// canonical request to several vendor endpoints.
pub const OUTBOUND_FORMAT_TYPE: &str = "outbound_format_type";
/// Model the request was sent for, for endpoints whose responses omit it.
pub const OUTBOUND_MODEL: &str = "outbound_model";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfig {
    Bearer(String),
    ApiKeyHeader { header: String, key: String },
}

impl AuthConfig {
    pub fn api_key_header(header: impl Into<String>, key: impl Into<String>) -> Self {
        AuthConfig::ApiKeyHeader {
            header: header.into(),
            key: key.into(),
        }
    }

    /// The header this credential is sent in.
    pub fn header(&self) -> Result<(HeaderName, HeaderValue), TransformError> {
        let (name, value) = match self {
            AuthConfig::Bearer(token) => (AUTHORIZATION, format!("Bearer {}", token)),
            AuthConfig::ApiKeyHeader { header, key } => (
                HeaderName::from_bytes(header.as_bytes()).map_err(|e| {
                    TransformError::invalid_request(format!("invalid auth header name {}: {}", header, e))
                })?,
                key.clone(),
            ),
        };
        let mut value = HeaderValue::from_str(&value)
            .map_err(|e| TransformError::invalid_request(format!("invalid credential: {}", e)))?;
        value.set_sensitive(true);
        Ok((name, value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartFile {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// A `multipart/form-data` body; the transport picks the boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultipartBody {
    pub fields: Vec<(String, String)>,
    pub files: Vec<MultipartFile>,
}

impl MultipartBody {
    pub fn field(&mut self, name: &str, value: impl ToString) {
        self.fields.push((name.to_string(), value.to_string()));
    }

    pub fn optional_field<T: ToString>(&mut self, name: &str, value: Option<T>) {
        if let Some(value) = value {
            self.field(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL for outbound requests; empty for inbound ones.
    pub url: String,
    /// Path plus query, e.g. `/v1beta/models/gemini-2.5-pro:generateContent`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub auth: Option<AuthConfig>,
    /// Set instead of `body` for form uploads.
    pub multipart: Option<MultipartBody>,
    pub metadata: HashMap<String, String>,
}

impl HttpRequest {
    /// An inbound client request as received by the gateway.
    pub fn inbound(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        HttpRequest {
            method: Method::POST,
            path: path.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// A JSON POST to `base_url` + `path`.
    pub fn post_json<T: Serialize>(base_url: &str, path: impl Into<String>, payload: &T) -> Result<Self, TransformError> {
        let path = path.into();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        Ok(HttpRequest {
            method: Method::POST,
            url: join_url(base_url, &path),
            path,
            headers,
            body: Bytes::from(serde_json::to_vec(payload)?),
            ..Default::default()
        })
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Result<Self, TransformError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransformError::invalid_request(format!("invalid {} header: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Headers with the credential applied, ready for the wire.
    pub fn resolved_headers(&self) -> Result<HeaderMap, TransformError> {
        let mut headers = self.headers.clone();
        if let Some(auth) = &self.auth {
            let (name, value) = auth.header()?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Request metadata echoed back by the transport.
    pub metadata: HashMap<String, String>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        HttpResponse {
            status,
            body: body.into(),
            ..Default::default()
        }
    }

    /// A response to `request`, carrying over its metadata.
    pub fn for_request(request: &HttpRequest, status: StatusCode, body: impl Into<Bytes>) -> Self {
        HttpResponse {
            metadata: request.metadata.clone(),
            ..HttpResponse::new(status, body)
        }
    }

    pub fn json<T: Serialize>(status: StatusCode, payload: &T) -> Result<Self, TransformError> {
        let mut response = HttpResponse::new(status, serde_json::to_vec(payload)?);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        Ok(response)
    }

    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    /// 4xx and 5xx become [`TransformError::Upstream`].
    pub fn error_for_status(&self) -> Result<(), TransformError> {
        if self.is_error() {
            return Err(TransformError::Upstream(ResponseError::from_upstream(
                self.status.as_u16(),
                &self.body,
            )));
        }
        Ok(())
    }
}

pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_auth_headers() {
        let request = HttpRequest::post_json("https://api.example.com/", "/v1/messages", &json!({}))
            .unwrap()
            .with_auth(AuthConfig::api_key_header("x-api-key", "secret"));
        assert_eq!(request.url, "https://api.example.com/v1/messages");
        let headers = request.resolved_headers().unwrap();
        assert_eq!(headers["x-api-key"], "secret");
        assert_eq!(headers[CONTENT_TYPE], APPLICATION_JSON);

        let (name, value) = AuthConfig::Bearer("tok".to_string()).header().unwrap();
        assert_eq!(name, AUTHORIZATION);
        assert_eq!(value, "Bearer tok");
    }

    #[test]
    fn test_error_status_becomes_upstream() {
        let response = HttpResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"message": "slow down", "type": "rate_limit_error"}}"#,
        );
        match response.error_for_status() {
            Err(TransformError::Upstream(err)) => {
                assert_eq!(err.status_code, 429);
                assert_eq!(err.message(), "slow down");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(HttpResponse::new(StatusCode::OK, "{}").error_for_status().is_ok());
    }
}
