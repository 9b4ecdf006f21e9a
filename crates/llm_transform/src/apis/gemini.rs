//! Google Generative Language (`generateContent`) wire format types.
//!
//! Gemini accepts both camelCase and snake_case field names on input; output
//! always uses camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

use super::ApiDefinition;
use crate::errors::ResponseError;
use crate::GEMINI_MODELS_PREFIX;

const GENERATE_CONTENT_TEMPLATE: &str = "/v1beta/models/{model}:generateContent";
const STREAM_GENERATE_CONTENT_TEMPLATE: &str = "/v1beta/models/{model}:streamGenerateContent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeminiApi {
    GenerateContent,
    StreamGenerateContent,
}

impl GeminiApi {
    pub fn method(&self) -> &'static str {
        match self {
            GeminiApi::GenerateContent => "generateContent",
            GeminiApi::StreamGenerateContent => "streamGenerateContent",
        }
    }

    /// Path for a concrete model; streaming asks for SSE framing.
    pub fn path_for_model(&self, model: &str) -> String {
        match self {
            GeminiApi::GenerateContent => {
                format!("{}{}:generateContent", GEMINI_MODELS_PREFIX, model)
            }
            GeminiApi::StreamGenerateContent => {
                format!("{}{}:streamGenerateContent?alt=sse", GEMINI_MODELS_PREFIX, model)
            }
        }
    }
}

/// Splits `/v1beta/models/{model}:{method}` into the model and the API.
pub fn parse_model_path(path: &str) -> Option<(String, GeminiApi)> {
    let path = path.split('?').next().unwrap_or(path);
    let rest = path
        .strip_prefix(GEMINI_MODELS_PREFIX)
        .or_else(|| path.strip_prefix("/v1/models/"))?;
    let (model, method) = rest.rsplit_once(':')?;
    if model.is_empty() {
        return None;
    }
    let api = match method {
        "generateContent" => GeminiApi::GenerateContent,
        "streamGenerateContent" => GeminiApi::StreamGenerateContent,
        _ => return None,
    };
    Some((model.to_string(), api))
}

impl ApiDefinition for GeminiApi {
    fn endpoint(&self) -> &'static str {
        match self {
            GeminiApi::GenerateContent => GENERATE_CONTENT_TEMPLATE,
            GeminiApi::StreamGenerateContent => STREAM_GENERATE_CONTENT_TEMPLATE,
        }
    }

    fn from_endpoint(endpoint: &str) -> Option<Self> {
        parse_model_path(endpoint).map(|(_, api)| api)
    }

    fn supports_streaming(&self) -> bool {
        matches!(self, GeminiApi::StreamGenerateContent)
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_vision(&self) -> bool {
        true
    }

    fn all_variants() -> Vec<Self> {
        vec![GeminiApi::GenerateContent, GeminiApi::StreamGenerateContent]
    }
}

// -- Request types --

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(default)]
    pub contents: Vec<Content>,
    #[serde(alias = "system_instruction")]
    pub system_instruction: Option<Content>,
    #[serde(alias = "generation_config")]
    pub generation_config: Option<GenerationConfig>,
    pub tools: Option<Vec<GeminiTool>>,
    #[serde(alias = "tool_config")]
    pub tool_config: Option<ToolConfig>,
    #[serde(alias = "safety_settings")]
    pub safety_settings: Option<Value>,
    #[serde(alias = "cached_content")]
    pub cached_content: Option<String>,
}

impl TryFrom<&[u8]> for GenerateContentRequest {
    type Error = serde_json::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

pub const ROLE_USER: &str = "user";
pub const ROLE_MODEL: &str = "model";

/// Role plus parts
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Content {
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A single part. Exactly one payload field is set; `thought` and
/// `thoughtSignature` annotate text and function-call parts.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub thought: Option<bool>,
    #[serde(alias = "thought_signature")]
    pub thought_signature: Option<String>,
    #[serde(alias = "inline_data")]
    pub inline_data: Option<Blob>,
    #[serde(alias = "file_data")]
    pub file_data: Option<FileData>,
    #[serde(alias = "function_call")]
    pub function_call: Option<FunctionCall>,
    #[serde(alias = "function_response")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    #[serde(alias = "mime_type")]
    pub mime_type: Option<String>,
    #[serde(alias = "file_uri")]
    pub file_uri: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub id: Option<String>,
    pub name: String,
    pub args: Option<Value>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    #[serde(alias = "include_thoughts")]
    pub include_thoughts: Option<bool>,
    /// `-1` asks for a dynamic budget, `0` disables thinking.
    #[serde(alias = "thinking_budget")]
    pub thinking_budget: Option<i32>,
    #[serde(alias = "thinking_level")]
    pub thinking_level: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    #[serde(alias = "top_p")]
    pub top_p: Option<f32>,
    #[serde(alias = "top_k")]
    pub top_k: Option<u32>,
    #[serde(alias = "max_output_tokens")]
    pub max_output_tokens: Option<u32>,
    #[serde(alias = "stop_sequences")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(alias = "candidate_count")]
    pub candidate_count: Option<u32>,
    #[serde(alias = "presence_penalty")]
    pub presence_penalty: Option<f32>,
    #[serde(alias = "frequency_penalty")]
    pub frequency_penalty: Option<f32>,
    pub seed: Option<i64>,
    #[serde(alias = "response_mime_type")]
    pub response_mime_type: Option<String>,
    #[serde(alias = "response_schema")]
    pub response_schema: Option<Value>,
    #[serde(alias = "response_json_schema")]
    pub response_json_schema: Option<Value>,
    #[serde(alias = "response_modalities")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(alias = "response_logprobs")]
    pub response_logprobs: Option<bool>,
    pub logprobs: Option<u32>,
    #[serde(alias = "thinking_config")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<Value>,
    #[serde(rename = "parametersJsonSchema", alias = "parameters_json_schema")]
    pub parameters_json_schema: Option<Value>,
}

/// Function declarations plus any built-in tools, kept verbatim.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiTool {
    #[serde(alias = "function_declarations")]
    pub function_declarations: Option<Vec<FunctionDeclaration>>,
    #[serde(alias = "google_search")]
    pub google_search: Option<Value>,
    #[serde(alias = "code_execution")]
    pub code_execution: Option<Value>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    /// `AUTO`, `ANY`, `NONE` or `VALIDATED`
    pub mode: Option<String>,
    #[serde(alias = "allowed_function_names")]
    pub allowed_function_names: Option<Vec<String>>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    #[serde(alias = "function_calling_config")]
    pub function_calling_config: Option<FunctionCallingConfig>,
}

// -- Response types --

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
    pub index: Option<u32>,
    pub safety_ratings: Option<Value>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
    pub cached_content_token_count: Option<u32>,
    pub thoughts_token_count: Option<u32>,
}

/// A `generateContent` response; each streamed chunk has the same shape.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<Value>,
    pub usage_metadata: Option<UsageMetadata>,
    pub model_version: Option<String>,
    pub response_id: Option<String>,
}

impl TryFrom<&[u8]> for GenerateContentResponse {
    type Error = serde_json::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeminiErrorBody {
    pub code: u16,
    pub message: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeminiErrorResponse {
    pub error: GeminiErrorBody,
}

impl From<&ResponseError> for GeminiErrorResponse {
    fn from(err: &ResponseError) -> Self {
        GeminiErrorResponse {
            error: GeminiErrorBody {
                code: err.status_code,
                message: err.message().to_string(),
                status: status_for_code(err.status_code).to_string(),
            },
        }
    }
}

/// google.rpc status name for an HTTP status.
pub fn status_for_code(status_code: u16) -> &'static str {
    match status_code {
        400 => "INVALID_ARGUMENT",
        401 => "UNAUTHENTICATED",
        403 => "PERMISSION_DENIED",
        404 => "NOT_FOUND",
        409 => "ABORTED",
        429 => "RESOURCE_EXHAUSTED",
        499 => "CANCELLED",
        501 => "UNIMPLEMENTED",
        503 => "UNAVAILABLE",
        504 => "DEADLINE_EXCEEDED",
        s if s >= 500 => "INTERNAL",
        _ => "FAILED_PRECONDITION",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_model_path() {
        assert_eq!(
            parse_model_path("/v1beta/models/gemini-2.5-flash:generateContent"),
            Some(("gemini-2.5-flash".to_string(), GeminiApi::GenerateContent))
        );
        assert_eq!(
            parse_model_path("/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse"),
            Some(("gemini-2.5-pro".to_string(), GeminiApi::StreamGenerateContent))
        );
        assert_eq!(parse_model_path("/v1beta/models/gemini:countTokens"), None);
        assert_eq!(parse_model_path("/v1/chat/completions"), None);
    }

    #[test]
    fn test_path_for_model_round_trips() {
        let path = GeminiApi::StreamGenerateContent.path_for_model("gemini-2.5-flash");
        assert_eq!(
            path,
            "/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            parse_model_path(&path).map(|(_, api)| api),
            Some(GeminiApi::StreamGenerateContent)
        );
    }

    #[test]
    fn test_request_accepts_snake_case_aliases() {
        let req: GenerateContentRequest = serde_json::from_value(json!({
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
            "system_instruction": {"parts": [{"text": "be brief"}]},
            "generation_config": {"max_output_tokens": 256, "thinking_config": {"thinking_budget": 1024}}
        }))
        .unwrap();
        assert!(req.system_instruction.is_some());
        let config = req.generation_config.unwrap();
        assert_eq!(config.max_output_tokens, Some(256));
        assert_eq!(config.thinking_config.and_then(|t| t.thinking_budget), Some(1024));
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let resp = GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some(ROLE_MODEL.to_string()),
                    parts: vec![Part {
                        function_call: Some(FunctionCall {
                            id: None,
                            name: "get_weather".to_string(),
                            args: Some(json!({"city": "Paris"})),
                        }),
                        ..Default::default()
                    }],
                }),
                finish_reason: Some("STOP".to_string()),
                ..Default::default()
            }],
            usage_metadata: Some(UsageMetadata {
                prompt_token_count: 5,
                candidates_token_count: 7,
                total_token_count: 12,
                ..Default::default()
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["candidates"][0]["finishReason"], "STOP");
        assert_eq!(
            value["candidates"][0]["content"]["parts"][0]["functionCall"]["name"],
            "get_weather"
        );
        assert_eq!(value["usageMetadata"]["totalTokenCount"], 12);
    }

    #[test]
    fn test_error_envelope() {
        let err = ResponseError::new(429, "quota", "rate_limit_error");
        let value = serde_json::to_value(GeminiErrorResponse::from(&err)).unwrap();
        assert_eq!(
            value,
            json!({"error": {"code": 429, "message": "quota", "status": "RESOURCE_EXHAUSTED"}})
        );
    }
}
