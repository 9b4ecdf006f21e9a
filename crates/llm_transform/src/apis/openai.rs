use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::HashMap;

use super::ApiDefinition;
use crate::canonical::{
    Function, MessageContent, ResponseFormat, Role, StreamOptions, ToolCall, ToolChoice,
};
use crate::errors::ResponseError;
use crate::{CHAT_COMPLETIONS_PATH, IMAGES_EDITS_PATH, IMAGES_GENERATIONS_PATH, RESPONSES_PATH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenAIApi {
    ChatCompletions,
    Responses,
    ImageGenerations,
    ImageEdits,
}

impl ApiDefinition for OpenAIApi {
    fn endpoint(&self) -> &'static str {
        match self {
            OpenAIApi::ChatCompletions => CHAT_COMPLETIONS_PATH,
            OpenAIApi::Responses => RESPONSES_PATH,
            OpenAIApi::ImageGenerations => IMAGES_GENERATIONS_PATH,
            OpenAIApi::ImageEdits => IMAGES_EDITS_PATH,
        }
    }

    fn from_endpoint(endpoint: &str) -> Option<Self> {
        let path = endpoint.split('?').next().unwrap_or(endpoint);
        match path {
            CHAT_COMPLETIONS_PATH => Some(OpenAIApi::ChatCompletions),
            RESPONSES_PATH => Some(OpenAIApi::Responses),
            IMAGES_GENERATIONS_PATH => Some(OpenAIApi::ImageGenerations),
            IMAGES_EDITS_PATH => Some(OpenAIApi::ImageEdits),
            _ => None,
        }
    }

    fn supports_streaming(&self) -> bool {
        matches!(self, OpenAIApi::ChatCompletions | OpenAIApi::Responses)
    }

    fn supports_tools(&self) -> bool {
        matches!(self, OpenAIApi::ChatCompletions | OpenAIApi::Responses)
    }

    fn supports_vision(&self) -> bool {
        true
    }

    fn all_variants() -> Vec<Self> {
        vec![
            OpenAIApi::ChatCompletions,
            OpenAIApi::Responses,
            OpenAIApi::ImageGenerations,
            OpenAIApi::ImageEdits,
        ]
    }
}

// ============================================================================
// Chat Completions request
// ============================================================================

/// `stop` accepts either a single string or a list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum StopSequences {
    Single(String),
    Multiple(Vec<String>),
}

impl StopSequences {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StopSequences::Single(s) => vec![s],
            StopSequences::Multiple(v) => v,
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<MessageContent>,
    pub name: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
    pub refusal: Option<String>,
    /// DeepSeek, Moonshot and OpenRouter reasoning text.
    pub reasoning_content: Option<String>,
    /// OpenRouter spelling of `reasoning_content`; read only.
    #[serde(skip_serializing)]
    pub reasoning: Option<String>,
}

impl ChatMessage {
    /// `reasoning_content` wins over the `reasoning` alias.
    pub fn reasoning_text(&self) -> Option<&str> {
        self.reasoning_content
            .as_deref()
            .or(self.reasoning.as_deref())
            .filter(|r| !r.is_empty())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: Function,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Option<Vec<ChatTool>>,
    pub tool_choice: Option<ToolChoice>,
    pub parallel_tool_calls: Option<bool>,

    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Accepted by a few compatible vendors (Qwen, OpenRouter).
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    pub max_completion_tokens: Option<u32>,
    pub stop: Option<StopSequences>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub seed: Option<i64>,
    pub n: Option<u32>,
    pub logprobs: Option<bool>,
    pub top_logprobs: Option<u32>,
    pub logit_bias: Option<HashMap<String, i32>>,
    pub user: Option<String>,

    pub stream: Option<bool>,
    pub stream_options: Option<StreamOptions>,

    /// Kept as a string so vendor-specific labels survive deserialization.
    pub reasoning_effort: Option<String>,
    pub response_format: Option<ResponseFormat>,
    pub metadata: Option<HashMap<String, String>>,
    pub service_tier: Option<String>,
    pub modalities: Option<Vec<String>>,
    pub store: Option<bool>,
}

impl TryFrom<&[u8]> for ChatCompletionsRequest {
    type Error = serde_json::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

// ============================================================================
// Chat Completions response
// ============================================================================

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PromptTokensDetails {
    pub cached_tokens: Option<u32>,
    pub audio_tokens: Option<u32>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CompletionTokensDetails {
    pub reasoning_tokens: Option<u32>,
    pub audio_tokens: Option<u32>,
    pub accepted_prediction_tokens: Option<u32>,
    pub rejected_prediction_tokens: Option<u32>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    pub completion_tokens_details: Option<CompletionTokensDetails>,
    /// DeepSeek cache hit count.
    #[serde(skip_serializing)]
    pub prompt_cache_hit_tokens: Option<u32>,
    #[serde(skip_serializing)]
    pub prompt_cache_miss_tokens: Option<u32>,
    /// Moonshot reports cache hits at the top level.
    #[serde(skip_serializing)]
    pub cached_tokens: Option<u32>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    #[serialize_always]
    pub finish_reason: Option<String>,
    pub logprobs: Option<Value>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChatCompletionsResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
    pub system_fingerprint: Option<String>,
    pub service_tier: Option<String>,
}

impl TryFrom<&[u8]> for ChatCompletionsResponse {
    type Error = serde_json::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

// ============================================================================
// Chat Completions streaming
// ============================================================================

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FunctionCallDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub call_type: Option<String>,
    pub function: Option<FunctionCallDelta>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChatDelta {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing)]
    pub reasoning: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
    pub refusal: Option<String>,
}

impl ChatDelta {
    pub fn reasoning_text(&self) -> Option<&str> {
        self.reasoning_content
            .as_deref()
            .or(self.reasoning.as_deref())
            .filter(|r| !r.is_empty())
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChunkChoice {
    pub index: u32,
    #[serde(default)]
    pub delta: ChatDelta,
    #[serialize_always]
    pub finish_reason: Option<String>,
    pub logprobs: Option<Value>,
}

/// One `chat.completion.chunk`. `choices` is always serialized, including the
/// empty list carried by the trailing usage chunk.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    pub usage: Option<ChatUsage>,
    pub system_fingerprint: Option<String>,
    pub service_tier: Option<String>,
}

// ============================================================================
// Images
// ============================================================================

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    pub n: Option<u32>,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub response_format: Option<String>,
    pub output_format: Option<String>,
    pub output_compression: Option<u32>,
    pub background: Option<String>,
    pub moderation: Option<String>,
    pub user: Option<String>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ImageData {
    pub b64_json: Option<String>,
    pub url: Option<String>,
    pub revised_prompt: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ImageInputTokensDetails {
    #[serde(default)]
    pub text_tokens: u32,
    #[serde(default)]
    pub image_tokens: u32,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ImagesUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    pub input_tokens_details: Option<ImageInputTokensDetails>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ImagesResponse {
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub data: Vec<ImageData>,
    pub usage: Option<ImagesUsage>,
    pub background: Option<String>,
    pub output_format: Option<String>,
    pub quality: Option<String>,
    pub size: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OpenAIErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serialize_always]
    pub param: Option<String>,
    #[serialize_always]
    pub code: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OpenAIErrorResponse {
    pub error: OpenAIErrorBody,
}

impl From<&ResponseError> for OpenAIErrorResponse {
    fn from(err: &ResponseError) -> Self {
        OpenAIErrorResponse {
            error: OpenAIErrorBody {
                message: err.message().to_string(),
                error_type: err.error_type().to_string(),
                param: err.detail.param.clone(),
                code: err.detail.code.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_accepts_string_or_list_stop() {
        let req: ChatCompletionsRequest = serde_json::from_value(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "stop": "END"
        }))
        .unwrap();
        assert_eq!(req.stop.clone().map(StopSequences::into_vec), Some(vec!["END".to_string()]));

        let req: ChatCompletionsRequest = serde_json::from_value(json!({
            "model": "gpt-4o",
            "messages": [{"role": "developer", "content": [{"type": "text", "text": "be brief"}]}],
            "stop": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(req.messages[0].role, Role::Developer);
        assert_eq!(req.stop.map(StopSequences::into_vec).map(|v| v.len()), Some(2));
    }

    #[test]
    fn test_chunk_keeps_empty_choices_and_null_finish_reason() {
        let usage_chunk = ChatCompletionChunk {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 1,
            model: "gpt-4o".to_string(),
            choices: vec![],
            usage: Some(ChatUsage {
                prompt_tokens: 3,
                completion_tokens: 4,
                total_tokens: 7,
                ..Default::default()
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(&usage_chunk).unwrap();
        assert_eq!(value["choices"], json!([]));

        let delta_chunk = ChatCompletionChunk {
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChatDelta {
                    content: Some("Hi".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&delta_chunk).unwrap();
        assert_eq!(value["choices"][0]["finish_reason"], Value::Null);
        assert!(value.get("usage").is_none());
    }

    #[test]
    fn test_reasoning_alias_is_read_only() {
        let delta: ChatDelta =
            serde_json::from_value(json!({"reasoning": "thinking..."})).unwrap();
        assert_eq!(delta.reasoning_text(), Some("thinking..."));
        let value = serde_json::to_value(&delta).unwrap();
        assert!(value.get("reasoning").is_none());

        let both: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "reasoning_content": "documented",
            "reasoning": "alias"
        }))
        .unwrap();
        assert_eq!(both.reasoning_text(), Some("documented"));
    }

    #[test]
    fn test_deepseek_usage_fields() {
        let usage: ChatUsage = serde_json::from_value(json!({
            "prompt_tokens": 100,
            "completion_tokens": 10,
            "total_tokens": 110,
            "prompt_cache_hit_tokens": 60,
            "prompt_cache_miss_tokens": 40
        }))
        .unwrap();
        assert_eq!(usage.prompt_cache_hit_tokens, Some(60));
        assert!(usage.prompt_tokens_details.is_none());
    }

    #[test]
    fn test_error_envelope_serializes_null_code_and_param() {
        let err = ResponseError::new(400, "bad", "invalid_request_error");
        let value = serde_json::to_value(OpenAIErrorResponse::from(&err)).unwrap();
        assert_eq!(
            value,
            json!({"error": {"message": "bad", "type": "invalid_request_error", "param": null, "code": null}})
        );
    }

    #[test]
    fn test_api_from_endpoint() {
        assert_eq!(
            OpenAIApi::from_endpoint("/v1/chat/completions"),
            Some(OpenAIApi::ChatCompletions)
        );
        assert_eq!(
            OpenAIApi::from_endpoint("/v1/images/edits"),
            Some(OpenAIApi::ImageEdits)
        );
        assert!(!OpenAIApi::ImageGenerations.supports_streaming());
        assert_eq!(OpenAIApi::from_endpoint("/v1/embeddings"), None);
    }
}
