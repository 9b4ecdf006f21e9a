use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::HashMap;

use super::ApiDefinition;
use crate::canonical::CacheControl;
use crate::errors::ResponseError;
use crate::transforms::lib::ExtractText;
use crate::MESSAGES_PATH;

pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

// Enum for all supported Anthropic APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnthropicApi {
    Messages,
}

impl ApiDefinition for AnthropicApi {
    fn endpoint(&self) -> &'static str {
        match self {
            AnthropicApi::Messages => MESSAGES_PATH,
        }
    }

    fn from_endpoint(endpoint: &str) -> Option<Self> {
        match endpoint {
            MESSAGES_PATH => Some(AnthropicApi::Messages),
            _ => None,
        }
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_vision(&self) -> bool {
        true
    }

    fn all_variants() -> Vec<Self> {
        vec![AnthropicApi::Messages]
    }
}

// Thinking configuration
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ThinkingConfig {
    /// `enabled`, `disabled` or `adaptive`
    #[serde(rename = "type")]
    pub thinking_type: String,
    pub budget_tokens: Option<u32>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MessagesRequest {
    pub model: String,
    pub messages: Vec<MessagesMessage>,
    /// Required by the API; kept optional so its absence is reported as an invalid request.
    pub max_tokens: Option<u32>,
    pub system: Option<MessagesSystemPrompt>,
    pub metadata: Option<HashMap<String, Value>>,
    pub container: Option<String>,
    pub service_tier: Option<String>,
    pub thinking: Option<ThinkingConfig>,

    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub stream: Option<bool>,
    pub stop_sequences: Option<Vec<String>>,
    pub tools: Option<Vec<MessagesTool>>,
    pub tool_choice: Option<MessagesToolChoice>,
}

impl TryFrom<&[u8]> for MessagesRequest {
    type Error = serde_json::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

// Messages API specific types
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessagesRole {
    User,
    Assistant,
}

impl MessagesRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagesRole::User => "user",
            MessagesRole::Assistant => "assistant",
        }
    }
}

/// Tool result content can be either a string or array of content blocks
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<MessagesContentBlock>),
}

impl ExtractText for ToolResultContent {
    fn extract_text(&self) -> String {
        match self {
            ToolResultContent::Text(text) => text.clone(),
            ToolResultContent::Blocks(blocks) => blocks.extract_text(),
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum MessagesContentBlock {
    Text {
        text: String,
        cache_control: Option<CacheControl>,
    },
    Thinking {
        thinking: String,
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
    Image {
        source: MessagesImageSource,
        cache_control: Option<CacheControl>,
    },
    Document {
        source: MessagesImageSource,
        cache_control: Option<CacheControl>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        cache_control: Option<CacheControl>,
    },
    ToolResult {
        tool_use_id: String,
        is_error: Option<bool>,
        content: Option<ToolResultContent>,
        cache_control: Option<CacheControl>,
    },
    /// Server tools and other blocks with no cross-vendor equivalent.
    #[serde(other)]
    Unsupported,
}

impl MessagesContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        MessagesContentBlock::Text {
            text: text.into(),
            cache_control: None,
        }
    }
}

impl ExtractText for Vec<MessagesContentBlock> {
    fn extract_text(&self) -> String {
        self.iter()
            .filter_map(|block| match block {
                MessagesContentBlock::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum MessagesImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MessagesMessageContent {
    Single(String),
    Blocks(Vec<MessagesContentBlock>),
}

impl ExtractText for MessagesMessageContent {
    fn extract_text(&self) -> String {
        match self {
            MessagesMessageContent::Single(text) => text.clone(),
            MessagesMessageContent::Blocks(parts) => parts.extract_text(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MessagesSystemPrompt {
    Single(String),
    Blocks(Vec<MessagesContentBlock>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessagesMessage {
    pub role: MessagesRole,
    pub content: MessagesMessageContent,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessagesTool {
    pub name: String,
    pub description: Option<String>,
    /// Absent on server tools such as `web_search_20250305`.
    pub input_schema: Option<Value>,
    /// Set only on server tools.
    #[serde(rename = "type")]
    pub tool_type: Option<String>,
    pub cache_control: Option<CacheControl>,
}

impl MessagesTool {
    pub fn is_custom(&self) -> bool {
        matches!(self.tool_type.as_deref(), None | Some("custom"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MessagesToolChoiceType {
    Auto,
    Any,
    Tool,
    None,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessagesToolChoice {
    #[serde(rename = "type")]
    pub kind: MessagesToolChoiceType,
    pub name: Option<String>,
    pub disable_parallel_tool_use: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessagesStopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    PauseTurn,
    Refusal,
    #[serde(other)]
    Other,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MessagesUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    pub cache_creation_input_tokens: Option<u32>,
    pub cache_read_input_tokens: Option<u32>,
    /// Cache-read alias used by some Anthropic-compatible endpoints.
    #[serde(skip_serializing)]
    pub cached_tokens: Option<u32>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub obj_type: String,
    pub role: MessagesRole,
    pub content: Vec<MessagesContentBlock>,
    pub model: String,
    #[serialize_always]
    pub stop_reason: Option<MessagesStopReason>,
    #[serialize_always]
    pub stop_sequence: Option<String>,
    pub usage: MessagesUsage,
    pub container: Option<Value>,
}

impl TryFrom<&[u8]> for MessagesResponse {
    type Error = serde_json::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

// ============================================================================
// Streaming
// ============================================================================

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum MessagesStreamEvent {
    MessageStart {
        message: MessagesStreamMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: MessagesContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: MessagesContentDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessagesMessageDelta,
        usage: Option<MessagesUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: AnthropicErrorBody,
    },
}

impl MessagesStreamEvent {
    /// Value of the SSE `event:` line for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            MessagesStreamEvent::MessageStart { .. } => "message_start",
            MessagesStreamEvent::ContentBlockStart { .. } => "content_block_start",
            MessagesStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            MessagesStreamEvent::ContentBlockStop { .. } => "content_block_stop",
            MessagesStreamEvent::MessageDelta { .. } => "message_delta",
            MessagesStreamEvent::MessageStop => "message_stop",
            MessagesStreamEvent::Ping => "ping",
            MessagesStreamEvent::Error { .. } => "error",
        }
    }
}

/// `message` of a `message_start` event; `content` is always serialized (empty).
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessagesStreamMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub obj_type: String,
    pub role: MessagesRole,
    #[serde(default)]
    pub content: Vec<MessagesContentBlock>,
    pub model: String,
    #[serialize_always]
    pub stop_reason: Option<MessagesStopReason>,
    #[serialize_always]
    pub stop_sequence: Option<String>,
    #[serde(default)]
    pub usage: MessagesUsage,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum MessagesContentDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(rename = "signature_delta")]
    SignatureDelta { signature: String },
    #[serde(other)]
    Unsupported,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MessagesMessageDelta {
    #[serialize_always]
    pub stop_reason: Option<MessagesStopReason>,
    #[serialize_always]
    pub stop_sequence: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnthropicErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnthropicErrorResponse {
    #[serde(rename = "type")]
    pub obj_type: String,
    pub error: AnthropicErrorBody,
}

impl From<&ResponseError> for AnthropicErrorResponse {
    fn from(err: &ResponseError) -> Self {
        AnthropicErrorResponse {
            obj_type: "error".to_string(),
            error: AnthropicErrorBody {
                error_type: anthropic_error_type(err).to_string(),
                message: err.message().to_string(),
            },
        }
    }
}

/// Anthropic only knows its own error vocabulary; foreign types fall back to
/// the one implied by the status code.
fn anthropic_error_type(err: &ResponseError) -> &str {
    match err.error_type() {
        t @ ("invalid_request_error" | "authentication_error" | "permission_error"
        | "not_found_error" | "request_too_large" | "rate_limit_error" | "api_error"
        | "overloaded_error") => t,
        _ => crate::errors::default_error_type(err.status_code),
    }
}
