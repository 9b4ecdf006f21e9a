use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::HashMap;

use crate::transforms::lib::ExtractText;

impl TryFrom<&[u8]> for ResponsesRequest {
    type Error = serde_json::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

impl TryFrom<&[u8]> for ResponsesResponse {
    type Error = serde_json::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

// ============================================================================
// Request Structs - CreateResponse
// ============================================================================

/// Request to create a model response
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResponsesRequest {
    /// The model to use for generating the response
    pub model: String,

    /// Text or item inputs to the model
    pub input: ResponsesInput,

    /// A system (or developer) message inserted into the model's context
    pub instructions: Option<String>,

    /// Tools available to the model
    pub tools: Option<Vec<ResponsesTool>>,

    /// Tool choice option
    pub tool_choice: Option<ResponsesToolChoice>,

    /// Whether to allow the model to run tool calls in parallel
    pub parallel_tool_calls: Option<bool>,

    /// Maximum number of output tokens, reasoning included
    pub max_output_tokens: Option<u32>,

    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_logprobs: Option<u32>,

    /// If set to true, the response is streamed as server-sent events
    pub stream: Option<bool>,

    /// Reasoning effort and summary settings
    pub reasoning: Option<ReasoningConfig>,

    /// Text output format configuration
    pub text: Option<TextConfig>,

    pub metadata: Option<HashMap<String, String>>,

    /// Previous response ID for conversation continuation
    pub previous_response_id: Option<String>,

    /// Whether to store the generated response for later retrieval
    pub store: Option<bool>,

    /// Additional output data to include, e.g. `reasoning.encrypted_content`
    pub include: Option<Vec<String>>,

    /// Truncation strategy
    pub truncation: Option<String>,

    pub user: Option<String>,
    pub service_tier: Option<String>,
}

/// Input parameter - a bare string or a list of input items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResponsesInput {
    Text(String),
    Items(Vec<InputItem>),
}

impl Default for ResponsesInput {
    fn default() -> Self {
        ResponsesInput::Items(Vec::new())
    }
}

/// An input item. Typed items carry a `type`; "easy" messages omit it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum InputItem {
    Typed(TypedInputItem),
    EasyMessage(EasyInputMessage),
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedInputItem {
    Message {
        id: Option<String>,
        role: String,
        content: InputContent,
        status: Option<String>,
    },
    FunctionCall {
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
        status: Option<String>,
    },
    FunctionCallOutput {
        id: Option<String>,
        call_id: String,
        /// A string, or a list of input content parts
        output: Value,
    },
    Reasoning {
        id: Option<String>,
        #[serde(default)]
        summary: Vec<SummaryPart>,
        encrypted_content: Option<String>,
    },
    ImageGenerationCall {
        id: String,
        status: Option<String>,
        result: Option<String>,
    },
    ItemReference {
        id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EasyInputMessage {
    pub role: String,
    pub content: InputContent,
}

/// Message content - a bare string or a list of content parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum InputContent {
    Text(String),
    Parts(Vec<InputPart>),
}

impl ExtractText for InputContent {
    fn extract_text(&self) -> String {
        match self {
            InputContent::Text(text) => text.clone(),
            InputContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    InputPart::InputText { text } | InputPart::OutputText { text, .. } => {
                        Some(text.as_str())
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputPart {
    InputText {
        text: String,
    },
    /// Assistant history replayed as input
    OutputText {
        text: String,
        annotations: Option<Vec<Value>>,
    },
    InputImage {
        image_url: Option<String>,
        file_id: Option<String>,
        detail: Option<String>,
    },
    InputFile {
        file_id: Option<String>,
        file_data: Option<String>,
        filename: Option<String>,
        file_url: Option<String>,
    },
    Refusal {
        refusal: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SummaryPart {
    SummaryText { text: String },
}

impl SummaryPart {
    pub fn text(&self) -> &str {
        match self {
            SummaryPart::SummaryText { text } => text,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReasoningConfig {
    /// `minimal`, `low`, `medium` or `high`
    pub effort: Option<String>,
    /// `auto`, `concise` or `detailed`
    pub summary: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextFormat {
    Text,
    JsonObject,
    JsonSchema {
        name: String,
        description: Option<String>,
        schema: Option<Value>,
        strict: Option<bool>,
    },
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TextConfig {
    pub format: Option<TextFormat>,
    pub verbosity: Option<String>,
}

/// Tools available to the model. Hosted tools this library cannot express
/// deserialize as `Unsupported` and are dropped during conversion.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesTool {
    Function {
        name: String,
        description: Option<String>,
        parameters: Option<Value>,
        strict: Option<bool>,
    },
    ImageGeneration {
        quality: Option<String>,
        size: Option<String>,
        output_format: Option<String>,
        background: Option<String>,
        output_compression: Option<u32>,
        moderation: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedResponsesToolChoice {
    #[serde(rename = "type")]
    pub choice_type: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResponsesToolChoice {
    Mode(String),
    Named(NamedResponsesToolChoice),
}

// ============================================================================
// Response Structs - Response Object
// ============================================================================

pub const RESPONSE_OBJECT: &str = "response";

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_INCOMPLETE: &str = "incomplete";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponsesErrorBody {
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncompleteDetails {
    /// `max_output_tokens` or `content_filter`
    pub reason: String,
}

/// The response object. `output` and `tools` are always present on the wire,
/// even when empty; `error` and `incomplete_details` serialize as `null`.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResponsesResponse {
    pub id: String,

    /// The object type - always "response"
    #[serde(default)]
    pub object: String,

    /// Unix timestamp (in seconds) of when this Response was created
    #[serde(default)]
    pub created_at: u64,

    #[serde(default)]
    pub status: String,

    #[serialize_always]
    pub error: Option<ResponsesErrorBody>,

    #[serialize_always]
    pub incomplete_details: Option<IncompleteDetails>,

    pub instructions: Option<String>,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub output: Vec<OutputItem>,

    #[serde(default)]
    pub tools: Vec<ResponsesTool>,

    pub tool_choice: Option<ResponsesToolChoice>,
    pub parallel_tool_calls: Option<bool>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub previous_response_id: Option<String>,
    pub reasoning: Option<ReasoningConfig>,
    pub text: Option<TextConfig>,
    pub truncation: Option<String>,
    pub store: Option<bool>,
    pub service_tier: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
    pub usage: Option<ResponsesUsage>,
}

/// Output items from the model
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        id: String,
        status: String,
        role: String,
        content: Vec<OutputContent>,
    },
    FunctionCall {
        id: String,
        status: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
    },
    Reasoning {
        id: String,
        summary: Vec<SummaryPart>,
        encrypted_content: Option<String>,
    },
    ImageGenerationCall {
        id: String,
        status: String,
        /// Base64 image
        result: Option<String>,
        output_format: Option<String>,
        size: Option<String>,
        quality: Option<String>,
        background: Option<String>,
        revised_prompt: Option<String>,
    },
}

impl OutputItem {
    pub fn id(&self) -> &str {
        match self {
            OutputItem::Message { id, .. }
            | OutputItem::FunctionCall { id, .. }
            | OutputItem::Reasoning { id, .. }
            | OutputItem::ImageGenerationCall { id, .. } => id,
        }
    }
}

/// Output content types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Value>,
    },
    Refusal {
        refusal: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InputTokensDetails {
    #[serde(default)]
    pub cached_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OutputTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u32,
}

/// Response usage statistics
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResponsesUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    pub input_tokens_details: Option<InputTokensDetails>,
    pub output_tokens_details: Option<OutputTokensDetails>,
}

// ============================================================================
// Streaming Response Events
// ============================================================================

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ResponsesStreamEvent {
    #[serde(rename = "response.created")]
    Created {
        response: ResponsesResponse,
        sequence_number: u64,
    },

    #[serde(rename = "response.in_progress")]
    InProgress {
        response: ResponsesResponse,
        sequence_number: u64,
    },

    #[serde(rename = "response.completed")]
    Completed {
        response: ResponsesResponse,
        sequence_number: u64,
    },

    #[serde(rename = "response.incomplete")]
    Incomplete {
        response: ResponsesResponse,
        sequence_number: u64,
    },

    #[serde(rename = "response.failed")]
    Failed {
        response: ResponsesResponse,
        sequence_number: u64,
    },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        output_index: u32,
        item: OutputItem,
        sequence_number: u64,
    },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        output_index: u32,
        item: OutputItem,
        sequence_number: u64,
    },

    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        item_id: String,
        output_index: u32,
        content_index: u32,
        part: OutputContent,
        sequence_number: u64,
    },

    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        item_id: String,
        output_index: u32,
        content_index: u32,
        part: OutputContent,
        sequence_number: u64,
    },

    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
        sequence_number: u64,
    },

    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        item_id: String,
        output_index: u32,
        content_index: u32,
        text: String,
        sequence_number: u64,
    },

    #[serde(rename = "response.refusal.delta")]
    RefusalDelta {
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
        sequence_number: u64,
    },

    #[serde(rename = "response.refusal.done")]
    RefusalDone {
        item_id: String,
        output_index: u32,
        content_index: u32,
        refusal: String,
        sequence_number: u64,
    },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        item_id: String,
        output_index: u32,
        delta: String,
        sequence_number: u64,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        item_id: String,
        output_index: u32,
        arguments: String,
        sequence_number: u64,
    },

    #[serde(rename = "response.reasoning_summary_part.added")]
    ReasoningSummaryPartAdded {
        item_id: String,
        output_index: u32,
        summary_index: u32,
        part: SummaryPart,
        sequence_number: u64,
    },

    #[serde(rename = "response.reasoning_summary_part.done")]
    ReasoningSummaryPartDone {
        item_id: String,
        output_index: u32,
        summary_index: u32,
        part: SummaryPart,
        sequence_number: u64,
    },

    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta {
        item_id: String,
        output_index: u32,
        summary_index: u32,
        delta: String,
        sequence_number: u64,
    },

    #[serde(rename = "response.reasoning_summary_text.done")]
    ReasoningSummaryTextDone {
        item_id: String,
        output_index: u32,
        summary_index: u32,
        text: String,
        sequence_number: u64,
    },

    #[serde(rename = "error")]
    Error {
        code: Option<String>,
        message: String,
        param: Option<String>,
        sequence_number: u64,
    },
}

impl ResponsesStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ResponsesStreamEvent::Created { .. } => "response.created",
            ResponsesStreamEvent::InProgress { .. } => "response.in_progress",
            ResponsesStreamEvent::Completed { .. } => "response.completed",
            ResponsesStreamEvent::Incomplete { .. } => "response.incomplete",
            ResponsesStreamEvent::Failed { .. } => "response.failed",
            ResponsesStreamEvent::OutputItemAdded { .. } => "response.output_item.added",
            ResponsesStreamEvent::OutputItemDone { .. } => "response.output_item.done",
            ResponsesStreamEvent::ContentPartAdded { .. } => "response.content_part.added",
            ResponsesStreamEvent::ContentPartDone { .. } => "response.content_part.done",
            ResponsesStreamEvent::OutputTextDelta { .. } => "response.output_text.delta",
            ResponsesStreamEvent::OutputTextDone { .. } => "response.output_text.done",
            ResponsesStreamEvent::RefusalDelta { .. } => "response.refusal.delta",
            ResponsesStreamEvent::RefusalDone { .. } => "response.refusal.done",
            ResponsesStreamEvent::FunctionCallArgumentsDelta { .. } => {
                "response.function_call_arguments.delta"
            }
            ResponsesStreamEvent::FunctionCallArgumentsDone { .. } => {
                "response.function_call_arguments.done"
            }
            ResponsesStreamEvent::ReasoningSummaryPartAdded { .. } => {
                "response.reasoning_summary_part.added"
            }
            ResponsesStreamEvent::ReasoningSummaryPartDone { .. } => {
                "response.reasoning_summary_part.done"
            }
            ResponsesStreamEvent::ReasoningSummaryTextDelta { .. } => {
                "response.reasoning_summary_text.delta"
            }
            ResponsesStreamEvent::ReasoningSummaryTextDone { .. } => {
                "response.reasoning_summary_text.done"
            }
            ResponsesStreamEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_items_typed_and_easy() {
        let req: ResponsesRequest = serde_json::from_value(json!({
            "model": "gpt-4.1",
            "input": [
                {"role": "user", "content": "What's the weather?"},
                {"type": "function_call", "call_id": "call_1", "name": "get_weather", "arguments": "{\"city\":\"Paris\"}"},
                {"type": "function_call_output", "call_id": "call_1", "output": "sunny"},
                {"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": "Sunny."}]}
            ]
        }))
        .unwrap();

        let ResponsesInput::Items(items) = &req.input else {
            panic!("expected items");
        };
        assert_eq!(items.len(), 4);
        assert!(matches!(items[0], InputItem::EasyMessage(_)));
        assert!(matches!(
            items[1],
            InputItem::Typed(TypedInputItem::FunctionCall { .. })
        ));
        assert!(matches!(
            items[2],
            InputItem::Typed(TypedInputItem::FunctionCallOutput { .. })
        ));
        if let InputItem::Typed(TypedInputItem::Message { content, .. }) = &items[3] {
            assert_eq!(content.extract_text(), "Sunny.");
        } else {
            panic!("expected typed message");
        }
    }

    #[test]
    fn test_hosted_tools_deserialize_as_unsupported() {
        let tools: Vec<ResponsesTool> = serde_json::from_value(json!([
            {"type": "function", "name": "f", "parameters": {"type": "object"}},
            {"type": "web_search_preview"},
            {"type": "image_generation", "quality": "low"}
        ]))
        .unwrap();
        assert!(matches!(tools[1], ResponsesTool::Unsupported));
        assert!(matches!(tools[2], ResponsesTool::ImageGeneration { .. }));
    }

    #[test]
    fn test_response_always_serializes_output_and_tools() {
        let resp = ResponsesResponse {
            id: "resp_1".to_string(),
            object: RESPONSE_OBJECT.to_string(),
            status: STATUS_IN_PROGRESS.to_string(),
            model: "gpt-4.1".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["output"], json!([]));
        assert_eq!(value["tools"], json!([]));
        assert_eq!(value["error"], Value::Null);
        assert!(value.get("usage").is_none());
    }

    #[test]
    fn test_stream_event_tags() {
        let event: ResponsesStreamEvent = serde_json::from_value(json!({
            "type": "response.output_text.delta",
            "item_id": "msg_1",
            "output_index": 0,
            "content_index": 0,
            "delta": "Hel",
            "sequence_number": 4
        }))
        .unwrap();
        assert_eq!(event.event_type(), "response.output_text.delta");

        let value = serde_json::to_value(ResponsesStreamEvent::ReasoningSummaryTextDelta {
            item_id: "rs_1".to_string(),
            output_index: 0,
            summary_index: 0,
            delta: "hmm".to_string(),
            sequence_number: 2,
        })
        .unwrap();
        assert_eq!(value["type"], "response.reasoning_summary_text.delta");
    }
}
