use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

use crate::canonical::message::Message;
use crate::canonical::usage::Usage;
use crate::errors::ResponseError;

pub const CHAT_COMPLETION_OBJECT: &str = "chat.completion";
pub const CHAT_COMPLETION_CHUNK_OBJECT: &str = "chat.completion.chunk";
/// `object` of the end-of-stream sentinel.
pub const DONE_OBJECT: &str = "[DONE]";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    FunctionCall,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::FunctionCall => "function_call",
        }
    }

    /// Maps OpenAI-style finish strings; unknown vendor values fall back to `stop`.
    pub fn from_openai(value: &str) -> Self {
        match value {
            "length" => FinishReason::Length,
            "tool_calls" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            "function_call" => FinishReason::FunctionCall,
            _ => FinishReason::Stop,
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Choice {
    pub index: u32,
    /// Set on non-streaming responses.
    pub message: Option<Message>,
    /// Set on streaming chunks.
    pub delta: Option<Message>,
    pub finish_reason: Option<FinishReason>,
    pub logprobs: Option<Value>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Response {
    pub id: String,
    pub object: String,
    pub model: String,
    pub created: u64,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
    pub error: Option<ResponseError>,
    pub system_fingerprint: Option<String>,
    pub service_tier: Option<String>,
}

impl Response {
    /// A non-streaming response with exactly one choice.
    pub fn completion(
        id: impl Into<String>,
        model: impl Into<String>,
        created: u64,
        message: Message,
        finish_reason: Option<FinishReason>,
        usage: Option<Usage>,
    ) -> Self {
        Response {
            id: id.into(),
            object: CHAT_COMPLETION_OBJECT.to_string(),
            model: model.into(),
            created,
            choices: vec![Choice {
                index: 0,
                message: Some(message),
                delta: None,
                finish_reason,
                logprobs: None,
            }],
            usage,
            ..Default::default()
        }
    }

    /// A streaming chunk; `choices` may be empty for usage-only chunks.
    pub fn chunk(id: impl Into<String>, model: impl Into<String>, created: u64) -> Self {
        Response {
            id: id.into(),
            object: CHAT_COMPLETION_CHUNK_OBJECT.to_string(),
            model: model.into(),
            created,
            ..Default::default()
        }
    }

    pub fn with_delta(mut self, delta: Message, finish_reason: Option<FinishReason>) -> Self {
        self.choices.push(Choice {
            index: 0,
            message: None,
            delta: Some(delta),
            finish_reason,
            logprobs: None,
        });
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// The end-of-stream sentinel.
    pub fn done() -> Self {
        Response {
            object: DONE_OBJECT.to_string(),
            ..Default::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.object == DONE_OBJECT
    }

    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices.first()
    }

    pub fn message(&self) -> Option<&Message> {
        self.first_choice().and_then(|c| c.message.as_ref())
    }

    pub fn delta(&self) -> Option<&Message> {
        self.first_choice().and_then(|c| c.delta.as_ref())
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.choices.iter().find_map(|c| c.finish_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_sentinel() {
        let done = Response::done();
        assert!(done.is_done());
        assert!(!Response::chunk("id", "m", 0).is_done());
    }

    #[test]
    fn test_completion_has_single_message_choice() {
        let resp = Response::completion(
            "chatcmpl-1",
            "gpt-4o",
            1,
            Message::assistant("hi"),
            Some(FinishReason::Stop),
            Some(Usage::new(3, 1)),
        );
        assert_eq!(resp.choices.len(), 1);
        assert!(resp.delta().is_none());
        assert_eq!(resp.message().map(|m| m.text()), Some("hi".to_string()));
        assert_eq!(resp.finish_reason(), Some(FinishReason::Stop));
    }

    #[test]
    fn test_finish_reason_from_openai() {
        assert_eq!(FinishReason::from_openai("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_openai("eos"), FinishReason::Stop);
    }
}
