use log::warn;
use serde_json::Value;
use std::collections::VecDeque;

use crate::apis::openai::{ChatCompletionChunk, ChatDelta, ChunkChoice, FunctionCallDelta, ToolCallDelta};
use crate::apis::sse::SseEvent;
use crate::canonical::response::CHAT_COMPLETION_CHUNK_OBJECT;
use crate::canonical::{Choice, FinishReason, Message, MessageContent, Response, Role, ToolCall};
use crate::errors::{ResponseError, TransformError};
use crate::streaming::aggregator::carries_content;
use crate::streaming::StreamBuffer;
use crate::transforms::lib::{current_timestamp, generate_id};
use crate::transforms::usage;

/// An `{"error": ...}` payload embedded in a stream.
pub(crate) fn embedded_error(data: &str) -> Option<ResponseError> {
    let value: Value = serde_json::from_str(data).ok()?;
    let error = value.get("error")?;
    if error.is_null() {
        return None;
    }
    let status = error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .filter(|code| (400..600).contains(code))
        .unwrap_or(500);
    Some(ResponseError::from_upstream(status, data.as_bytes()))
}

// ============================================================================
// DECODER: chat.completion.chunk -> canonical
// ============================================================================

#[derive(Debug, Default)]
pub struct ChatCompletionsStreamDecoder {
    finished: bool,
}

impl ChatCompletionsStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

fn delta_to_canonical(delta: ChatDelta) -> Message {
    let reasoning_content = delta.reasoning_text().map(str::to_string);
    Message {
        role: Role::Assistant,
        content: delta.content.map(MessageContent::Text),
        reasoning_content,
        refusal: delta.refusal,
        tool_calls: delta.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|call| {
                    let function = call.function.unwrap_or_default();
                    ToolCall::new(
                        call.id.unwrap_or_default(),
                        function.name.unwrap_or_default(),
                        function.arguments.unwrap_or_default(),
                    )
                    .with_index(call.index)
                })
                .collect()
        }),
        ..Default::default()
    }
}

pub fn chunk_to_canonical(chunk: ChatCompletionChunk) -> Response {
    Response {
        id: chunk.id,
        object: CHAT_COMPLETION_CHUNK_OBJECT.to_string(),
        model: chunk.model,
        created: chunk.created,
        choices: chunk
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: None,
                delta: Some(delta_to_canonical(choice.delta)),
                finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_openai),
                logprobs: choice.logprobs,
            })
            .collect(),
        usage: chunk.usage.as_ref().map(usage::from_openai),
        error: None,
        system_fingerprint: chunk.system_fingerprint,
        service_tier: chunk.service_tier,
    }
}

impl StreamBuffer for ChatCompletionsStreamDecoder {
    type Input = SseEvent;
    type Output = Response;

    fn add_event(&mut self, event: SseEvent, out: &mut VecDeque<Response>) -> Result<(), TransformError> {
        if event.is_done() {
            if !self.finished {
                self.finished = true;
                out.push_back(Response::done());
            }
            return Ok(());
        }
        if event.data.trim().is_empty() {
            return Ok(());
        }
        if let Some(error) = embedded_error(&event.data) {
            return Err(TransformError::Upstream(error));
        }
        let chunk: ChatCompletionChunk = match serde_json::from_str(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("skipping malformed chat completion chunk: {}", e);
                return Ok(());
            }
        };
        let response = chunk_to_canonical(chunk);
        if self.finished {
            if carries_content(&response) {
                return Err(TransformError::internal("chat completion chunk after [DONE]"));
            }
            return Ok(());
        }
        out.push_back(response);
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<Response>) -> Result<(), TransformError> {
        if !self.finished {
            self.finished = true;
            out.push_back(Response::done());
        }
        Ok(())
    }
}

// ============================================================================
// ENCODER: canonical -> chat.completion.chunk
// ============================================================================

#[derive(Debug, Default)]
pub struct ChatCompletionsStreamEncoder {
    id: String,
    model: String,
    created: u64,
    role_sent: bool,
    finish_seen: bool,
    done: bool,
}

impl ChatCompletionsStreamEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn adopt_identity(&mut self, chunk: &Response) {
        if self.id.is_empty() {
            self.id = if chunk.id.is_empty() {
                generate_id("chatcmpl-")
            } else {
                chunk.id.clone()
            };
            self.model = chunk.model.clone();
            self.created = if chunk.created == 0 {
                current_timestamp()
            } else {
                chunk.created
            };
        }
    }

    fn delta_from_canonical(&mut self, delta: &Message) -> ChatDelta {
        let role = (!self.role_sent).then_some(Role::Assistant);
        self.role_sent = true;
        ChatDelta {
            role,
            content: delta.content.as_ref().map(MessageContent::text),
            reasoning_content: delta.reasoning_content.clone(),
            reasoning: None,
            tool_calls: delta.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .enumerate()
                    .map(|(position, call)| ToolCallDelta {
                        index: call.index.unwrap_or(position as u32),
                        id: (!call.id.is_empty()).then(|| call.id.clone()),
                        call_type: (!call.id.is_empty()).then(|| call.call_type.clone()),
                        function: Some(FunctionCallDelta {
                            name: (!call.function.name.is_empty())
                                .then(|| call.function.name.clone()),
                            arguments: Some(call.function.arguments.clone()),
                        }),
                    })
                    .collect()
            }),
            refusal: delta.refusal.clone(),
        }
    }

    fn finalize(&mut self, out: &mut VecDeque<SseEvent>) {
        if !self.done {
            self.done = true;
            out.push_back(SseEvent::done());
        }
    }
}

impl StreamBuffer for ChatCompletionsStreamEncoder {
    type Input = Response;
    type Output = SseEvent;

    fn add_event(&mut self, chunk: Response, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if chunk.is_done() {
            self.finalize(out);
            return Ok(());
        }
        if self.done {
            if carries_content(&chunk) {
                return Err(TransformError::internal("chunk received after [DONE] was sent"));
            }
            return Ok(());
        }
        if let Some(error) = &chunk.error {
            return Err(TransformError::Upstream(error.clone()));
        }
        self.adopt_identity(&chunk);

        let choices: Vec<ChunkChoice> = chunk
            .choices
            .iter()
            .map(|choice| {
                let delta = choice
                    .delta
                    .as_ref()
                    .or(choice.message.as_ref())
                    .map(|delta| self.delta_from_canonical(delta))
                    .unwrap_or_default();
                ChunkChoice {
                    index: choice.index,
                    delta,
                    finish_reason: choice.finish_reason.map(|r| r.as_str().to_string()),
                    logprobs: choice.logprobs.clone(),
                }
            })
            .collect();
        if chunk.finish_reason().is_some() {
            self.finish_seen = true;
        }
        let terminal_usage = chunk.usage.is_some() && self.finish_seen;

        let wire = ChatCompletionChunk {
            id: self.id.clone(),
            object: CHAT_COMPLETION_CHUNK_OBJECT.to_string(),
            created: self.created,
            model: self.model.clone(),
            choices,
            usage: chunk.usage.as_ref().map(usage::to_openai),
            system_fingerprint: chunk.system_fingerprint,
            service_tier: chunk.service_tier,
        };
        out.push_back(SseEvent::json(None, &wire)?);
        if terminal_usage {
            self.finalize(out);
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        self.finalize(out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::sse::parse_sse;
    use crate::canonical::Usage;
    use crate::streaming::aggregator::aggregate;
    use crate::streaming::run_to_end;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const STREAM: &str = "data: {\"id\":\"chatcmpl-9\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"},\"finish_reason\":null}]}\n\n\
data: {\"id\":\"chatcmpl-9\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"weather\",\"arguments\":\"\"}}]},\"finish_reason\":null}]}\n\n\
data: {\"id\":\"chatcmpl-9\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"city\\\":\"}}]},\"finish_reason\":null}]}\n\n\
data: not json\n\n\
data: {\"id\":\"chatcmpl-9\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"Paris\\\"}\"}}]},\"finish_reason\":null}]}\n\n\
data: {\"id\":\"chatcmpl-9\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n\
data: {\"id\":\"chatcmpl-9\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[],\"usage\":{\"prompt_tokens\":20,\"completion_tokens\":7,\"total_tokens\":27}}\n\n\
data: [DONE]\n\n";

    #[test]
    fn test_decode_skips_malformed_and_aggregates_tool_call() {
        let mut decoder = ChatCompletionsStreamDecoder::new();
        let chunks = run_to_end(&mut decoder, parse_sse(STREAM)).unwrap();
        assert!(chunks.last().unwrap().is_done());
        assert_eq!(chunks.iter().filter(|c| c.is_done()).count(), 1);

        let response = aggregate(&chunks).unwrap();
        let calls = response.message().unwrap().tool_calls.clone().unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.arguments, "{\"city\":\"Paris\"}");
        assert_eq!(response.finish_reason(), Some(FinishReason::ToolCalls));
        assert_eq!(response.usage.unwrap().total_tokens, 27);
    }

    #[test]
    fn test_embedded_error_short_circuits() {
        let mut decoder = ChatCompletionsStreamDecoder::new();
        let events = parse_sse("data: {\"error\":{\"message\":\"overloaded\",\"type\":\"server_error\"}}\n\n");
        let err = run_to_end(&mut decoder, events).unwrap_err();
        match err {
            TransformError::Upstream(e) => assert_eq!(e.message(), "overloaded"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_encoder_keeps_empty_choices_on_usage_chunk() {
        let chunks = vec![
            Response::chunk("chatcmpl-1", "gpt-4o", 5).with_delta(Message::assistant("Hi"), None),
            Response::chunk("chatcmpl-1", "gpt-4o", 5)
                .with_delta(Message::default(), Some(FinishReason::Stop)),
            Response::chunk("chatcmpl-1", "gpt-4o", 5).with_usage(Usage::new(3, 1)),
            Response::done(),
        ];
        let mut encoder = ChatCompletionsStreamEncoder::new();
        let events = run_to_end(&mut encoder, chunks).unwrap();
        assert_eq!(events.len(), 4);
        assert!(events[3].is_done());

        let first: Value = serde_json::from_str(&events[0].data).unwrap();
        assert_eq!(first["choices"][0]["delta"], json!({"role": "assistant", "content": "Hi"}));
        let usage: Value = serde_json::from_str(&events[2].data).unwrap();
        assert_eq!(usage["choices"], json!([]));
        assert_eq!(usage["usage"]["total_tokens"], json!(4));
    }

    #[test]
    fn test_encoder_rejects_content_after_done() {
        let mut encoder = ChatCompletionsStreamEncoder::new();
        let mut out = VecDeque::new();
        encoder.add_event(Response::done(), &mut out).unwrap();
        encoder.add_event(Response::done(), &mut out).unwrap();
        assert_eq!(out.len(), 1);
        let late = Response::chunk("x", "m", 1).with_delta(Message::assistant("late"), None);
        assert!(matches!(
            encoder.add_event(late, &mut out),
            Err(TransformError::Internal(_))
        ));
    }
}
