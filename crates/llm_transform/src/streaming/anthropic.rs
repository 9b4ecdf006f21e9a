use log::{debug, warn};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::apis::anthropic::{
    MessagesContentBlock, MessagesContentDelta, MessagesMessageDelta, MessagesRole,
    MessagesStopReason, MessagesStreamEvent, MessagesStreamMessage, MessagesUsage,
};
use crate::apis::sse::SseEvent;
use crate::canonical::{FinishReason, Message, MessageContent, Response, Role, ToolCall, Usage};
use crate::errors::{ResponseError, TransformError};
use crate::streaming::aggregator::carries_content;
use crate::streaming::StreamBuffer;
use crate::transforms::anthropic::{finish_reason_to_anthropic, stop_reason_to_canonical};
use crate::transforms::lib::{arguments_to_string, current_timestamp, generate_id};
use crate::transforms::{usage, ConvertContext};

fn status_for_error_type(error_type: &str) -> u16 {
    match error_type {
        "invalid_request_error" => 400,
        "authentication_error" => 401,
        "permission_error" => 403,
        "not_found_error" => 404,
        "request_too_large" => 413,
        "rate_limit_error" => 429,
        "overloaded_error" => 529,
        _ => 500,
    }
}

// ============================================================================
// DECODER: Anthropic message events -> canonical
// ============================================================================

pub struct MessagesStreamDecoder {
    ctx: ConvertContext,
    id: String,
    model: String,
    created: u64,
    /// Anthropic block index -> canonical tool-call index.
    tool_indices: HashMap<u32, u32>,
    usage: MessagesUsage,
    finished: bool,
}

impl MessagesStreamDecoder {
    pub fn new(ctx: ConvertContext) -> Self {
        MessagesStreamDecoder {
            ctx,
            id: String::new(),
            model: String::new(),
            created: current_timestamp(),
            tool_indices: HashMap::new(),
            usage: MessagesUsage::default(),
            finished: false,
        }
    }

    fn chunk(&self) -> Response {
        Response::chunk(self.id.clone(), self.model.clone(), self.created)
    }

    fn delta(&self, delta: Message) -> Response {
        self.chunk().with_delta(delta, None)
    }

    fn tool_delta(&self, index: u32, id: String, name: String, arguments: String) -> Response {
        self.delta(Message {
            role: Role::Assistant,
            tool_calls: Some(vec![ToolCall::new(id, name, arguments).with_index(index)]),
            ..Default::default()
        })
    }

    fn canonical_usage(&self) -> Usage {
        usage::from_anthropic(&self.usage, self.ctx.provider.cache_accounting())
    }

    fn merge_usage(&mut self, later: &MessagesUsage) {
        if later.input_tokens > 0 {
            self.usage.input_tokens = later.input_tokens;
        }
        if later.output_tokens > 0 {
            self.usage.output_tokens = later.output_tokens;
        }
        if later.cache_creation_input_tokens.is_some() {
            self.usage.cache_creation_input_tokens = later.cache_creation_input_tokens;
        }
        if later.cache_read_input_tokens.is_some() || later.cached_tokens.is_some() {
            self.usage.cache_read_input_tokens = later.cache_read_input_tokens;
            self.usage.cached_tokens = later.cached_tokens;
        }
    }

    fn decode(&mut self, event: MessagesStreamEvent) -> Result<Option<Response>, TransformError> {
        let response = match event {
            MessagesStreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.model = message.model;
                self.merge_usage(&message.usage);
                Some(self.delta(Message::default()))
            }
            MessagesStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                MessagesContentBlock::Text { text, .. } if !text.is_empty() => {
                    Some(self.delta(Message::assistant(text)))
                }
                MessagesContentBlock::Thinking {
                    thinking,
                    signature,
                } if !thinking.is_empty() || signature.is_some() => Some(self.delta(Message {
                    role: Role::Assistant,
                    reasoning_content: (!thinking.is_empty()).then_some(thinking),
                    reasoning_signature: signature,
                    ..Default::default()
                })),
                MessagesContentBlock::RedactedThinking { data } => Some(self.delta(Message {
                    role: Role::Assistant,
                    redacted_reasoning_content: Some(vec![data]),
                    ..Default::default()
                })),
                MessagesContentBlock::ToolUse { id, name, input, .. } => {
                    let tool_index = self.tool_indices.len() as u32;
                    self.tool_indices.insert(index, tool_index);
                    // Start blocks carry `{}`; real input streams as input_json_delta.
                    let arguments = match input.as_object() {
                        Some(map) if !map.is_empty() => arguments_to_string(&input),
                        _ => String::new(),
                    };
                    Some(self.tool_delta(tool_index, id, name, arguments))
                }
                _ => None,
            },
            MessagesStreamEvent::ContentBlockDelta { index, delta } => match delta {
                MessagesContentDelta::TextDelta { text } => Some(self.delta(Message::assistant(text))),
                MessagesContentDelta::ThinkingDelta { thinking } => Some(self.delta(Message {
                    role: Role::Assistant,
                    reasoning_content: Some(thinking),
                    ..Default::default()
                })),
                MessagesContentDelta::SignatureDelta { signature } => Some(self.delta(Message {
                    role: Role::Assistant,
                    reasoning_signature: Some(signature),
                    ..Default::default()
                })),
                MessagesContentDelta::InputJsonDelta { partial_json } => {
                    match self.tool_indices.get(&index) {
                        Some(tool_index) => Some(self.tool_delta(
                            *tool_index,
                            String::new(),
                            String::new(),
                            partial_json,
                        )),
                        None => {
                            warn!("input_json_delta for unknown block {}", index);
                            None
                        }
                    }
                }
                MessagesContentDelta::Unsupported => {
                    debug!("ignoring unsupported content delta at block {}", index);
                    None
                }
            },
            MessagesStreamEvent::ContentBlockStop { .. } | MessagesStreamEvent::Ping => None,
            MessagesStreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = &usage {
                    self.merge_usage(usage);
                }
                let finish_reason = delta.stop_reason.map(stop_reason_to_canonical);
                Some(
                    self.chunk()
                        .with_delta(Message::default(), finish_reason)
                        .with_usage(self.canonical_usage()),
                )
            }
            MessagesStreamEvent::MessageStop => {
                self.finished = true;
                Some(Response::done())
            }
            MessagesStreamEvent::Error { error } => {
                let status = status_for_error_type(&error.error_type);
                return Err(TransformError::Upstream(ResponseError::new(
                    status,
                    error.message,
                    error.error_type,
                )));
            }
        };
        Ok(response)
    }
}

impl StreamBuffer for MessagesStreamDecoder {
    type Input = SseEvent;
    type Output = Response;

    fn add_event(&mut self, event: SseEvent, out: &mut VecDeque<Response>) -> Result<(), TransformError> {
        if event.is_ping() || event.data.trim().is_empty() {
            return Ok(());
        }
        let parsed: MessagesStreamEvent = match serde_json::from_str(&event.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("skipping malformed Anthropic stream event: {}", e);
                return Ok(());
            }
        };
        if self.finished {
            return match parsed {
                MessagesStreamEvent::MessageStop | MessagesStreamEvent::Ping => Ok(()),
                MessagesStreamEvent::ContentBlockDelta { .. }
                | MessagesStreamEvent::ContentBlockStart { .. } => Err(TransformError::internal(
                    "Anthropic content event after message_stop",
                )),
                other => {
                    debug!("ignoring {} after message_stop", other.event_type());
                    Ok(())
                }
            };
        }
        if let Some(response) = self.decode(parsed)? {
            out.push_back(response);
        }
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
// ENCODER: canonical -> Anthropic message events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Thinking,
    /// Never stays open: its data travels in the start event.
    RedactedThinking,
    /// Canonical tool-call index.
    Tool(u32),
}

pub struct MessagesStreamEncoder {
    ctx: ConvertContext,
    id: String,
    model: String,
    started: bool,
    next_block: u32,
    open: Option<OpenBlock>,
    closed_tools: HashSet<u32>,
    stop_reason: Option<MessagesStopReason>,
    usage: Option<Usage>,
    done: bool,
}

impl MessagesStreamEncoder {
    pub fn new(ctx: ConvertContext) -> Self {
        MessagesStreamEncoder {
            ctx,
            id: String::new(),
            model: String::new(),
            started: false,
            next_block: 0,
            open: None,
            closed_tools: HashSet::new(),
            stop_reason: None,
            usage: None,
            done: false,
        }
    }

    fn emit(out: &mut VecDeque<SseEvent>, event: MessagesStreamEvent) -> Result<(), TransformError> {
        out.push_back(SseEvent::json(Some(event.event_type()), &event)?);
        Ok(())
    }

    fn wire_usage(&self) -> MessagesUsage {
        self.usage
            .as_ref()
            .map(|u| usage::to_anthropic(u, self.ctx.provider.cache_accounting()))
            .unwrap_or_default()
    }

    fn start(&mut self, chunk: &Response, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.id = if chunk.id.is_empty() || !chunk.id.starts_with("msg_") {
            generate_id("msg_")
        } else {
            chunk.id.clone()
        };
        self.model = chunk.model.clone();
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
        Self::emit(
            out,
            MessagesStreamEvent::MessageStart {
                message: MessagesStreamMessage {
                    id: self.id.clone(),
                    obj_type: "message".to_string(),
                    role: MessagesRole::Assistant,
                    content: vec![],
                    model: self.model.clone(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: self.wire_usage(),
                },
            },
        )
    }

    fn close_block(&mut self, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if let Some(block) = self.open.take() {
            if let OpenBlock::Tool(index) = block {
                self.closed_tools.insert(index);
            }
            Self::emit(
                out,
                MessagesStreamEvent::ContentBlockStop {
                    index: self.next_block - 1,
                },
            )?;
        }
        Ok(())
    }

    /// Opens `block` unless it is already the open one.
    fn open_block(
        &mut self,
        block: OpenBlock,
        content_block: MessagesContentBlock,
        out: &mut VecDeque<SseEvent>,
    ) -> Result<(), TransformError> {
        if self.open == Some(block) {
            return Ok(());
        }
        self.close_block(out)?;
        Self::emit(
            out,
            MessagesStreamEvent::ContentBlockStart {
                index: self.next_block,
                content_block,
            },
        )?;
        self.next_block += 1;
        self.open = Some(block);
        Ok(())
    }

    fn block_delta(&self, delta: MessagesContentDelta, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        Self::emit(
            out,
            MessagesStreamEvent::ContentBlockDelta {
                index: self.next_block - 1,
                delta,
            },
        )
    }

    fn encode_delta(&mut self, delta: &Message, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if let Some(reasoning) = delta.reasoning_content.as_ref().filter(|r| !r.is_empty()) {
            self.open_block(OpenBlock::Thinking, thinking_block(), out)?;
            self.block_delta(
                MessagesContentDelta::ThinkingDelta {
                    thinking: reasoning.clone(),
                },
                out,
            )?;
        }
        if let Some(signature) = &delta.reasoning_signature {
            self.open_block(OpenBlock::Thinking, thinking_block(), out)?;
            self.block_delta(
                MessagesContentDelta::SignatureDelta {
                    signature: signature.clone(),
                },
                out,
            )?;
        }
        for data in delta.redacted_reasoning_content.iter().flatten() {
            self.open_block(
                OpenBlock::RedactedThinking,
                MessagesContentBlock::RedactedThinking { data: data.clone() },
                out,
            )?;
            self.close_block(out)?;
        }
        let text = delta.content.as_ref().map(MessageContent::text).unwrap_or_default();
        if !text.is_empty() {
            self.open_block(OpenBlock::Text, MessagesContentBlock::text(""), out)?;
            self.block_delta(MessagesContentDelta::TextDelta { text }, out)?;
        }
        for (position, call) in delta.tool_calls.iter().flatten().enumerate() {
            let index = call.index.unwrap_or(position as u32);
            if self.closed_tools.contains(&index) {
                warn!("dropping arguments for already closed tool call {}", index);
                continue;
            }
            let id = if call.id.is_empty() {
                generate_id("toolu_")
            } else {
                call.id.clone()
            };
            self.open_block(
                OpenBlock::Tool(index),
                MessagesContentBlock::ToolUse {
                    id,
                    name: call.function.name.clone(),
                    input: json!({}),
                    cache_control: None,
                },
                out,
            )?;
            if !call.function.arguments.is_empty() {
                self.block_delta(
                    MessagesContentDelta::InputJsonDelta {
                        partial_json: call.function.arguments.clone(),
                    },
                    out,
                )?;
            }
        }
        Ok(())
    }

    /// Emits `message_delta` and `message_stop` once.
    fn finalize(&mut self, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if self.done {
            return Ok(());
        }
        if !self.started {
            self.start(&Response::default(), out)?;
        }
        self.close_block(out)?;
        self.done = true;
        let stop_reason = self
            .stop_reason
            .or_else(|| Some(finish_reason_to_anthropic(FinishReason::Stop)));
        Self::emit(
            out,
            MessagesStreamEvent::MessageDelta {
                delta: MessagesMessageDelta {
                    stop_reason,
                    stop_sequence: None,
                },
                usage: Some(self.wire_usage()),
            },
        )?;
        Self::emit(out, MessagesStreamEvent::MessageStop)
    }
}

fn thinking_block() -> MessagesContentBlock {
    MessagesContentBlock::Thinking {
        thinking: String::new(),
        signature: None,
    }
}

impl StreamBuffer for MessagesStreamEncoder {
    type Input = Response;
    type Output = SseEvent;

    fn add_event(&mut self, chunk: Response, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if chunk.is_done() {
            return self.finalize(out);
        }
        if self.done {
            if carries_content(&chunk) {
                return Err(TransformError::internal("chunk received after message_stop was sent"));
            }
            return Ok(());
        }
        if let Some(error) = &chunk.error {
            return Err(TransformError::Upstream(error.clone()));
        }
        self.start(&chunk, out)?;

        for choice in &chunk.choices {
            if let Some(delta) = choice.delta.as_ref().or(choice.message.as_ref()) {
                self.encode_delta(delta, out)?;
            }
            if let Some(reason) = choice.finish_reason {
                self.close_block(out)?;
                self.stop_reason = Some(finish_reason_to_anthropic(reason));
            }
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(match self.usage {
                Some(earlier) => earlier.merge(usage),
                None => usage,
            });
            // message_delta waits for usage once the stop reason is known.
            if self.stop_reason.is_some() {
                self.finalize(out)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        self.finalize(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::sse::parse_sse;
    use crate::providers::ProviderId;
    use crate::streaming::aggregator::aggregate;
    use crate::streaming::run_to_end;
    use pretty_assertions::assert_eq;

    fn ctx() -> ConvertContext {
        ConvertContext::new(ProviderId::Anthropic)
    }

    const STREAM: &str = r#"event: message_start
data: {"type":"message_start","message":{"id":"msg_01","type":"message","role":"assistant","content":[],"model":"claude-sonnet-4","stop_reason":null,"stop_sequence":null,"usage":{"input_tokens":100,"output_tokens":1,"cache_read_input_tokens":50}}}

event: content_block_start
data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}

event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"Let me check."}}

event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"sig"}}

event: content_block_stop
data: {"type":"content_block_stop","index":0}

event: ping
data: {"type":"ping"}

event: content_block_start
data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"weather","input":{}}}

event: content_block_delta
data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}

event: content_block_delta
data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"Paris\"}"}}

event: content_block_stop
data: {"type":"content_block_stop","index":1}

event: message_delta
data: {"type":"message_delta","delta":{"stop_reason":"tool_use","stop_sequence":null},"usage":{"output_tokens":30}}

event: message_stop
data: {"type":"message_stop"}

"#;

    #[test]
    fn test_decode_and_aggregate() {
        let mut decoder = MessagesStreamDecoder::new(ctx());
        let chunks = run_to_end(&mut decoder, parse_sse(STREAM)).unwrap();
        let response = aggregate(&chunks).unwrap();

        assert_eq!(response.id, "msg_01");
        let message = response.message().unwrap();
        assert_eq!(message.reasoning_content.as_deref(), Some("Let me check."));
        assert_eq!(message.reasoning_signature.as_deref(), Some("sig"));
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].function.arguments, "{\"city\":\"Paris\"}");
        assert_eq!(response.finish_reason(), Some(FinishReason::ToolCalls));

        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 150);
        assert_eq!(usage.completion_tokens, 30);
        assert_eq!(usage.cached_tokens(), 50);
    }

    #[test]
    fn test_error_event_is_upstream() {
        let mut decoder = MessagesStreamDecoder::new(ctx());
        let events = parse_sse("event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n");
        match run_to_end(&mut decoder, events) {
            Err(TransformError::Upstream(err)) => {
                assert_eq!(err.status_code, 529);
                assert_eq!(err.message(), "Overloaded");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_content_after_message_stop_is_internal() {
        let mut decoder = MessagesStreamDecoder::new(ctx());
        let events = parse_sse(concat!(
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"x\"}}\n\n",
        ));
        let err = run_to_end(&mut decoder, events).unwrap_err();
        assert!(matches!(err, TransformError::Internal(_)));
    }

    fn event_types(events: &[SseEvent]) -> Vec<&str> {
        events.iter().filter_map(|e| e.event_type()).collect()
    }

    #[test]
    fn test_encoder_block_sequence_and_deferred_message_delta() {
        let tool = Message {
            role: Role::Assistant,
            tool_calls: Some(vec![ToolCall::new("call_1", "weather", "{\"city\":").with_index(0)]),
            ..Default::default()
        };
        let more = Message {
            role: Role::Assistant,
            tool_calls: Some(vec![ToolCall::new("", "", "\"Paris\"}").with_index(0)]),
            ..Default::default()
        };
        let chunks = vec![
            Response::chunk("chatcmpl-1", "gpt-4o", 1).with_delta(Message::assistant("Checking"), None),
            Response::chunk("chatcmpl-1", "gpt-4o", 1).with_delta(tool, None),
            Response::chunk("chatcmpl-1", "gpt-4o", 1).with_delta(more, None),
            Response::chunk("chatcmpl-1", "gpt-4o", 1)
                .with_delta(Message::default(), Some(FinishReason::ToolCalls)),
            Response::chunk("chatcmpl-1", "gpt-4o", 1).with_usage(Usage::new(12, 8)),
            Response::done(),
        ];
        let mut encoder = MessagesStreamEncoder::new(ctx());
        let events = run_to_end(&mut encoder, chunks).unwrap();
        assert_eq!(
            event_types(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        let start: serde_json::Value = serde_json::from_str(&events[0].data).unwrap();
        assert_eq!(start["message"]["content"], json!([]));
        let delta: serde_json::Value = serde_json::from_str(&events[8].data).unwrap();
        assert_eq!(delta["delta"]["stop_reason"], json!("tool_use"));
        assert_eq!(delta["usage"]["output_tokens"], json!(8));
    }

    #[test]
    fn test_redacted_thinking_after_open_thinking_block() {
        let thinking = Message {
            role: Role::Assistant,
            reasoning_content: Some("plan".to_string()),
            ..Default::default()
        };
        let redacted = Message {
            role: Role::Assistant,
            redacted_reasoning_content: Some(vec!["SECRET".to_string()]),
            ..Default::default()
        };
        let chunks = vec![
            Response::chunk("msg_1", "claude-sonnet-4", 1).with_delta(thinking, None),
            Response::chunk("msg_1", "claude-sonnet-4", 1).with_delta(redacted, None),
            Response::chunk("msg_1", "claude-sonnet-4", 1).with_delta(Message::assistant("hi"), Some(FinishReason::Stop)),
            Response::done(),
        ];
        let mut encoder = MessagesStreamEncoder::new(ctx());
        let events = run_to_end(&mut encoder, chunks).unwrap();

        let starts: Vec<serde_json::Value> = events
            .iter()
            .filter(|e| e.event_type() == Some("content_block_start"))
            .map(|e| serde_json::from_str(&e.data).unwrap())
            .collect();
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[0]["content_block"]["type"], json!("thinking"));
        assert_eq!(
            starts[1]["content_block"],
            json!({"type": "redacted_thinking", "data": "SECRET"})
        );
        assert_eq!(starts[1]["index"], json!(1));
        assert_eq!(starts[2]["content_block"]["type"], json!("text"));

        let mut decoder = MessagesStreamDecoder::new(ctx());
        let decoded = run_to_end(&mut decoder, events).unwrap();
        let response = aggregate(&decoded).unwrap();
        let message = response.message().unwrap();
        assert_eq!(message.reasoning_content.as_deref(), Some("plan"));
        assert_eq!(message.redacted_reasoning_content, Some(vec!["SECRET".to_string()]));
        assert_eq!(message.text(), "hi");
    }
}
