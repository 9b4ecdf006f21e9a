use log::{debug, warn};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::apis::openai_responses::{
    OutputContent, OutputItem, ResponsesResponse, ResponsesStreamEvent, SummaryPart,
    RESPONSE_OBJECT, STATUS_COMPLETED, STATUS_INCOMPLETE, STATUS_IN_PROGRESS,
};
use crate::apis::sse::SseEvent;
use crate::canonical::{FinishReason, Message, MessageContent, Response, Role, ToolCall, Usage};
use crate::errors::{ResponseError, TransformError};
use crate::streaming::aggregator::carries_content;
use crate::streaming::StreamBuffer;
use crate::transforms::lib::{current_timestamp, generate_id};
use crate::transforms::responses::{
    failure_to_error, finish_reason_to_status, generated_image_part, status_to_finish_reason,
};
use crate::transforms::usage;

// ============================================================================
// DECODER: Responses events -> canonical
// ============================================================================

#[derive(Debug, Default)]
pub struct ResponsesStreamDecoder {
    id: String,
    model: String,
    created: u64,
    /// Output index of a function_call item -> canonical tool-call index.
    tool_indices: HashMap<u32, u32>,
    /// Function calls whose arguments already arrived as deltas.
    arguments_seen: HashSet<u32>,
    finished: bool,
}

impl ResponsesStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn adopt_identity(&mut self, response: &ResponsesResponse) {
        if self.id.is_empty() {
            self.id = response.id.clone();
            self.model = response.model.clone();
            self.created = if response.created_at == 0 {
                current_timestamp()
            } else {
                response.created_at
            };
        }
    }

    fn delta(&self, delta: Message) -> Response {
        Response::chunk(self.id.clone(), self.model.clone(), self.created).with_delta(delta, None)
    }

    fn tool_delta(&self, index: u32, id: String, name: String, arguments: String) -> Response {
        self.delta(Message {
            role: Role::Assistant,
            tool_calls: Some(vec![ToolCall::new(id, name, arguments).with_index(index)]),
            ..Default::default()
        })
    }

    fn reasoning_delta(&self, text: String) -> Response {
        self.delta(Message {
            role: Role::Assistant,
            reasoning_content: Some(text),
            ..Default::default()
        })
    }

    fn decode(&mut self, event: ResponsesStreamEvent, out: &mut VecDeque<Response>) -> Result<(), TransformError> {
        match event {
            ResponsesStreamEvent::Created { response, .. } => {
                self.adopt_identity(&response);
                out.push_back(self.delta(Message::default()));
            }
            ResponsesStreamEvent::InProgress { response, .. } => self.adopt_identity(&response),
            ResponsesStreamEvent::OutputItemAdded {
                output_index,
                item:
                    OutputItem::FunctionCall {
                        call_id,
                        name,
                        arguments,
                        ..
                    },
                ..
            } => {
                let index = self.tool_indices.len() as u32;
                self.tool_indices.insert(output_index, index);
                if !arguments.is_empty() {
                    self.arguments_seen.insert(output_index);
                }
                out.push_back(self.tool_delta(index, call_id, name, arguments));
            }
            ResponsesStreamEvent::OutputItemDone { output_index, item, .. } => match item {
                OutputItem::Reasoning {
                    encrypted_content: Some(signature),
                    ..
                } => out.push_back(self.delta(Message {
                    role: Role::Assistant,
                    reasoning_signature: Some(signature),
                    ..Default::default()
                })),
                OutputItem::FunctionCall { arguments, .. } => {
                    self.flush_arguments(output_index, arguments, out)
                }
                OutputItem::ImageGenerationCall {
                    result: Some(result),
                    output_format,
                    ..
                } => out.push_back(self.delta(Message::assistant(MessageContent::Parts(vec![
                    generated_image_part(&result, output_format.as_deref()),
                ])))),
                other => debug!("output item {} done", other.id()),
            },
            ResponsesStreamEvent::OutputTextDelta { delta, .. } => {
                out.push_back(self.delta(Message::assistant(delta)))
            }
            ResponsesStreamEvent::RefusalDelta { delta, .. } => out.push_back(self.delta(Message {
                role: Role::Assistant,
                refusal: Some(delta),
                ..Default::default()
            })),
            ResponsesStreamEvent::FunctionCallArgumentsDelta {
                output_index,
                delta,
                ..
            } => match self.tool_indices.get(&output_index) {
                Some(index) => {
                    let response = self.tool_delta(*index, String::new(), String::new(), delta);
                    self.arguments_seen.insert(output_index);
                    out.push_back(response);
                }
                None => warn!("arguments delta for unknown output item {}", output_index),
            },
            ResponsesStreamEvent::FunctionCallArgumentsDone {
                output_index,
                arguments,
                ..
            } => self.flush_arguments(output_index, arguments, out),
            ResponsesStreamEvent::ReasoningSummaryPartAdded { summary_index, .. } if summary_index > 0 => {
                out.push_back(self.reasoning_delta("\n\n".to_string()))
            }
            ResponsesStreamEvent::ReasoningSummaryTextDelta { delta, .. } => {
                out.push_back(self.reasoning_delta(delta))
            }
            ResponsesStreamEvent::Completed { response, .. }
            | ResponsesStreamEvent::Incomplete { response, .. } => {
                self.adopt_identity(&response);
                let has_tool_calls = !self.tool_indices.is_empty();
                let finish_reason = status_to_finish_reason(
                    &response.status,
                    response.incomplete_details.as_ref(),
                    has_tool_calls,
                );
                let mut chunk = Response::chunk(self.id.clone(), self.model.clone(), self.created)
                    .with_delta(Message::default(), Some(finish_reason));
                chunk.usage = response.usage.as_ref().map(usage::from_responses);
                chunk.service_tier = response.service_tier;
                out.push_back(chunk);
                out.push_back(Response::done());
                self.finished = true;
            }
            ResponsesStreamEvent::Failed { response, .. } => {
                return Err(TransformError::Upstream(failure_to_error(response.error.as_ref())));
            }
            ResponsesStreamEvent::Error { code, message, .. } => {
                let error = ResponseError::new(500, message, "api_error");
                return Err(TransformError::Upstream(match code {
                    Some(code) => error.with_code(code),
                    None => error,
                }));
            }
            other => debug!("ignoring {}", other.event_type()),
        }
        Ok(())
    }

    /// Arguments from a `done` event, used only when no deltas were streamed.
    fn flush_arguments(&mut self, output_index: u32, arguments: String, out: &mut VecDeque<Response>) {
        if self.arguments_seen.contains(&output_index) || arguments.is_empty() {
            return;
        }
        if let Some(index) = self.tool_indices.get(&output_index) {
            out.push_back(self.tool_delta(*index, String::new(), String::new(), arguments));
            self.arguments_seen.insert(output_index);
        }
    }
}

impl StreamBuffer for ResponsesStreamDecoder {
    type Input = SseEvent;
    type Output = Response;

    fn add_event(&mut self, event: SseEvent, out: &mut VecDeque<Response>) -> Result<(), TransformError> {
        if event.is_done() || event.data.trim().is_empty() {
            return Ok(());
        }
        let parsed: ResponsesStreamEvent = match serde_json::from_str(&event.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("skipping malformed Responses stream event: {}", e);
                return Ok(());
            }
        };
        if self.finished {
            return match parsed {
                ResponsesStreamEvent::OutputTextDelta { .. }
                | ResponsesStreamEvent::FunctionCallArgumentsDelta { .. }
                | ResponsesStreamEvent::ReasoningSummaryTextDelta { .. }
                | ResponsesStreamEvent::OutputItemAdded { .. } => Err(TransformError::internal(
                    "Responses content event after the response completed",
                )),
                _ => Ok(()),
            };
        }
        self.decode(parsed, out)
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
// ENCODER: canonical -> Responses events
// ============================================================================

#[derive(Debug)]
enum OpenItem {
    Message {
        id: String,
        output_index: u32,
        text: String,
    },
    Reasoning {
        id: String,
        output_index: u32,
        text: String,
        summary_open: bool,
        signature: Option<String>,
    },
    FunctionCall {
        id: String,
        output_index: u32,
        tool_index: u32,
        call_id: String,
        name: String,
        arguments: String,
    },
}

#[derive(Debug, Default)]
pub struct ResponsesStreamEncoder {
    id: String,
    model: String,
    created_at: u64,
    sequence: u64,
    started: bool,
    next_output_index: u32,
    open: Option<OpenItem>,
    output: Vec<OutputItem>,
    closed_tools: HashSet<u32>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    done: bool,
}

impl ResponsesStreamEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }

    fn emit(out: &mut VecDeque<SseEvent>, event: ResponsesStreamEvent) -> Result<(), TransformError> {
        out.push_back(SseEvent::json(Some(event.event_type()), &event)?);
        Ok(())
    }

    fn snapshot(&self, status: &str) -> ResponsesResponse {
        ResponsesResponse {
            id: self.id.clone(),
            object: RESPONSE_OBJECT.to_string(),
            created_at: self.created_at,
            status: status.to_string(),
            model: self.model.clone(),
            output: self.output.clone(),
            metadata: Some(HashMap::new()),
            ..Default::default()
        }
    }

    fn start(&mut self, chunk: &Response, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.id = if chunk.id.starts_with("resp_") {
            chunk.id.clone()
        } else {
            generate_id("resp_")
        };
        self.model = chunk.model.clone();
        self.created_at = if chunk.created == 0 {
            current_timestamp()
        } else {
            chunk.created
        };
        let sequence_number = self.next_sequence();
        Self::emit(
            out,
            ResponsesStreamEvent::Created {
                response: self.snapshot(STATUS_IN_PROGRESS),
                sequence_number,
            },
        )?;
        let sequence_number = self.next_sequence();
        Self::emit(
            out,
            ResponsesStreamEvent::InProgress {
                response: self.snapshot(STATUS_IN_PROGRESS),
                sequence_number,
            },
        )
    }

    fn add_item(&mut self, output_index: u32, item: OutputItem, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        let sequence_number = self.next_sequence();
        Self::emit(
            out,
            ResponsesStreamEvent::OutputItemAdded {
                output_index,
                item,
                sequence_number,
            },
        )
    }

    fn open_message(&mut self, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if matches!(self.open, Some(OpenItem::Message { .. })) {
            return Ok(());
        }
        self.close_item(out)?;
        let id = generate_id("msg_");
        let output_index = self.next_output_index;
        self.next_output_index += 1;
        self.add_item(
            output_index,
            OutputItem::Message {
                id: id.clone(),
                status: STATUS_IN_PROGRESS.to_string(),
                role: Role::Assistant.as_str().to_string(),
                content: vec![],
            },
            out,
        )?;
        let sequence_number = self.next_sequence();
        Self::emit(
            out,
            ResponsesStreamEvent::ContentPartAdded {
                item_id: id.clone(),
                output_index,
                content_index: 0,
                part: OutputContent::OutputText {
                    text: String::new(),
                    annotations: vec![],
                },
                sequence_number,
            },
        )?;
        self.open = Some(OpenItem::Message {
            id,
            output_index,
            text: String::new(),
        });
        Ok(())
    }

    fn open_reasoning(&mut self, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if matches!(self.open, Some(OpenItem::Reasoning { .. })) {
            return Ok(());
        }
        self.close_item(out)?;
        let id = generate_id("rs_");
        let output_index = self.next_output_index;
        self.next_output_index += 1;
        self.add_item(
            output_index,
            OutputItem::Reasoning {
                id: id.clone(),
                summary: vec![],
                encrypted_content: None,
            },
            out,
        )?;
        self.open = Some(OpenItem::Reasoning {
            id,
            output_index,
            text: String::new(),
            summary_open: false,
            signature: None,
        });
        Ok(())
    }

    fn open_function_call(
        &mut self,
        tool_index: u32,
        call: &ToolCall,
        out: &mut VecDeque<SseEvent>,
    ) -> Result<(), TransformError> {
        if matches!(self.open, Some(OpenItem::FunctionCall { tool_index: open, .. }) if open == tool_index) {
            return Ok(());
        }
        self.close_item(out)?;
        let id = generate_id("fc_");
        let call_id = if call.id.is_empty() {
            generate_id("call_")
        } else {
            call.id.clone()
        };
        let output_index = self.next_output_index;
        self.next_output_index += 1;
        self.add_item(
            output_index,
            OutputItem::FunctionCall {
                id: id.clone(),
                status: Some(STATUS_IN_PROGRESS.to_string()),
                call_id: call_id.clone(),
                name: call.function.name.clone(),
                arguments: String::new(),
            },
            out,
        )?;
        self.open = Some(OpenItem::FunctionCall {
            id,
            output_index,
            tool_index,
            call_id,
            name: call.function.name.clone(),
            arguments: String::new(),
        });
        Ok(())
    }

    /// Emits the done events of the open item with its full content.
    fn close_item(&mut self, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        let (output_index, item) = match open {
            OpenItem::Message {
                id,
                output_index,
                text,
            } => {
                let part = OutputContent::OutputText {
                    text: text.clone(),
                    annotations: vec![],
                };
                let sequence_number = self.next_sequence();
                Self::emit(
                    out,
                    ResponsesStreamEvent::OutputTextDone {
                        item_id: id.clone(),
                        output_index,
                        content_index: 0,
                        text,
                        sequence_number,
                    },
                )?;
                let sequence_number = self.next_sequence();
                Self::emit(
                    out,
                    ResponsesStreamEvent::ContentPartDone {
                        item_id: id.clone(),
                        output_index,
                        content_index: 0,
                        part: part.clone(),
                        sequence_number,
                    },
                )?;
                let item = OutputItem::Message {
                    id,
                    status: STATUS_COMPLETED.to_string(),
                    role: Role::Assistant.as_str().to_string(),
                    content: vec![part],
                };
                (output_index, item)
            }
            OpenItem::Reasoning {
                id,
                output_index,
                text,
                summary_open,
                signature,
            } => {
                let mut summary = vec![];
                if summary_open {
                    let part = SummaryPart::SummaryText { text: text.clone() };
                    let sequence_number = self.next_sequence();
                    Self::emit(
                        out,
                        ResponsesStreamEvent::ReasoningSummaryTextDone {
                            item_id: id.clone(),
                            output_index,
                            summary_index: 0,
                            text,
                            sequence_number,
                        },
                    )?;
                    let sequence_number = self.next_sequence();
                    Self::emit(
                        out,
                        ResponsesStreamEvent::ReasoningSummaryPartDone {
                            item_id: id.clone(),
                            output_index,
                            summary_index: 0,
                            part: part.clone(),
                            sequence_number,
                        },
                    )?;
                    summary.push(part);
                }
                let item = OutputItem::Reasoning {
                    id,
                    summary,
                    encrypted_content: signature,
                };
                (output_index, item)
            }
            OpenItem::FunctionCall {
                id,
                output_index,
                tool_index,
                call_id,
                name,
                arguments,
            } => {
                self.closed_tools.insert(tool_index);
                let sequence_number = self.next_sequence();
                Self::emit(
                    out,
                    ResponsesStreamEvent::FunctionCallArgumentsDone {
                        item_id: id.clone(),
                        output_index,
                        arguments: arguments.clone(),
                        sequence_number,
                    },
                )?;
                let item = OutputItem::FunctionCall {
                    id,
                    status: Some(STATUS_COMPLETED.to_string()),
                    call_id,
                    name,
                    arguments,
                };
                (output_index, item)
            }
        };
        let sequence_number = self.next_sequence();
        Self::emit(
            out,
            ResponsesStreamEvent::OutputItemDone {
                output_index,
                item: item.clone(),
                sequence_number,
            },
        )?;
        self.output.push(item);
        Ok(())
    }

    fn encode_delta(&mut self, delta: &Message, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if let Some(reasoning) = delta.reasoning_content.as_ref().filter(|r| !r.is_empty()) {
            self.open_reasoning(out)?;
            let needs_part = matches!(self.open, Some(OpenItem::Reasoning { summary_open: false, .. }));
            let part_sequence = needs_part.then(|| self.next_sequence());
            let sequence_number = self.next_sequence();
            if let Some(OpenItem::Reasoning {
                id,
                output_index,
                text,
                summary_open,
                ..
            }) = &mut self.open
            {
                if let Some(sequence_number) = part_sequence {
                    *summary_open = true;
                    Self::emit(
                        out,
                        ResponsesStreamEvent::ReasoningSummaryPartAdded {
                            item_id: id.clone(),
                            output_index: *output_index,
                            summary_index: 0,
                            part: SummaryPart::SummaryText {
                                text: String::new(),
                            },
                            sequence_number,
                        },
                    )?;
                }
                text.push_str(reasoning);
                Self::emit(
                    out,
                    ResponsesStreamEvent::ReasoningSummaryTextDelta {
                        item_id: id.clone(),
                        output_index: *output_index,
                        summary_index: 0,
                        delta: reasoning.clone(),
                        sequence_number,
                    },
                )?;
            }
        }
        if let Some(signature) = &delta.reasoning_signature {
            self.open_reasoning(out)?;
            if let Some(OpenItem::Reasoning { signature: slot, .. }) = &mut self.open {
                slot.get_or_insert_with(String::new).push_str(signature);
            }
        }

        let text = delta.content.as_ref().map(MessageContent::text).unwrap_or_default();
        if !text.is_empty() {
            self.open_message(out)?;
            let sequence_number = self.next_sequence();
            if let Some(OpenItem::Message {
                id,
                output_index,
                text: buffer,
            }) = &mut self.open
            {
                buffer.push_str(&text);
                Self::emit(
                    out,
                    ResponsesStreamEvent::OutputTextDelta {
                        item_id: id.clone(),
                        output_index: *output_index,
                        content_index: 0,
                        delta: text,
                        sequence_number,
                    },
                )?;
            }
        }

        for (position, call) in delta.tool_calls.iter().flatten().enumerate() {
            let tool_index = call.index.unwrap_or(position as u32);
            if self.closed_tools.contains(&tool_index) {
                warn!("dropping arguments for already closed function call {}", tool_index);
                continue;
            }
            self.open_function_call(tool_index, call, out)?;
            if call.function.arguments.is_empty() {
                continue;
            }
            let sequence_number = self.next_sequence();
            if let Some(OpenItem::FunctionCall {
                id,
                output_index,
                arguments,
                ..
            }) = &mut self.open
            {
                arguments.push_str(&call.function.arguments);
                Self::emit(
                    out,
                    ResponsesStreamEvent::FunctionCallArgumentsDelta {
                        item_id: id.clone(),
                        output_index: *output_index,
                        delta: call.function.arguments.clone(),
                        sequence_number,
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Closes the open item and emits the terminal response event once.
    fn finalize(&mut self, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if self.done {
            return Ok(());
        }
        if !self.started {
            self.start(&Response::default(), out)?;
        }
        self.close_item(out)?;
        self.done = true;

        let (status, incomplete_details) = finish_reason_to_status(self.finish_reason);
        let mut response = self.snapshot(status);
        response.incomplete_details = incomplete_details;
        response.usage = self.usage.as_ref().map(usage::to_responses);
        let sequence_number = self.next_sequence();
        let event = if status == STATUS_INCOMPLETE {
            ResponsesStreamEvent::Incomplete {
                response,
                sequence_number,
            }
        } else {
            ResponsesStreamEvent::Completed {
                response,
                sequence_number,
            }
        };
        Self::emit(out, event)
    }
}

impl StreamBuffer for ResponsesStreamEncoder {
    type Input = Response;
    type Output = SseEvent;

    fn add_event(&mut self, chunk: Response, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if chunk.is_done() {
            return self.finalize(out);
        }
        if self.done {
            if carries_content(&chunk) {
                return Err(TransformError::internal("chunk received after response.completed was sent"));
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
                self.close_item(out)?;
                self.finish_reason = Some(reason);
            }
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(match self.usage {
                Some(earlier) => earlier.merge(usage),
                None => usage,
            });
            if self.finish_reason.is_some() {
                self.finalize(out)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        self.finalize(out)
    }
}
