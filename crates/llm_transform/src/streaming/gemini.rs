use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::apis::gemini::{Candidate, Content, GenerateContentResponse, Part, ROLE_MODEL};
use crate::apis::sse::SseEvent;
use crate::canonical::{FinishReason, Message, Response, Role, ToolCall, Usage};
use crate::errors::TransformError;
use crate::streaming::aggregator::carries_content;
use crate::streaming::openai::embedded_error;
use crate::streaming::StreamBuffer;
use crate::transforms::gemini::{
    finish_reason_to_canonical, finish_reason_to_gemini, model_content_to_canonical, model_parts,
};
use crate::transforms::lib::{current_timestamp, generate_id};
use crate::transforms::usage;

// ============================================================================
// DECODER: streamGenerateContent chunks -> canonical
// ============================================================================

/// Gemini streams whole parts, so every function call arrives complete and
/// gets the next canonical tool index.
#[derive(Debug, Default)]
pub struct GeminiStreamDecoder {
    id: String,
    model: String,
    created: u64,
    next_tool_index: u32,
    pending_ids: HashMap<String, VecDeque<String>>,
    finished: bool,
    done_sent: bool,
}

impl GeminiStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn adopt_identity(&mut self, chunk: &GenerateContentResponse) {
        if self.id.is_empty() {
            self.id = chunk.response_id.clone().unwrap_or_else(|| generate_id("gen-"));
            self.model = chunk.model_version.clone().unwrap_or_default();
            self.created = current_timestamp();
        }
    }

    fn decode(&mut self, chunk: GenerateContentResponse, out: &mut VecDeque<Response>) -> Result<(), TransformError> {
        let blocked = chunk
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.get("blockReason"))
            .is_some();
        let chunk_usage = chunk.usage_metadata.as_ref().map(usage::from_gemini);
        let candidate = chunk.candidates.into_iter().next().unwrap_or_default();
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

        if self.finished {
            if !parts.is_empty() {
                return Err(TransformError::internal(
                    "Gemini content chunk after the finish reason",
                ));
            }
            if let Some(usage) = chunk_usage {
                out.push_back(Response::chunk(self.id.clone(), self.model.clone(), self.created).with_usage(usage));
            }
            return Ok(());
        }

        let mut delta = model_content_to_canonical(parts, &mut self.pending_ids);
        if let Some(calls) = delta.tool_calls.as_mut() {
            for call in calls {
                call.index = Some(self.next_tool_index);
                self.next_tool_index += 1;
            }
        }

        let finish_reason = match candidate.finish_reason.as_deref() {
            Some(reason) => Some(finish_reason_to_canonical(reason, self.next_tool_index > 0)),
            None if blocked => Some(FinishReason::ContentFilter),
            None => None,
        };
        let has_delta = delta.content.is_some()
            || delta.reasoning_content.is_some()
            || delta.reasoning_signature.is_some()
            || delta.has_tool_calls();
        if !has_delta && finish_reason.is_none() {
            debug!("skipping Gemini chunk without content");
            return Ok(());
        }

        let mut response = Response::chunk(self.id.clone(), self.model.clone(), self.created)
            .with_delta(delta, finish_reason);
        // usageMetadata is cumulative; only the terminal figure is kept.
        if finish_reason.is_some() {
            response.usage = chunk_usage;
            self.finished = true;
        }
        out.push_back(response);
        Ok(())
    }
}

impl StreamBuffer for GeminiStreamDecoder {
    type Input = SseEvent;
    type Output = Response;

    fn add_event(&mut self, event: SseEvent, out: &mut VecDeque<Response>) -> Result<(), TransformError> {
        if event.is_done() || event.data.trim().is_empty() {
            return Ok(());
        }
        if let Some(error) = embedded_error(&event.data) {
            return Err(TransformError::Upstream(error));
        }
        let chunk: GenerateContentResponse = match serde_json::from_str(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("skipping malformed Gemini stream chunk: {}", e);
                return Ok(());
            }
        };
        self.adopt_identity(&chunk);
        self.decode(chunk, out)
    }

    fn finish(&mut self, out: &mut VecDeque<Response>) -> Result<(), TransformError> {
        if !self.done_sent {
            self.done_sent = true;
            self.finished = true;
            out.push_back(Response::done());
        }
        Ok(())
    }
}

// ============================================================================
// ENCODER: canonical -> streamGenerateContent chunks
// ============================================================================

/// Text and thoughts are forwarded as they arrive. Function calls and the
/// thought signature are held back for the final chunk, which also carries
/// the finish reason and usage.
#[derive(Debug, Default)]
pub struct GeminiStreamEncoder {
    id: String,
    model: String,
    tool_calls: BTreeMap<u32, ToolCall>,
    signature: Option<String>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    done: bool,
}

impl GeminiStreamEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn chunk(&self, parts: Vec<Part>) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some(ROLE_MODEL.to_string()),
                    parts,
                }),
                index: Some(0),
                ..Default::default()
            }],
            model_version: (!self.model.is_empty()).then(|| self.model.clone()),
            response_id: (!self.id.is_empty()).then(|| self.id.clone()),
            ..Default::default()
        }
    }

    fn emit(&self, out: &mut VecDeque<SseEvent>, chunk: &GenerateContentResponse) -> Result<(), TransformError> {
        out.push_back(SseEvent::json(None, chunk)?);
        Ok(())
    }

    fn encode_delta(&mut self, delta: &Message, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if let Some(reasoning) = delta.reasoning_content.as_ref().filter(|r| !r.is_empty()) {
            let part = Part {
                text: Some(reasoning.clone()),
                thought: Some(true),
                ..Default::default()
            };
            self.emit(out, &self.chunk(vec![part]))?;
        }
        let text = Message {
            content: delta.content.clone(),
            ..Default::default()
        };
        let parts = model_parts(&text);
        if !parts.is_empty() {
            self.emit(out, &self.chunk(parts))?;
        }
        if let Some(signature) = &delta.reasoning_signature {
            self.signature.get_or_insert_with(String::new).push_str(signature);
        }
        for (position, call) in delta.tool_calls.iter().flatten().enumerate() {
            let index = call.index.unwrap_or(position as u32);
            let entry = self
                .tool_calls
                .entry(index)
                .or_insert_with(|| ToolCall::new("", "", ""));
            if entry.id.is_empty() {
                entry.id = call.id.clone();
            }
            if entry.function.name.is_empty() {
                entry.function.name = call.function.name.clone();
            }
            entry.function.arguments.push_str(&call.function.arguments);
        }
        Ok(())
    }

    fn finalize(&mut self, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if self.done {
            return Ok(());
        }
        self.done = true;

        let held = Message {
            role: Role::Assistant,
            tool_calls: (!self.tool_calls.is_empty()).then(|| self.tool_calls.values().cloned().collect()),
            ..Default::default()
        };
        let mut parts = model_parts(&held);
        if let Some(signature) = self.signature.take() {
            match parts.first_mut() {
                Some(first) => first.thought_signature = Some(signature),
                None => parts.push(Part {
                    text: Some(String::new()),
                    thought_signature: Some(signature),
                    ..Default::default()
                }),
            }
        }

        let mut chunk = self.chunk(parts);
        if let Some(candidate) = chunk.candidates.first_mut() {
            candidate.finish_reason = Some(
                finish_reason_to_gemini(self.finish_reason.unwrap_or(FinishReason::Stop)).to_string(),
            );
        }
        chunk.usage_metadata = self.usage.as_ref().map(usage::to_gemini);
        self.emit(out, &chunk)
    }
}

impl StreamBuffer for GeminiStreamEncoder {
    type Input = Response;
    type Output = SseEvent;

    fn add_event(&mut self, chunk: Response, out: &mut VecDeque<SseEvent>) -> Result<(), TransformError> {
        if chunk.is_done() {
            return self.finalize(out);
        }
        if self.done {
            if carries_content(&chunk) {
                return Err(TransformError::internal("chunk received after the final Gemini chunk"));
            }
            return Ok(());
        }
        if let Some(error) = &chunk.error {
            return Err(TransformError::Upstream(error.clone()));
        }
        if self.id.is_empty() {
            self.id = if chunk.id.is_empty() {
                generate_id("gen-")
            } else {
                chunk.id.clone()
            };
            self.model = chunk.model.clone();
        }

        for choice in &chunk.choices {
            if let Some(delta) = choice.delta.as_ref().or(choice.message.as_ref()) {
                self.encode_delta(delta, out)?;
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
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
