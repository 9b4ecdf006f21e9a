use log::debug;
use std::collections::BTreeMap;

use crate::canonical::{
    ContentPart, FinishReason, Message, MessageContent, Response, Role, ToolCall, Usage,
};
use crate::errors::{ResponseError, TransformError};
use crate::transforms::lib::repair_tool_arguments;

/// Folds canonical stream chunks into one non-streaming [`Response`].
///
/// Only choice 0 is aggregated; deltas for other choice indices are dropped.
#[derive(Debug, Default)]
pub struct ResponseAggregator {
    id: String,
    model: String,
    created: u64,
    text: String,
    /// Non-text content parts, in arrival order.
    media: Vec<ContentPart>,
    reasoning: String,
    signature: Option<String>,
    redacted: Vec<String>,
    refusal: Option<String>,
    /// Keyed by the stream's tool-call index.
    tool_calls: BTreeMap<u32, ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    error: Option<ResponseError>,
    system_fingerprint: Option<String>,
    service_tier: Option<String>,
    finalized: Option<Response>,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    pub fn push(&mut self, chunk: &Response) -> Result<(), TransformError> {
        if chunk.is_done() {
            return Ok(());
        }
        if self.finalized.is_some() {
            if carries_content(chunk) {
                return Err(TransformError::internal(
                    "stream chunk received after the response was finalized",
                ));
            }
            debug!("ignoring empty chunk after finalize");
            return Ok(());
        }

        if self.id.is_empty() && !chunk.id.is_empty() {
            self.id = chunk.id.clone();
        }
        if self.model.is_empty() && !chunk.model.is_empty() {
            self.model = chunk.model.clone();
        }
        if self.created == 0 {
            self.created = chunk.created;
        }
        if chunk.system_fingerprint.is_some() {
            self.system_fingerprint = chunk.system_fingerprint.clone();
        }
        if chunk.service_tier.is_some() {
            self.service_tier = chunk.service_tier.clone();
        }
        if chunk.error.is_some() {
            self.error = chunk.error.clone();
        }

        for choice in &chunk.choices {
            if choice.index != 0 {
                debug!("dropping delta for choice {}", choice.index);
                continue;
            }
            if let Some(delta) = choice.delta.as_ref().or(choice.message.as_ref()) {
                self.push_delta(delta);
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
        }
        Ok(())
    }

    fn push_delta(&mut self, delta: &Message) {
        match &delta.content {
            Some(MessageContent::Text(text)) => self.text.push_str(text),
            Some(MessageContent::Parts(parts)) => {
                for part in parts {
                    match part {
                        ContentPart::Text { text, .. } => self.text.push_str(text),
                        other => self.media.push(other.clone()),
                    }
                }
            }
            None => {}
        }
        if let Some(reasoning) = &delta.reasoning_content {
            self.reasoning.push_str(reasoning);
        }
        if let Some(signature) = &delta.reasoning_signature {
            self.signature
                .get_or_insert_with(String::new)
                .push_str(signature);
        }
        self.redacted
            .extend(delta.redacted_reasoning_content.iter().flatten().cloned());
        if let Some(refusal) = &delta.refusal {
            self.refusal.get_or_insert_with(String::new).push_str(refusal);
        }
        for (position, call) in delta.tool_calls.iter().flatten().enumerate() {
            let index = call.index.unwrap_or(position as u32);
            let entry = self
                .tool_calls
                .entry(index)
                .or_insert_with(|| ToolCall::new("", "", "").with_index(index));
            if entry.id.is_empty() && !call.id.is_empty() {
                entry.id = call.id.clone();
            }
            if entry.function.name.is_empty() && !call.function.name.is_empty() {
                entry.function.name = call.function.name.clone();
            }
            entry.function.arguments.push_str(&call.function.arguments);
        }
    }

    /// Builds the final response. Later calls return the same response.
    pub fn finalize(&mut self) -> Response {
        if let Some(response) = &self.finalized {
            return response.clone();
        }

        let mut message = Message {
            role: Role::Assistant,
            ..Default::default()
        };
        if !self.media.is_empty() {
            let mut parts = Vec::with_capacity(self.media.len() + 1);
            if !self.text.is_empty() {
                parts.push(ContentPart::text(self.text.clone()));
            }
            parts.extend(self.media.iter().cloned());
            message.content = Some(MessageContent::Parts(parts));
        } else if !self.text.is_empty() || self.tool_calls.is_empty() {
            message.content = Some(MessageContent::Text(self.text.clone()));
        }
        if !self.reasoning.is_empty() {
            message.reasoning_content = Some(self.reasoning.clone());
        }
        message.reasoning_signature = self.signature.clone();
        if !self.redacted.is_empty() {
            message.redacted_reasoning_content = Some(self.redacted.clone());
        }
        message.refusal = self.refusal.clone();
        if !self.tool_calls.is_empty() {
            message.tool_calls = Some(
                self.tool_calls
                    .values()
                    .map(|call| {
                        let mut call = call.clone();
                        call.index = None;
                        call.function.arguments = repair_tool_arguments(&call.function.arguments);
                        call
                    })
                    .collect(),
            );
        }

        let mut response = Response::completion(
            self.id.clone(),
            self.model.clone(),
            self.created,
            message,
            self.finish_reason,
            self.usage,
        );
        response.error = self.error.clone();
        response.system_fingerprint = self.system_fingerprint.clone();
        response.service_tier = self.service_tier.clone();
        self.finalized = Some(response.clone());
        response
    }
}

/// Whether a chunk carries text, reasoning or tool-call content.
pub(crate) fn carries_content(chunk: &Response) -> bool {
    chunk.choices.iter().any(|choice| {
        choice.delta.as_ref().or(choice.message.as_ref()).is_some_and(|delta| {
            delta.content.as_ref().is_some_and(|c| !c.is_empty())
                || delta.reasoning_content.as_ref().is_some_and(|r| !r.is_empty())
                || delta.has_tool_calls()
        })
    })
}

/// Aggregates a whole canonical stream.
pub fn aggregate<'a>(chunks: impl IntoIterator<Item = &'a Response>) -> Result<Response, TransformError> {
    let mut aggregator = ResponseAggregator::new();
    for chunk in chunks {
        aggregator.push(chunk)?;
    }
    Ok(aggregator.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_chunk(text: &str) -> Response {
        Response::chunk("chatcmpl-1", "gpt-4o", 1700000000).with_delta(Message::assistant(text), None)
    }

    fn tool_delta(index: u32, id: &str, name: &str, args: &str) -> Response {
        let delta = Message {
            role: Role::Assistant,
            tool_calls: Some(vec![ToolCall::new(id, name, args).with_index(index)]),
            ..Default::default()
        };
        Response::chunk("chatcmpl-1", "gpt-4o", 1700000000).with_delta(delta, None)
    }

    #[test]
    fn test_five_text_deltas_aggregate() {
        let mut chunks: Vec<Response> = ["Hel", "lo", ", ", "wor", "ld"].iter().map(|t| text_chunk(t)).collect();
        chunks.push(
            Response::chunk("chatcmpl-1", "gpt-4o", 1700000000)
                .with_delta(Message::default(), Some(FinishReason::Stop)),
        );
        chunks.push(Response::chunk("chatcmpl-1", "gpt-4o", 1700000000).with_usage(Usage::new(10, 5)));
        chunks.push(Response::done());

        let response = aggregate(&chunks).unwrap();
        assert_eq!(response.id, "chatcmpl-1");
        assert_eq!(response.message().unwrap().text(), "Hello, world");
        assert_eq!(response.finish_reason(), Some(FinishReason::Stop));
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_tool_call_arguments_concatenate_by_index() {
        let chunks = vec![
            tool_delta(0, "call_a", "weather", "{\"ci"),
            tool_delta(1, "call_b", "time", ""),
            tool_delta(0, "", "", "ty\":\"Paris\"}"),
            tool_delta(1, "", "", "{}"),
        ];
        let response = aggregate(&chunks).unwrap();
        let calls = response.message().unwrap().tool_calls.clone().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.arguments, "{\"city\":\"Paris\"}");
        assert_eq!(calls[1].function.name, "time");
        assert_eq!(calls[1].index, None);
        assert!(response.message().unwrap().content.is_none());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut aggregator = ResponseAggregator::new();
        aggregator.push(&text_chunk("hi")).unwrap();
        let first = aggregator.finalize();
        aggregator.push(&Response::done()).unwrap();
        let second = aggregator.finalize();
        assert_eq!(first, second);
    }

    #[test]
    fn test_content_after_finalize_is_internal_error() {
        let mut aggregator = ResponseAggregator::new();
        aggregator.push(&text_chunk("hi")).unwrap();
        aggregator.finalize();
        let err = aggregator.push(&text_chunk("late")).unwrap_err();
        assert!(matches!(err, TransformError::Internal(_)));
    }

    #[test]
    fn test_redacted_blocks_accumulate_and_other_choices_are_dropped() {
        let redacted = |data: &str| {
            Response::chunk("msg_1", "claude-sonnet-4", 1).with_delta(
                Message {
                    role: Role::Assistant,
                    redacted_reasoning_content: Some(vec![data.to_string()]),
                    ..Default::default()
                },
                None,
            )
        };
        let mut second_choice = text_chunk(" ignored");
        second_choice.choices[0].index = 1;
        let chunks = vec![redacted("first"), redacted("second"), text_chunk("kept"), second_choice];

        let response = aggregate(&chunks).unwrap();
        assert_eq!(response.choices.len(), 1);
        let message = response.message().unwrap();
        assert_eq!(
            message.redacted_reasoning_content,
            Some(vec!["first".to_string(), "second".to_string()])
        );
        assert_eq!(message.text(), "kept");
    }

    #[test]
    fn test_image_parts_survive_aggregation() {
        let image = Message::assistant(MessageContent::Parts(vec![ContentPart::image_url(
            "data:image/png;base64,AAAA",
        )]));
        let chunks = vec![
            text_chunk("Here it is"),
            Response::chunk("chatcmpl-1", "gpt-4o", 1700000000).with_delta(image, None),
        ];
        let response = aggregate(&chunks).unwrap();
        assert_eq!(
            response.message().unwrap().content,
            Some(MessageContent::Parts(vec![
                ContentPart::text("Here it is"),
                ContentPart::image_url("data:image/png;base64,AAAA"),
            ]))
        );
    }
}
