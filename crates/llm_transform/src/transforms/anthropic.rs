use log::{debug, warn};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

use crate::apis::anthropic::{
    MessagesContentBlock, MessagesImageSource, MessagesMessage, MessagesMessageContent,
    MessagesRequest, MessagesResponse, MessagesRole, MessagesStopReason, MessagesSystemPrompt,
    MessagesTool, MessagesToolChoice, MessagesToolChoiceType, ThinkingConfig, ToolResultContent,
};
use crate::canonical::metadata::{
    ANTHROPIC_CONTAINER, ANTHROPIC_SYSTEM_AS_BLOCKS, ANTHROPIC_THINKING_TYPE,
};
use crate::canonical::request::{TOOL_CHOICE_AUTO, TOOL_CHOICE_NONE, TOOL_CHOICE_REQUIRED};
use crate::canonical::{
    ContentPart, FinishReason, Message, MessageContent, Request, Response, Role, Tool, ToolCall,
    ToolChoice, TransformerMetadata,
};
use crate::errors::TransformError;
use crate::transforms::lib::*;
use crate::transforms::{usage, ConvertContext, DEFAULT_MAX_TOKENS};

const THINKING_ENABLED: &str = "enabled";
const THINKING_DISABLED: &str = "disabled";
/// Smallest thinking budget the Messages API accepts.
const MIN_THINKING_BUDGET: u32 = 1024;
const USER_ID_KEY: &str = "user_id";

// ============================================================================
// REQUEST: ANTHROPIC -> CANONICAL
// ============================================================================

pub fn request_to_canonical(req: MessagesRequest) -> Result<Request, TransformError> {
    let max_tokens = req.max_tokens.ok_or_else(|| {
        TransformError::InvalidRequest("max_tokens is required".to_string())
    })?;

    let mut metadata = TransformerMetadata::new();
    let mut messages = Vec::new();

    if let Some(system) = req.system {
        match system {
            MessagesSystemPrompt::Single(text) => messages.push(Message::system(text)),
            MessagesSystemPrompt::Blocks(blocks) => {
                metadata.insert(&ANTHROPIC_SYSTEM_AS_BLOCKS, true);
                let parts: Vec<ContentPart> = blocks
                    .into_iter()
                    .filter_map(|block| match block {
                        MessagesContentBlock::Text {
                            text,
                            cache_control,
                        } => Some(ContentPart::Text {
                            text,
                            cache_control,
                        }),
                        _ => None,
                    })
                    .collect();
                messages.push(Message::system(MessageContent::Parts(parts)));
            }
        }
    }

    for (turn, message) in req.messages.into_iter().enumerate() {
        messages.extend(message_to_canonical(message, turn as u32));
    }

    let mut reasoning_budget = None;
    if let Some(thinking) = req.thinking {
        if thinking.thinking_type == THINKING_ENABLED {
            reasoning_budget = thinking.budget_tokens;
        } else {
            if thinking.thinking_type == THINKING_DISABLED {
                reasoning_budget = Some(0);
            }
            metadata.insert(&ANTHROPIC_THINKING_TYPE, thinking.thinking_type);
        }
    }
    if let Some(container) = req.container {
        metadata.insert(&ANTHROPIC_CONTAINER, container);
    }

    let user = req
        .metadata
        .as_ref()
        .and_then(|m| m.get(USER_ID_KEY))
        .and_then(Value::as_str)
        .map(str::to_string);

    let (tool_choice, parallel_tool_calls) = tool_choice_to_canonical(req.tool_choice);

    let request = Request {
        model: req.model,
        messages,
        tools: req.tools.map(tools_to_canonical),
        tool_choice,
        parallel_tool_calls,
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        max_tokens: Some(max_tokens),
        stop: req.stop_sequences,
        user,
        stream: req.stream,
        reasoning_budget,
        service_tier: req.service_tier,
        transformer_metadata: metadata,
        ..Default::default()
    };
    request.validate()?;
    Ok(request)
}

/// One Anthropic turn can expand into several canonical messages: tool
/// results become `tool` messages sharing `message_index = turn`.
fn message_to_canonical(message: MessagesMessage, turn: u32) -> Vec<Message> {
    let blocks = match message.content {
        MessagesMessageContent::Single(text) => {
            let role = match message.role {
                MessagesRole::User => Role::User,
                MessagesRole::Assistant => Role::Assistant,
            };
            return vec![Message::new(role, text)];
        }
        MessagesMessageContent::Blocks(blocks) => blocks,
    };

    match message.role {
        MessagesRole::User => user_blocks_to_canonical(blocks, turn),
        MessagesRole::Assistant => vec![assistant_blocks_to_canonical(blocks)],
    }
}

fn user_blocks_to_canonical(blocks: Vec<MessagesContentBlock>, turn: u32) -> Vec<Message> {
    let mut tool_results = Vec::new();
    let mut parts = Vec::new();

    for block in blocks {
        match block {
            MessagesContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                let text = content.map(|c| c.extract_text()).unwrap_or_default();
                let mut result = Message::tool(tool_use_id, text);
                result.message_index = Some(turn);
                tool_results.push(result);
            }
            MessagesContentBlock::Text {
                text,
                cache_control,
            } => parts.push(ContentPart::Text {
                text,
                cache_control,
            }),
            MessagesContentBlock::Image {
                source,
                cache_control,
            } => parts.push(ContentPart::ImageUrl {
                image_url: crate::canonical::ImageUrl {
                    url: image_source_to_url(source),
                    detail: None,
                },
                cache_control,
            }),
            MessagesContentBlock::Document { .. } => {
                warn!("dropping document block: no canonical equivalent")
            }
            other => debug!("ignoring user block {:?}", other),
        }
    }

    let mut messages = tool_results;
    if !parts.is_empty() {
        let content = match parts.as_slice() {
            [ContentPart::Text {
                text,
                cache_control: None,
            }] => MessageContent::Text(text.clone()),
            _ => MessageContent::Parts(parts),
        };
        messages.push(Message::user(content));
    }
    messages
}

fn assistant_blocks_to_canonical(blocks: Vec<MessagesContentBlock>) -> Message {
    let mut message = Message {
        role: Role::Assistant,
        ..Default::default()
    };
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            MessagesContentBlock::Text { text: t, .. } => text.push_str(&t),
            MessagesContentBlock::Thinking {
                thinking,
                signature,
            } => {
                reasoning.push_str(&thinking);
                if signature.is_some() {
                    message.reasoning_signature = signature;
                }
            }
            MessagesContentBlock::RedactedThinking { data } => message
                .redacted_reasoning_content
                .get_or_insert_with(Vec::new)
                .push(data),
            MessagesContentBlock::ToolUse {
                id, name, input, ..
            } => tool_calls.push(ToolCall::new(id, name, arguments_to_string(&input))),
            other => debug!("ignoring assistant block {:?}", other),
        }
    }

    if !text.is_empty() {
        message.content = Some(MessageContent::Text(text));
    }
    if !reasoning.is_empty() {
        message.reasoning_content = Some(reasoning);
    }
    if !tool_calls.is_empty() {
        message.tool_calls = Some(tool_calls);
    }
    message
}

fn image_source_to_url(source: MessagesImageSource) -> String {
    match source {
        MessagesImageSource::Base64 { media_type, data } => to_data_url(&media_type, &data),
        MessagesImageSource::Url { url } => url,
    }
}

fn tools_to_canonical(tools: Vec<MessagesTool>) -> Vec<Tool> {
    tools
        .into_iter()
        .filter_map(|tool| {
            if !tool.is_custom() {
                warn!(
                    "dropping server tool `{}` ({:?})",
                    tool.name, tool.tool_type
                );
                return None;
            }
            let parameters = tool.input_schema.unwrap_or_else(empty_schema);
            let mut canonical = Tool::function(tool.name, tool.description, parameters);
            canonical.cache_control = tool.cache_control;
            Some(canonical)
        })
        .collect()
}

fn tool_choice_to_canonical(
    choice: Option<MessagesToolChoice>,
) -> (Option<ToolChoice>, Option<bool>) {
    let Some(choice) = choice else {
        return (None, None);
    };
    let parallel = choice.disable_parallel_tool_use.map(|disable| !disable);
    let canonical = match choice.kind {
        MessagesToolChoiceType::Auto => ToolChoice::mode(TOOL_CHOICE_AUTO),
        MessagesToolChoiceType::Any => ToolChoice::mode(TOOL_CHOICE_REQUIRED),
        MessagesToolChoiceType::None => ToolChoice::mode(TOOL_CHOICE_NONE),
        MessagesToolChoiceType::Tool => match choice.name {
            Some(name) => ToolChoice::named(name),
            None => ToolChoice::mode(TOOL_CHOICE_REQUIRED),
        },
    };
    (Some(canonical), parallel)
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

// ============================================================================
// REQUEST: CANONICAL -> ANTHROPIC
// ============================================================================

pub fn request_from_canonical(
    req: &Request,
    ctx: &ConvertContext,
) -> Result<MessagesRequest, TransformError> {
    req.validate()?;
    let metadata = &req.transformer_metadata;

    let mut max_tokens = req.output_token_limit().unwrap_or(DEFAULT_MAX_TOKENS);
    let thinking = match metadata.get(&ANTHROPIC_THINKING_TYPE) {
        Some(thinking_type) => Some(ThinkingConfig {
            thinking_type,
            budget_tokens: None,
        }),
        None => ctx
            .reasoning
            .resolve_budget(req.reasoning_budget, req.reasoning_effort)
            .filter(|budget| *budget > 0)
            .map(|budget| {
                let budget = budget.max(MIN_THINKING_BUDGET);
                if budget >= max_tokens {
                    debug!(
                        "raising max_tokens from {} to fit thinking budget {}",
                        max_tokens, budget
                    );
                    max_tokens = budget.saturating_add(DEFAULT_MAX_TOKENS);
                }
                ThinkingConfig {
                    thinking_type: THINKING_ENABLED.to_string(),
                    budget_tokens: Some(budget),
                }
            }),
    };

    let tools: Vec<MessagesTool> = req
        .function_tools()
        .filter_map(|tool| {
            let function = tool.function.as_ref()?;
            Some(MessagesTool {
                name: function.name.clone(),
                description: function.description.clone(),
                input_schema: Some(function.parameters.clone().unwrap_or_else(empty_schema)),
                tool_type: None,
                cache_control: tool.cache_control.clone(),
            })
        })
        .collect();

    let tool_choice = if tools.is_empty() {
        None
    } else {
        tool_choice_from_canonical(req.tool_choice.as_ref(), req.parallel_tool_calls)
    };

    let request_metadata = req.user.as_ref().map(|user| {
        HashMap::from([(USER_ID_KEY.to_string(), Value::String(user.clone()))])
    });

    Ok(MessagesRequest {
        model: req.model.clone(),
        messages: messages_from_canonical(&req.messages),
        max_tokens: Some(max_tokens),
        system: system_from_canonical(&req.messages, metadata.flag(&ANTHROPIC_SYSTEM_AS_BLOCKS)),
        metadata: request_metadata,
        container: metadata.get(&ANTHROPIC_CONTAINER),
        service_tier: req.service_tier.clone(),
        thinking,
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        stream: req.stream,
        stop_sequences: req.stop.clone(),
        tools: (!tools.is_empty()).then_some(tools),
        tool_choice,
    })
}

fn system_from_canonical(messages: &[Message], as_blocks: bool) -> Option<MessagesSystemPrompt> {
    let parts: Vec<ContentPart> = messages
        .iter()
        .filter(|msg| msg.role.is_instruction())
        .filter_map(|msg| msg.content.as_ref())
        .flat_map(MessageContent::to_parts)
        .collect();
    if parts.is_empty() {
        return None;
    }

    let has_cache_control = parts.iter().any(|part| {
        matches!(
            part,
            ContentPart::Text {
                cache_control: Some(_),
                ..
            }
        )
    });
    if as_blocks || has_cache_control {
        let blocks = parts
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text {
                    text,
                    cache_control,
                } => Some(MessagesContentBlock::Text {
                    text,
                    cache_control,
                }),
                _ => None,
            })
            .collect();
        return Some(MessagesSystemPrompt::Blocks(blocks));
    }

    let text = parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    Some(MessagesSystemPrompt::Single(text))
}

fn messages_from_canonical(messages: &[Message]) -> Vec<MessagesMessage> {
    let mut out: Vec<MessagesMessage> = Vec::new();
    let mut processed: HashSet<usize> = HashSet::new();

    for (i, msg) in messages.iter().enumerate() {
        if processed.contains(&i) || msg.role.is_instruction() {
            continue;
        }
        let converted = match msg.role {
            Role::Tool => {
                // Consecutive results of one turn go back as a single user turn.
                let mut blocks = Vec::new();
                for (j, candidate) in messages.iter().enumerate().skip(i) {
                    if candidate.role != Role::Tool || candidate.message_index != msg.message_index
                    {
                        break;
                    }
                    processed.insert(j);
                    blocks.push(tool_result_block(candidate));
                }
                MessagesMessage {
                    role: MessagesRole::User,
                    content: MessagesMessageContent::Blocks(blocks),
                }
            }
            Role::Assistant => match assistant_from_canonical(msg) {
                Some(converted) => converted,
                None => {
                    debug!("skipping empty assistant message at {}", i);
                    continue;
                }
            },
            _ => MessagesMessage {
                role: MessagesRole::User,
                content: user_content_from_canonical(msg),
            },
        };
        processed.insert(i);
        push_coalesced(&mut out, converted);
    }
    out
}

/// The Messages API wants alternating roles, so adjacent same-role turns merge.
fn push_coalesced(out: &mut Vec<MessagesMessage>, next: MessagesMessage) {
    match out.last_mut() {
        Some(last) if last.role == next.role => {
            let mut blocks = into_blocks(std::mem::replace(
                &mut last.content,
                MessagesMessageContent::Blocks(Vec::new()),
            ));
            blocks.extend(into_blocks(next.content));
            last.content = MessagesMessageContent::Blocks(blocks);
        }
        _ => out.push(next),
    }
}

fn into_blocks(content: MessagesMessageContent) -> Vec<MessagesContentBlock> {
    match content {
        MessagesMessageContent::Single(text) if text.is_empty() => vec![],
        MessagesMessageContent::Single(text) => vec![MessagesContentBlock::text(text)],
        MessagesMessageContent::Blocks(blocks) => blocks,
    }
}

fn tool_result_block(msg: &Message) -> MessagesContentBlock {
    MessagesContentBlock::ToolResult {
        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
        is_error: None,
        content: Some(ToolResultContent::Text(msg.text())),
        cache_control: None,
    }
}

fn user_content_from_canonical(msg: &Message) -> MessagesMessageContent {
    match &msg.content {
        None => MessagesMessageContent::Single(String::new()),
        Some(MessageContent::Text(text)) => MessagesMessageContent::Single(text.clone()),
        Some(MessageContent::Parts(parts)) => MessagesMessageContent::Blocks(
            parts.iter().filter_map(content_part_to_block).collect(),
        ),
    }
}

fn content_part_to_block(part: &ContentPart) -> Option<MessagesContentBlock> {
    match part {
        ContentPart::Text {
            text,
            cache_control,
        } => Some(MessagesContentBlock::Text {
            text: text.clone(),
            cache_control: cache_control.clone(),
        }),
        ContentPart::ImageUrl {
            image_url,
            cache_control,
        } => {
            let source = match parse_data_url(&image_url.url) {
                Some((media_type, data)) => MessagesImageSource::Base64 { media_type, data },
                None => MessagesImageSource::Url {
                    url: image_url.url.clone(),
                },
            };
            Some(MessagesContentBlock::Image {
                source,
                cache_control: cache_control.clone(),
            })
        }
        ContentPart::InputAudio { .. } => {
            warn!("dropping audio input: not supported by the Messages API");
            None
        }
    }
}

fn assistant_from_canonical(msg: &Message) -> Option<MessagesMessage> {
    let blocks = assistant_blocks(msg);
    if blocks.is_empty() {
        return None;
    }
    let content = match blocks.as_slice() {
        [MessagesContentBlock::Text {
            text,
            cache_control: None,
        }] => MessagesMessageContent::Single(text.clone()),
        _ => MessagesMessageContent::Blocks(blocks),
    };
    Some(MessagesMessage {
        role: MessagesRole::Assistant,
        content,
    })
}

/// Thinking first, then text, then tool calls: the order the API emits them.
fn assistant_blocks(msg: &Message) -> Vec<MessagesContentBlock> {
    let mut blocks = Vec::new();
    if let Some(reasoning) = msg.reasoning_content.as_ref().filter(|r| !r.is_empty()) {
        blocks.push(MessagesContentBlock::Thinking {
            thinking: reasoning.clone(),
            signature: msg.reasoning_signature.clone(),
        });
    }
    for data in msg.redacted_reasoning_content.iter().flatten() {
        blocks.push(MessagesContentBlock::RedactedThinking { data: data.clone() });
    }
    if let Some(content) = &msg.content {
        for part in content.to_parts() {
            if let Some(block) = content_part_to_block(&part) {
                blocks.push(block);
            }
        }
    }
    for call in msg.tool_calls.iter().flatten() {
        blocks.push(MessagesContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input: parse_tool_arguments(&call.function.arguments),
            cache_control: None,
        });
    }
    blocks
}

fn tool_choice_from_canonical(
    choice: Option<&ToolChoice>,
    parallel_tool_calls: Option<bool>,
) -> Option<MessagesToolChoice> {
    let disable_parallel_tool_use = parallel_tool_calls.map(|parallel| !parallel);
    let (kind, name) = match choice {
        None if disable_parallel_tool_use.is_none() => return None,
        None => (MessagesToolChoiceType::Auto, None),
        Some(ToolChoice::Named(named)) => {
            (MessagesToolChoiceType::Tool, Some(named.function.name.clone()))
        }
        Some(ToolChoice::Mode(mode)) => match mode.as_str() {
            TOOL_CHOICE_NONE => (MessagesToolChoiceType::None, None),
            TOOL_CHOICE_REQUIRED => (MessagesToolChoiceType::Any, None),
            _ => (MessagesToolChoiceType::Auto, None),
        },
    };
    Some(MessagesToolChoice {
        kind,
        name,
        disable_parallel_tool_use,
    })
}

// ============================================================================
// RESPONSE
// ============================================================================

pub fn stop_reason_to_canonical(reason: MessagesStopReason) -> FinishReason {
    match reason {
        MessagesStopReason::MaxTokens => FinishReason::Length,
        MessagesStopReason::ToolUse => FinishReason::ToolCalls,
        MessagesStopReason::Refusal => FinishReason::ContentFilter,
        MessagesStopReason::EndTurn
        | MessagesStopReason::StopSequence
        | MessagesStopReason::PauseTurn
        | MessagesStopReason::Other => FinishReason::Stop,
    }
}

pub fn finish_reason_to_anthropic(reason: FinishReason) -> MessagesStopReason {
    match reason {
        FinishReason::Stop => MessagesStopReason::EndTurn,
        FinishReason::Length => MessagesStopReason::MaxTokens,
        FinishReason::ToolCalls | FinishReason::FunctionCall => MessagesStopReason::ToolUse,
        FinishReason::ContentFilter => MessagesStopReason::Refusal,
    }
}

pub fn response_to_canonical(
    resp: MessagesResponse,
    ctx: &ConvertContext,
) -> Result<Response, TransformError> {
    let message = assistant_blocks_to_canonical(resp.content);
    let finish_reason = resp.stop_reason.map(stop_reason_to_canonical);
    let usage = usage::from_anthropic(&resp.usage, ctx.provider.cache_accounting());
    Ok(Response::completion(
        resp.id,
        resp.model,
        current_timestamp(),
        message,
        finish_reason,
        Some(usage),
    ))
}

pub fn response_from_canonical(
    resp: &Response,
    ctx: &ConvertContext,
) -> Result<MessagesResponse, TransformError> {
    if let Some(error) = &resp.error {
        return Err(TransformError::Upstream(error.clone()));
    }
    let content = resp
        .first_choice()
        .and_then(|choice| choice.message.as_ref().or(choice.delta.as_ref()))
        .map(assistant_blocks)
        .unwrap_or_default();
    let id = if resp.id.is_empty() {
        generate_id("msg_")
    } else {
        resp.id.clone()
    };

    Ok(MessagesResponse {
        id,
        obj_type: "message".to_string(),
        role: MessagesRole::Assistant,
        content,
        model: resp.model.clone(),
        stop_reason: resp.finish_reason().map(finish_reason_to_anthropic),
        stop_sequence: None,
        usage: resp
            .usage
            .as_ref()
            .map(|u| usage::to_anthropic(u, ctx.provider.cache_accounting()))
            .unwrap_or_default(),
        container: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::ReasoningEffort;
    use crate::providers::ProviderId;
    use pretty_assertions::assert_eq;

    fn ctx() -> ConvertContext {
        ConvertContext::new(ProviderId::Anthropic)
    }

    fn sample_request() -> MessagesRequest {
        serde_json::from_value(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 4096,
            "system": [{"type": "text", "text": "You are helpful.", "cache_control": {"type": "ephemeral"}}],
            "messages": [
                {"role": "user", "content": "What's the weather in Paris and Rome?"},
                {"role": "assistant", "content": [
                    {"type": "thinking", "thinking": "Two cities.", "signature": "sig-1"},
                    {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}},
                    {"type": "tool_use", "id": "toolu_2", "name": "get_weather", "input": {"city": "Rome"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "18C"},
                    {"type": "tool_result", "tool_use_id": "toolu_2", "content": "24C"}
                ]}
            ],
            "tools": [{"name": "get_weather", "description": "Weather", "input_schema": {"type": "object"}}],
            "tool_choice": {"type": "any", "disable_parallel_tool_use": true},
            "thinking": {"type": "enabled", "budget_tokens": 2048}
        }))
        .unwrap()
    }

    #[test]
    fn test_request_to_canonical() {
        let canonical = request_to_canonical(sample_request()).unwrap();
        assert_eq!(canonical.messages.len(), 5);
        assert_eq!(canonical.messages[0].role, Role::System);
        assert!(canonical.transformer_metadata.flag(&ANTHROPIC_SYSTEM_AS_BLOCKS));

        let assistant = &canonical.messages[2];
        assert_eq!(assistant.reasoning_content.as_deref(), Some("Two cities."));
        assert_eq!(assistant.reasoning_signature.as_deref(), Some("sig-1"));
        assert_eq!(assistant.tool_calls.as_ref().unwrap().len(), 2);

        assert_eq!(canonical.messages[3].role, Role::Tool);
        assert_eq!(canonical.messages[3].message_index, Some(2));
        assert_eq!(canonical.messages[4].message_index, Some(2));
        assert_eq!(canonical.messages[4].text(), "24C");

        assert_eq!(canonical.tool_choice, Some(ToolChoice::mode(TOOL_CHOICE_REQUIRED)));
        assert_eq!(canonical.parallel_tool_calls, Some(false));
        assert_eq!(canonical.reasoning_budget, Some(2048));
    }

    #[test]
    fn test_request_round_trip_preserves_turns_and_system_shape() {
        let original = sample_request();
        let canonical = request_to_canonical(original.clone()).unwrap();
        let back = request_from_canonical(&canonical, &ctx()).unwrap();

        assert_eq!(back.messages, original.messages);
        assert_eq!(back.system, original.system);
        assert_eq!(back.tool_choice, original.tool_choice);
        assert_eq!(back.thinking, original.thinking);
        assert_eq!(back.max_tokens, Some(4096));
    }

    #[test]
    fn test_tool_result_blocks_flatten_to_text() {
        let message: MessagesMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [{"type": "tool_result", "tool_use_id": "toolu_9", "content": [
                {"type": "text", "text": "line one"},
                {"type": "text", "text": "line two"}
            ]}]
        }))
        .unwrap();
        let converted = message_to_canonical(message, 0);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].text(), "line one\nline two");
        assert_eq!(converted[0].tool_call_id.as_deref(), Some("toolu_9"));
    }

    #[test]
    fn test_missing_max_tokens_is_invalid() {
        let mut req = sample_request();
        req.max_tokens = None;
        assert!(matches!(
            request_to_canonical(req),
            Err(TransformError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_budget_wins_over_effort() {
        let req = Request {
            model: "claude-sonnet-4".to_string(),
            messages: vec![Message::user("hi")],
            max_tokens: Some(64000),
            reasoning_effort: Some(ReasoningEffort::Low),
            reasoning_budget: Some(20000),
            ..Default::default()
        };
        let out = request_from_canonical(&req, &ctx()).unwrap();
        assert_eq!(out.thinking.unwrap().budget_tokens, Some(20000));

        let effort_only = Request {
            reasoning_budget: None,
            ..req
        };
        let out = request_from_canonical(&effort_only, &ctx()).unwrap();
        assert_eq!(out.thinking.unwrap().budget_tokens, Some(5000));
    }

    #[test]
    fn test_max_tokens_bump_saturates() {
        let req = Request {
            model: "claude-sonnet-4".to_string(),
            messages: vec![Message::user("hi")],
            max_tokens: Some(1024),
            reasoning_budget: Some(u32::MAX),
            ..Default::default()
        };
        let out = request_from_canonical(&req, &ctx()).unwrap();
        assert_eq!(out.max_tokens, Some(u32::MAX));
        assert_eq!(out.thinking.unwrap().budget_tokens, Some(u32::MAX));
    }

    #[test]
    fn test_openai_style_tool_results_merge_into_one_turn() {
        let assistant = Message {
            role: Role::Assistant,
            tool_calls: Some(vec![
                ToolCall::new("call_1", "f", "{}"),
                ToolCall::new("call_2", "f", "{\"invalid\": json}"),
            ]),
            ..Default::default()
        };
        let req = Request {
            model: "claude".to_string(),
            messages: vec![
                Message::system("sys"),
                Message::user("go"),
                assistant,
                Message::tool("call_1", "a"),
                Message::tool("call_2", "b"),
                Message::user("thanks"),
            ],
            ..Default::default()
        };
        let out = request_from_canonical(&req, &ctx()).unwrap();
        assert_eq!(out.system, Some(MessagesSystemPrompt::Single("sys".to_string())));
        assert_eq!(out.max_tokens, Some(DEFAULT_MAX_TOKENS));
        assert_eq!(out.messages.len(), 3);

        let MessagesMessageContent::Blocks(blocks) = &out.messages[1].content else {
            panic!("assistant turn should be blocks");
        };
        assert!(matches!(
            &blocks[1],
            MessagesContentBlock::ToolUse { input, .. } if input == &json!({"invalid": "json"})
        ));

        let MessagesMessageContent::Blocks(blocks) = &out.messages[2].content else {
            panic!("tool results should be blocks");
        };
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[0], MessagesContentBlock::ToolResult { .. }));
        assert!(matches!(blocks[2], MessagesContentBlock::Text { .. }));
    }

    #[test]
    fn test_data_url_image_becomes_base64_source() {
        let req = Request {
            model: "claude".to_string(),
            messages: vec![Message::user(MessageContent::Parts(vec![
                ContentPart::text("what is this?"),
                ContentPart::image_url("data:image/png;base64,AAAA"),
                ContentPart::image_url("https://example.com/cat.png"),
            ]))],
            ..Default::default()
        };
        let out = request_from_canonical(&req, &ctx()).unwrap();
        let value = serde_json::to_value(&out.messages[0]).unwrap();
        assert_eq!(
            value["content"][1]["source"],
            json!({"type": "base64", "media_type": "image/png", "data": "AAAA"})
        );
        assert_eq!(
            value["content"][2]["source"],
            json!({"type": "url", "url": "https://example.com/cat.png"})
        );
    }

    #[test]
    fn test_response_round_trip() {
        let body = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "sig"},
                {"type": "text", "text": "Hello"},
                {"type": "tool_use", "id": "toolu_1", "name": "f", "input": {"a": 1}}
            ],
            "model": "claude-sonnet-4",
            "stop_reason": "tool_use",
            "stop_sequence": null,
            "usage": {"input_tokens": 100, "output_tokens": 50, "cache_creation_input_tokens": 20, "cache_read_input_tokens": 30}
        });
        let resp: MessagesResponse = serde_json::from_value(body.clone()).unwrap();
        let canonical = response_to_canonical(resp, &ctx()).unwrap();
        assert_eq!(canonical.finish_reason(), Some(FinishReason::ToolCalls));
        assert_eq!(canonical.usage.unwrap().prompt_tokens, 150);
        let message = canonical.message().unwrap();
        assert_eq!(message.text(), "Hello");
        assert_eq!(message.tool_calls.as_ref().unwrap()[0].function.arguments, "{\"a\":1}");

        let back = response_from_canonical(&canonical, &ctx()).unwrap();
        assert_eq!(serde_json::to_value(&back).unwrap(), body);
    }
}
