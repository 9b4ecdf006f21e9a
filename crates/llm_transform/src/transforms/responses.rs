use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;

use crate::apis::openai_responses::{
    EasyInputMessage, IncompleteDetails, InputContent, InputItem, InputPart,
    NamedResponsesToolChoice, OutputContent, OutputItem, ReasoningConfig as ResponsesReasoning,
    ResponsesErrorBody, ResponsesInput, ResponsesRequest, ResponsesResponse, ResponsesTool,
    ResponsesToolChoice, SummaryPart, TextConfig, TextFormat, TypedInputItem, RESPONSE_OBJECT,
    STATUS_COMPLETED, STATUS_FAILED, STATUS_INCOMPLETE,
};
use crate::canonical::metadata::{
    RESPONSES_INCLUDE, RESPONSES_INPUT_AS_TEXT, RESPONSES_PREVIOUS_RESPONSE_ID, RESPONSES_STORE,
    RESPONSES_TRUNCATION,
};
use crate::canonical::request::{TOOL_CHOICE_AUTO, TOOL_TYPE_FUNCTION};
use crate::canonical::{
    ContentPart, FinishReason, Function, ImageGenerationTool, ImageUrl, JsonSchema, Message,
    MessageContent, ReasoningEffort, Request, Response, ResponseFormat, Role, Tool, ToolCall,
    ToolChoice, TransformerMetadata,
};
use crate::errors::{ResponseError, TransformError};
use crate::transforms::lib::*;
use crate::transforms::{usage, ConvertContext};

const INCOMPLETE_MAX_OUTPUT_TOKENS: &str = "max_output_tokens";
const INCOMPLETE_CONTENT_FILTER: &str = "content_filter";

// ============================================================================
// REQUEST: RESPONSES -> CANONICAL
// ============================================================================

pub fn request_to_canonical(req: ResponsesRequest) -> Result<Request, TransformError> {
    let mut metadata = TransformerMetadata::new();
    let mut messages = Vec::new();

    if let Some(instructions) = req.instructions.filter(|i| !i.is_empty()) {
        messages.push(Message::system(instructions));
    }

    match req.input {
        ResponsesInput::Text(text) => {
            metadata.insert(&RESPONSES_INPUT_AS_TEXT, true);
            messages.push(Message::user(text));
        }
        ResponsesInput::Items(items) => messages.extend(items_to_canonical(items)),
    }

    if let Some(id) = req.previous_response_id {
        metadata.insert(&RESPONSES_PREVIOUS_RESPONSE_ID, id);
    }
    if let Some(store) = req.store {
        metadata.insert(&RESPONSES_STORE, store);
    }
    if let Some(include) = req.include {
        metadata.insert(&RESPONSES_INCLUDE, include);
    }
    if let Some(truncation) = req.truncation {
        metadata.insert(&RESPONSES_TRUNCATION, truncation);
    }

    let (reasoning_effort, reasoning_summary) = match req.reasoning {
        Some(reasoning) => (
            reasoning.effort.as_deref().and_then(ReasoningEffort::parse),
            reasoning.summary,
        ),
        None => (None, None),
    };

    let request = Request {
        model: req.model,
        messages,
        tools: req.tools.map(tools_to_canonical),
        tool_choice: req.tool_choice.map(tool_choice_to_canonical),
        parallel_tool_calls: req.parallel_tool_calls,
        temperature: req.temperature,
        top_p: req.top_p,
        max_completion_tokens: req.max_output_tokens,
        top_logprobs: req.top_logprobs,
        user: req.user,
        stream: req.stream,
        reasoning_effort,
        reasoning_summary,
        response_format: req
            .text
            .and_then(|text| text.format)
            .map(text_format_to_canonical),
        metadata: req.metadata,
        service_tier: req.service_tier,
        transformer_metadata: metadata,
        ..Default::default()
    };
    request.validate()?;
    Ok(request)
}

/// Folds the flat item list into turns. Function calls join the assistant
/// turn they follow; reasoning items attach to the next assistant turn;
/// consecutive function outputs share a `message_index`.
fn items_to_canonical(items: Vec<InputItem>) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::new();
    let mut assistant: Option<Message> = None;
    let mut output_group: u32 = 0;
    let mut previous_was_output = false;

    for item in items {
        let typed = match item {
            InputItem::EasyMessage(EasyInputMessage { role, content }) => {
                TypedInputItem::Message {
                    id: None,
                    role,
                    content,
                    status: None,
                }
            }
            InputItem::Typed(typed) => typed,
        };
        let is_output = matches!(typed, TypedInputItem::FunctionCallOutput { .. });
        if is_output && !previous_was_output {
            output_group += 1;
        }
        previous_was_output = is_output;

        match typed {
            TypedInputItem::Message { role, content, .. } => {
                let role = parse_role(&role);
                let message = input_message_to_canonical(role, content);
                if role == Role::Assistant {
                    let turn = assistant.take().unwrap_or_default();
                    if turn.content.is_some() || turn.has_tool_calls() {
                        messages.push(turn);
                        assistant = Some(message);
                    } else {
                        // Carry pending reasoning into this turn.
                        assistant = Some(Message {
                            reasoning_content: turn.reasoning_content,
                            reasoning_signature: turn.reasoning_signature,
                            ..message
                        });
                    }
                } else {
                    messages.extend(assistant.take());
                    messages.push(message);
                }
            }
            TypedInputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => {
                let turn = assistant.get_or_insert_with(|| Message {
                    role: Role::Assistant,
                    ..Default::default()
                });
                turn.tool_calls.get_or_insert_with(Vec::new).push(ToolCall::new(
                    call_id,
                    name,
                    repair_tool_arguments(&arguments),
                ));
            }
            TypedInputItem::FunctionCallOutput { call_id, output, .. } => {
                messages.extend(assistant.take());
                let mut result = Message::tool(call_id, function_output_text(&output));
                result.message_index = Some(output_group);
                messages.push(result);
            }
            TypedInputItem::Reasoning {
                summary,
                encrypted_content,
                ..
            } => {
                messages.extend(assistant.take());
                let text = summary
                    .iter()
                    .map(SummaryPart::text)
                    .collect::<Vec<_>>()
                    .join("\n\n");
                assistant = Some(Message {
                    role: Role::Assistant,
                    reasoning_content: (!text.is_empty()).then_some(text),
                    reasoning_signature: encrypted_content,
                    ..Default::default()
                });
            }
            TypedInputItem::ImageGenerationCall { id, .. } | TypedInputItem::ItemReference { id } => {
                debug!("skipping input item `{}` with no canonical equivalent", id)
            }
        }
    }
    messages.extend(assistant);
    messages
}

fn parse_role(role: &str) -> Role {
    match role {
        "system" => Role::System,
        "developer" => Role::Developer,
        "assistant" => Role::Assistant,
        _ => Role::User,
    }
}

fn input_message_to_canonical(role: Role, content: InputContent) -> Message {
    let parts = match content {
        InputContent::Text(text) => return Message::new(role, text),
        InputContent::Parts(parts) => parts,
    };

    let mut message = Message {
        role,
        ..Default::default()
    };
    let mut canonical_parts = Vec::new();
    for part in parts {
        match part {
            InputPart::InputText { text } | InputPart::OutputText { text, .. } => {
                canonical_parts.push(ContentPart::text(text))
            }
            InputPart::InputImage {
                image_url: Some(url),
                detail,
                ..
            } => canonical_parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url, detail },
                cache_control: None,
            }),
            InputPart::Refusal { refusal } => message.refusal = Some(refusal),
            other => warn!("dropping input part with no canonical equivalent: {:?}", other),
        }
    }

    message.content = match canonical_parts.as_slice() {
        [] => None,
        [ContentPart::Text { text, .. }] => Some(MessageContent::Text(text.clone())),
        _ => Some(MessageContent::Parts(canonical_parts)),
    };
    message
}

fn function_output_text(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        Value::Array(_) => match serde_json::from_value::<Vec<InputPart>>(output.clone()) {
            Ok(parts) => InputContent::Parts(parts).extract_text(),
            Err(_) => output.to_string(),
        },
        other => other.to_string(),
    }
}

fn tools_to_canonical(tools: Vec<ResponsesTool>) -> Vec<Tool> {
    tools
        .into_iter()
        .filter_map(|tool| match tool {
            ResponsesTool::Function {
                name,
                description,
                parameters,
                strict,
            } => Some(Tool {
                tool_type: TOOL_TYPE_FUNCTION.to_string(),
                function: Some(Function {
                    name,
                    description,
                    parameters,
                    strict,
                }),
                image_generation: None,
                cache_control: None,
            }),
            ResponsesTool::ImageGeneration {
                quality,
                size,
                output_format,
                background,
                output_compression,
                moderation,
            } => Some(Tool::image_generation(ImageGenerationTool {
                quality,
                size,
                output_format,
                background,
                output_compression,
                moderation,
            })),
            ResponsesTool::Unsupported => {
                warn!("dropping hosted tool with no canonical equivalent");
                None
            }
        })
        .collect()
}

fn tool_choice_to_canonical(choice: ResponsesToolChoice) -> ToolChoice {
    match choice {
        ResponsesToolChoice::Mode(mode) => ToolChoice::Mode(mode),
        ResponsesToolChoice::Named(NamedResponsesToolChoice {
            choice_type,
            name: Some(name),
        }) if choice_type == TOOL_TYPE_FUNCTION => ToolChoice::named(name),
        ResponsesToolChoice::Named(named) => {
            warn!("tool_choice `{}` has no canonical equivalent, using auto", named.choice_type);
            ToolChoice::mode(TOOL_CHOICE_AUTO)
        }
    }
}

fn text_format_to_canonical(format: TextFormat) -> ResponseFormat {
    match format {
        TextFormat::Text => ResponseFormat {
            format_type: "text".to_string(),
            json_schema: None,
        },
        TextFormat::JsonObject => ResponseFormat {
            format_type: "json_object".to_string(),
            json_schema: None,
        },
        TextFormat::JsonSchema {
            name,
            description,
            schema,
            strict,
        } => ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: Some(JsonSchema {
                name,
                description,
                schema,
                strict,
            }),
        },
    }
}

// ============================================================================
// REQUEST: CANONICAL -> RESPONSES
// ============================================================================

pub fn request_from_canonical(
    req: &Request,
    ctx: &ConvertContext,
) -> Result<ResponsesRequest, TransformError> {
    req.validate()?;
    let metadata = &req.transformer_metadata;

    let instructions: Vec<String> = req
        .messages
        .iter()
        .filter(|msg| msg.role.is_instruction())
        .map(Message::text)
        .filter(|text| !text.is_empty())
        .collect();
    let turns: Vec<&Message> = req
        .messages
        .iter()
        .filter(|msg| !msg.role.is_instruction())
        .collect();

    let input = match turns.as_slice() {
        [only] if metadata.flag(&RESPONSES_INPUT_AS_TEXT)
            && only.role == Role::User
            && matches!(only.content, Some(MessageContent::Text(_))) =>
        {
            ResponsesInput::Text(only.text())
        }
        _ => ResponsesInput::Items(turns.iter().flat_map(|msg| items_from_canonical(msg)).collect()),
    };

    let tools: Vec<ResponsesTool> = req
        .tools
        .iter()
        .flatten()
        .filter_map(tool_from_canonical)
        .collect();

    let effort = ctx
        .reasoning
        .resolve_effort(req.reasoning_effort, req.reasoning_budget)
        .map(|effort| ctx.provider.supported_effort(effort).as_str().to_string());
    let reasoning = (effort.is_some() || req.reasoning_summary.is_some()).then(|| {
        ResponsesReasoning {
            effort,
            summary: req.reasoning_summary.clone(),
        }
    });

    Ok(ResponsesRequest {
        model: req.model.clone(),
        input,
        instructions: (!instructions.is_empty()).then(|| instructions.join("\n")),
        tool_choice: if tools.is_empty() {
            None
        } else {
            req.tool_choice.as_ref().map(tool_choice_from_canonical)
        },
        tools: (!tools.is_empty()).then_some(tools),
        parallel_tool_calls: req.parallel_tool_calls,
        max_output_tokens: req.output_token_limit(),
        temperature: req.temperature,
        top_p: req.top_p,
        top_logprobs: req.top_logprobs,
        stream: req.stream,
        reasoning,
        text: req.response_format.as_ref().map(|format| TextConfig {
            format: Some(text_format_from_canonical(format)),
            verbosity: None,
        }),
        metadata: req.metadata.clone(),
        previous_response_id: metadata.get(&RESPONSES_PREVIOUS_RESPONSE_ID),
        store: metadata.get(&RESPONSES_STORE),
        include: metadata.get(&RESPONSES_INCLUDE),
        truncation: metadata.get(&RESPONSES_TRUNCATION),
        user: req.user.clone(),
        service_tier: req.service_tier.clone(),
    })
}

fn items_from_canonical(msg: &Message) -> Vec<InputItem> {
    let mut items = Vec::new();
    match msg.role {
        Role::Tool => items.push(InputItem::Typed(TypedInputItem::FunctionCallOutput {
            id: None,
            call_id: msg.tool_call_id.clone().unwrap_or_default(),
            output: Value::String(msg.text()),
        })),
        Role::Assistant => {
            // Only encrypted reasoning can be replayed.
            if let Some(encrypted) = &msg.reasoning_signature {
                items.push(InputItem::Typed(TypedInputItem::Reasoning {
                    id: None,
                    summary: msg
                        .reasoning_content
                        .iter()
                        .map(|text| SummaryPart::SummaryText { text: text.clone() })
                        .collect(),
                    encrypted_content: Some(encrypted.clone()),
                }));
            }
            let text = msg.text();
            if !text.is_empty() {
                items.push(InputItem::EasyMessage(EasyInputMessage {
                    role: Role::Assistant.as_str().to_string(),
                    content: InputContent::Text(text),
                }));
            }
            for call in msg.tool_calls.iter().flatten() {
                items.push(InputItem::Typed(TypedInputItem::FunctionCall {
                    id: None,
                    call_id: call.id.clone(),
                    name: call.function.name.clone(),
                    arguments: repair_tool_arguments(&call.function.arguments),
                    status: None,
                }));
            }
        }
        role => {
            let content = match &msg.content {
                Some(MessageContent::Parts(parts)) => {
                    InputContent::Parts(parts.iter().filter_map(input_part_from_canonical).collect())
                }
                _ => InputContent::Text(msg.text()),
            };
            items.push(InputItem::EasyMessage(EasyInputMessage {
                role: role.as_str().to_string(),
                content,
            }));
        }
    }
    items
}

fn input_part_from_canonical(part: &ContentPart) -> Option<InputPart> {
    match part {
        ContentPart::Text { text, .. } => Some(InputPart::InputText { text: text.clone() }),
        ContentPart::ImageUrl { image_url, .. } => Some(InputPart::InputImage {
            image_url: Some(image_url.url.clone()),
            file_id: None,
            detail: Some(image_url.detail.clone().unwrap_or_else(|| "auto".to_string())),
        }),
        ContentPart::InputAudio { .. } => {
            warn!("dropping audio input: not supported by the Responses API");
            None
        }
    }
}

fn tool_from_canonical(tool: &Tool) -> Option<ResponsesTool> {
    if let Some(options) = tool.image_generation.as_ref().filter(|_| tool.is_image_generation()) {
        return Some(ResponsesTool::ImageGeneration {
            quality: options.quality.clone(),
            size: options.size.clone(),
            output_format: options.output_format.clone(),
            background: options.background.clone(),
            output_compression: options.output_compression,
            moderation: options.moderation.clone(),
        });
    }
    let function = tool.function.as_ref().filter(|_| tool.is_function())?;
    Some(ResponsesTool::Function {
        name: function.name.clone(),
        description: function.description.clone(),
        parameters: function.parameters.clone(),
        strict: function.strict,
    })
}

fn tool_choice_from_canonical(choice: &ToolChoice) -> ResponsesToolChoice {
    match choice {
        ToolChoice::Mode(mode) => ResponsesToolChoice::Mode(mode.clone()),
        ToolChoice::Named(named) => ResponsesToolChoice::Named(NamedResponsesToolChoice {
            choice_type: TOOL_TYPE_FUNCTION.to_string(),
            name: Some(named.function.name.clone()),
        }),
    }
}

fn text_format_from_canonical(format: &ResponseFormat) -> TextFormat {
    match (format.format_type.as_str(), &format.json_schema) {
        ("json_schema", Some(schema)) => TextFormat::JsonSchema {
            name: schema.name.clone(),
            description: schema.description.clone(),
            schema: schema.schema.clone(),
            strict: schema.strict,
        },
        ("json_object", _) => TextFormat::JsonObject,
        _ => TextFormat::Text,
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

/// Finish reason implied by a response status and its incomplete details.
pub fn status_to_finish_reason(
    status: &str,
    incomplete: Option<&IncompleteDetails>,
    has_tool_calls: bool,
) -> FinishReason {
    match (status, incomplete.map(|d| d.reason.as_str())) {
        (STATUS_INCOMPLETE, Some(INCOMPLETE_CONTENT_FILTER)) => FinishReason::ContentFilter,
        (STATUS_INCOMPLETE, _) => FinishReason::Length,
        _ if has_tool_calls => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Status and incomplete details for a canonical finish reason.
pub fn finish_reason_to_status(
    finish_reason: Option<FinishReason>,
) -> (&'static str, Option<IncompleteDetails>) {
    match finish_reason {
        Some(FinishReason::Length) => (
            STATUS_INCOMPLETE,
            Some(IncompleteDetails {
                reason: INCOMPLETE_MAX_OUTPUT_TOKENS.to_string(),
            }),
        ),
        Some(FinishReason::ContentFilter) => (
            STATUS_INCOMPLETE,
            Some(IncompleteDetails {
                reason: INCOMPLETE_CONTENT_FILTER.to_string(),
            }),
        ),
        _ => (STATUS_COMPLETED, None),
    }
}

pub fn failure_to_error(error: Option<&ResponsesErrorBody>) -> ResponseError {
    let message = error
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "response failed".to_string());
    let response_error = ResponseError::new(500, message, "api_error");
    match error.and_then(|e| e.code.clone()) {
        Some(code) => response_error.with_code(code),
        None => response_error,
    }
}

/// Base64 output of an image_generation_call as a data-URL image part.
pub fn generated_image_part(result: &str, output_format: Option<&str>) -> ContentPart {
    let media_type = format!("image/{}", output_format.unwrap_or("png"));
    ContentPart::image_url(to_data_url(&media_type, result))
}

pub fn response_to_canonical(
    resp: ResponsesResponse,
    _ctx: &ConvertContext,
) -> Result<Response, TransformError> {
    if resp.status == STATUS_FAILED {
        return Err(TransformError::Upstream(failure_to_error(resp.error.as_ref())));
    }

    let mut message = Message {
        role: Role::Assistant,
        ..Default::default()
    };
    let mut text = String::new();
    let mut images = Vec::new();
    let mut summaries = Vec::new();
    let mut tool_calls = Vec::new();

    for item in resp.output {
        match item {
            OutputItem::Message { content, .. } => {
                for part in content {
                    match part {
                        OutputContent::OutputText { text: t, .. } => text.push_str(&t),
                        OutputContent::Refusal { refusal } => message.refusal = Some(refusal),
                    }
                }
            }
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => tool_calls.push(ToolCall::new(
                call_id,
                name,
                repair_tool_arguments(&arguments),
            )),
            OutputItem::Reasoning {
                summary,
                encrypted_content,
                ..
            } => {
                summaries.extend(summary.iter().map(|s| s.text().to_string()));
                if encrypted_content.is_some() {
                    message.reasoning_signature = encrypted_content;
                }
            }
            OutputItem::ImageGenerationCall {
                result: Some(result),
                output_format,
                ..
            } => {
                images.push(generated_image_part(&result, output_format.as_deref()));
            }
            OutputItem::ImageGenerationCall { id, .. } => {
                debug!("image generation call {} has no result", id)
            }
        }
    }

    message.content = if images.is_empty() {
        (!text.is_empty()).then(|| MessageContent::Text(text))
    } else {
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(ContentPart::text(text));
        }
        parts.extend(images);
        Some(MessageContent::Parts(parts))
    };
    if !summaries.is_empty() {
        message.reasoning_content = Some(summaries.join("\n\n"));
    }
    let has_tool_calls = !tool_calls.is_empty();
    if has_tool_calls {
        message.tool_calls = Some(tool_calls);
    }

    let finish_reason =
        status_to_finish_reason(&resp.status, resp.incomplete_details.as_ref(), has_tool_calls);
    let mut response = Response::completion(
        resp.id,
        resp.model,
        resp.created_at,
        message,
        Some(finish_reason),
        resp.usage.as_ref().map(usage::from_responses),
    );
    response.service_tier = resp.service_tier;
    Ok(response)
}

/// Output items for one assistant message, in wire order.
pub fn output_items_from_message(message: &Message) -> Vec<OutputItem> {
    let mut items = Vec::new();
    if message.reasoning_content.is_some() || message.reasoning_signature.is_some() {
        items.push(OutputItem::Reasoning {
            id: generate_id("rs_"),
            summary: message
                .reasoning_content
                .iter()
                .map(|text| SummaryPart::SummaryText { text: text.clone() })
                .collect(),
            encrypted_content: message.reasoning_signature.clone(),
        });
    }

    let mut content = Vec::new();
    let mut images = Vec::new();
    for part in message.content.iter().flat_map(MessageContent::to_parts) {
        match part {
            ContentPart::Text { text, .. } => content.push(OutputContent::OutputText {
                text,
                annotations: Vec::new(),
            }),
            ContentPart::ImageUrl { image_url, .. } => images.extend(parse_data_url(&image_url.url)),
            ContentPart::InputAudio { .. } => {}
        }
    }
    if let Some(refusal) = &message.refusal {
        content.push(OutputContent::Refusal {
            refusal: refusal.clone(),
        });
    }
    if !content.is_empty() {
        items.push(OutputItem::Message {
            id: generate_id("msg_"),
            status: STATUS_COMPLETED.to_string(),
            role: Role::Assistant.as_str().to_string(),
            content,
        });
    }
    for (media_type, data) in images {
        items.push(OutputItem::ImageGenerationCall {
            id: generate_id("ig_"),
            status: STATUS_COMPLETED.to_string(),
            result: Some(data),
            output_format: media_type.strip_prefix("image/").map(str::to_string),
            size: None,
            quality: None,
            background: None,
            revised_prompt: None,
        });
    }
    for call in message.tool_calls.iter().flatten() {
        items.push(OutputItem::FunctionCall {
            id: generate_id("fc_"),
            status: Some(STATUS_COMPLETED.to_string()),
            call_id: call.id.clone(),
            name: call.function.name.clone(),
            arguments: repair_tool_arguments(&call.function.arguments),
        });
    }
    items
}

pub fn response_from_canonical(
    resp: &Response,
    _ctx: &ConvertContext,
) -> Result<ResponsesResponse, TransformError> {
    if let Some(error) = &resp.error {
        return Err(TransformError::Upstream(error.clone()));
    }
    let output = resp
        .first_choice()
        .and_then(|choice| choice.message.as_ref().or(choice.delta.as_ref()))
        .map(output_items_from_message)
        .unwrap_or_default();
    let (status, incomplete_details) = finish_reason_to_status(resp.finish_reason());

    Ok(ResponsesResponse {
        id: if resp.id.is_empty() {
            generate_id("resp_")
        } else {
            resp.id.clone()
        },
        object: RESPONSE_OBJECT.to_string(),
        created_at: resp.created,
        status: status.to_string(),
        error: None,
        incomplete_details,
        model: resp.model.clone(),
        output,
        usage: resp.usage.as_ref().map(usage::to_responses),
        service_tier: resp.service_tier.clone(),
        metadata: Some(HashMap::new()),
        ..Default::default()
    })
}
