use log::warn;

use crate::apis::openai::{
    ChatChoice, ChatCompletionsRequest, ChatCompletionsResponse, ChatMessage, ChatTool,
    ImageGenerationRequest, ImagesResponse, StopSequences,
};
use crate::canonical::metadata::{OPENAI_LOGIT_BIAS, OPENAI_MODALITIES, OPENAI_STORE};
use crate::canonical::{
    Choice, ContentPart, FinishReason, ImageGenerationTool, Message, MessageContent,
    ReasoningEffort, Request, Response, Role, Tool, ToolCall, TransformerMetadata,
};
use crate::errors::TransformError;
use crate::providers::ProviderId;
use crate::transforms::lib::*;
use crate::transforms::usage;
use crate::transforms::ConvertContext;

// ============================================================================
// REQUEST
// ============================================================================

pub fn request_to_canonical(req: ChatCompletionsRequest) -> Result<Request, TransformError> {
    let mut metadata = TransformerMetadata::new();
    if let Some(logit_bias) = req.logit_bias {
        metadata.insert(&OPENAI_LOGIT_BIAS, logit_bias);
    }
    if let Some(modalities) = req.modalities {
        metadata.insert(&OPENAI_MODALITIES, modalities);
    }
    if let Some(store) = req.store {
        metadata.insert(&OPENAI_STORE, store);
    }

    let reasoning_effort = req.reasoning_effort.as_deref().and_then(|label| {
        let parsed = ReasoningEffort::parse(label);
        if parsed.is_none() {
            warn!("ignoring unknown reasoning_effort `{}`", label);
        }
        parsed
    });

    let request = Request {
        model: req.model,
        messages: req.messages.into_iter().map(message_to_canonical).collect(),
        tools: req
            .tools
            .map(|tools| tools.into_iter().map(tool_to_canonical).collect()),
        tool_choice: req.tool_choice,
        parallel_tool_calls: req.parallel_tool_calls,
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        max_tokens: req.max_tokens,
        max_completion_tokens: req.max_completion_tokens,
        stop: req.stop.map(StopSequences::into_vec),
        presence_penalty: req.presence_penalty,
        frequency_penalty: req.frequency_penalty,
        seed: req.seed,
        n: req.n,
        logprobs: req.logprobs,
        top_logprobs: req.top_logprobs,
        user: req.user,
        stream: req.stream,
        stream_options: req.stream_options,
        reasoning_effort,
        reasoning_budget: None,
        reasoning_summary: None,
        response_format: req.response_format,
        metadata: req.metadata,
        service_tier: req.service_tier,
        transformer_metadata: metadata,
    };
    request.validate()?;
    Ok(request)
}

pub fn request_from_canonical(
    req: &Request,
    ctx: &ConvertContext,
) -> Result<ChatCompletionsRequest, TransformError> {
    req.validate()?;

    let tools: Vec<ChatTool> = req
        .tools
        .iter()
        .flatten()
        .filter_map(|tool| match &tool.function {
            Some(function) if tool.is_function() => Some(ChatTool {
                tool_type: tool.tool_type.clone(),
                function: function.clone(),
            }),
            _ => {
                warn!(
                    "dropping `{}` tool: not expressible as a chat completions tool",
                    tool.tool_type
                );
                None
            }
        })
        .collect();

    let reasoning_effort = ctx
        .reasoning
        .resolve_effort(req.reasoning_effort, req.reasoning_budget)
        .map(|effort| ctx.provider.supported_effort(effort).as_str().to_string());

    let metadata = &req.transformer_metadata;
    Ok(ChatCompletionsRequest {
        model: req.model.clone(),
        messages: req
            .messages
            .iter()
            .map(|msg| message_from_canonical(msg, ctx.provider))
            .collect(),
        tool_choice: if tools.is_empty() {
            None
        } else {
            req.tool_choice.clone()
        },
        parallel_tool_calls: if tools.is_empty() {
            None
        } else {
            req.parallel_tool_calls
        },
        tools: (!tools.is_empty()).then_some(tools),
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        max_tokens: req.max_tokens,
        max_completion_tokens: req.max_completion_tokens,
        stop: req.stop.clone().map(StopSequences::Multiple),
        presence_penalty: req.presence_penalty,
        frequency_penalty: req.frequency_penalty,
        seed: req.seed,
        n: req.n,
        logprobs: req.logprobs,
        top_logprobs: req.top_logprobs,
        logit_bias: metadata.get(&OPENAI_LOGIT_BIAS),
        user: req.user.clone(),
        stream: req.stream,
        stream_options: if req.is_streaming() {
            req.stream_options.clone()
        } else {
            None
        },
        reasoning_effort,
        response_format: req.response_format.clone(),
        metadata: req.metadata.clone(),
        service_tier: req.service_tier.clone(),
        modalities: metadata.get(&OPENAI_MODALITIES),
        store: metadata.get(&OPENAI_STORE),
    })
}

fn message_to_canonical(msg: ChatMessage) -> Message {
    let reasoning_content = msg.reasoning_text().map(str::to_string);
    Message {
        role: msg.role,
        content: msg.content,
        name: msg.name,
        tool_calls: msg.tool_calls.map(repair_tool_calls),
        tool_call_id: msg.tool_call_id,
        refusal: msg.refusal,
        reasoning_content,
        ..Default::default()
    }
}

fn message_from_canonical(msg: &Message, provider: ProviderId) -> ChatMessage {
    // Only OpenAI itself understands the developer role.
    let role = match msg.role {
        Role::Developer if provider != ProviderId::OpenAI && provider != ProviderId::AzureOpenAI => {
            Role::System
        }
        role => role,
    };
    let content = match (&msg.content, msg.role) {
        (Some(content), _) => Some(content.clone()),
        // Tool results always carry content.
        (None, Role::Tool) => Some(MessageContent::Text(String::new())),
        (None, _) => None,
    };
    ChatMessage {
        role,
        content,
        name: msg.name.clone(),
        tool_calls: msg
            .tool_calls
            .clone()
            .filter(|calls| !calls.is_empty())
            .map(repair_tool_calls),
        tool_call_id: msg.tool_call_id.clone(),
        refusal: msg.refusal.clone(),
        reasoning_content: if provider.reports_reasoning_content() {
            msg.reasoning_content.clone()
        } else {
            None
        },
        reasoning: None,
    }
}

fn tool_to_canonical(tool: ChatTool) -> Tool {
    Tool {
        tool_type: tool.tool_type,
        function: Some(tool.function),
        image_generation: None,
        cache_control: None,
    }
}

pub(crate) fn repair_tool_calls(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .map(|mut call| {
            call.function.arguments = repair_tool_arguments(&call.function.arguments);
            call
        })
        .collect()
}

// ============================================================================
// RESPONSE
// ============================================================================

pub fn response_to_canonical(
    resp: ChatCompletionsResponse,
    _ctx: &ConvertContext,
) -> Result<Response, TransformError> {
    let choices = resp
        .choices
        .into_iter()
        .map(|choice: ChatChoice| Choice {
            index: choice.index,
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_openai),
            message: Some(message_to_canonical(choice.message)),
            delta: None,
            logprobs: choice.logprobs,
        })
        .collect();

    Ok(Response {
        id: resp.id,
        object: crate::canonical::response::CHAT_COMPLETION_OBJECT.to_string(),
        model: resp.model,
        created: resp.created,
        choices,
        usage: resp.usage.as_ref().map(usage::from_openai),
        error: None,
        system_fingerprint: resp.system_fingerprint,
        service_tier: resp.service_tier,
    })
}

pub fn response_from_canonical(
    resp: &Response,
    _ctx: &ConvertContext,
) -> Result<ChatCompletionsResponse, TransformError> {
    if let Some(error) = &resp.error {
        return Err(TransformError::Upstream(error.clone()));
    }
    let choices = resp
        .choices
        .iter()
        .map(|choice| {
            let message = choice
                .message
                .as_ref()
                .or(choice.delta.as_ref())
                .cloned()
                .unwrap_or_else(|| Message::assistant(""));
            ChatChoice {
                index: choice.index,
                message: ChatMessage {
                    role: Role::Assistant,
                    content: message.content,
                    name: message.name,
                    tool_calls: message
                        .tool_calls
                        .filter(|calls| !calls.is_empty())
                        .map(repair_tool_calls),
                    tool_call_id: None,
                    refusal: message.refusal,
                    reasoning_content: message.reasoning_content,
                    reasoning: None,
                },
                finish_reason: choice.finish_reason.map(|r| r.as_str().to_string()),
                logprobs: choice.logprobs.clone(),
            }
        })
        .collect();

    Ok(ChatCompletionsResponse {
        id: resp.id.clone(),
        object: crate::canonical::response::CHAT_COMPLETION_OBJECT.to_string(),
        created: resp.created,
        model: resp.model.clone(),
        choices,
        usage: resp.usage.as_ref().map(usage::to_openai),
        system_fingerprint: resp.system_fingerprint.clone(),
        service_tier: resp.service_tier.clone(),
    })
}

// ============================================================================
// IMAGES
// ============================================================================

/// Prompt for an image request: the text of the last user message.
pub fn image_prompt(req: &Request) -> Result<String, TransformError> {
    let prompt = req
        .last_user_message()
        .map(Message::text)
        .unwrap_or_default();
    if prompt.trim().is_empty() {
        return Err(TransformError::InvalidRequest(
            "image generation requires a text prompt in the last user message".to_string(),
        ));
    }
    Ok(prompt)
}

/// Input images of the last user message as `(media_type, base64)` pairs.
pub fn image_inputs(req: &Request) -> Vec<(String, String)> {
    req.last_user_message()
        .and_then(|msg| msg.content.as_ref())
        .map(|content| {
            content
                .to_parts()
                .into_iter()
                .filter_map(|part| match part {
                    ContentPart::ImageUrl { image_url, .. } => {
                        let parsed = parse_data_url(&image_url.url);
                        if parsed.is_none() {
                            warn!("image edit input is not a data URL, skipping");
                        }
                        parsed
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn image_request_from_canonical(
    req: &Request,
    options: &ImageGenerationTool,
) -> Result<ImageGenerationRequest, TransformError> {
    if req.is_streaming() {
        return Err(TransformError::UnsupportedOperation(
            "streaming is not supported for image generation".to_string(),
        ));
    }
    Ok(ImageGenerationRequest {
        model: req.model.clone(),
        prompt: image_prompt(req)?,
        n: req.n,
        size: options.size.clone(),
        quality: options.quality.clone(),
        response_format: None,
        output_format: options.output_format.clone(),
        output_compression: options.output_compression,
        background: options.background.clone(),
        moderation: options.moderation.clone(),
        user: req.user.clone(),
    })
}

/// Image results become an assistant message of data-URL image parts.
pub fn images_response_to_canonical(
    resp: ImagesResponse,
    model: &str,
) -> Result<Response, TransformError> {
    let media_type = format!(
        "image/{}",
        resp.output_format.as_deref().unwrap_or("png")
    );
    let parts: Vec<ContentPart> = resp
        .data
        .into_iter()
        .filter_map(|image| match (image.b64_json, image.url) {
            (Some(b64), _) => Some(ContentPart::image_url(to_data_url(&media_type, &b64))),
            (None, Some(url)) => Some(ContentPart::image_url(url)),
            (None, None) => None,
        })
        .collect();

    let usage = resp.usage.map(|u| {
        usage::reconcile(
            usage::TokenCounts {
                input: u.input_tokens,
                output: u.output_tokens,
                ..Default::default()
            },
            crate::providers::CacheAccounting::IncludesCache,
        )
    });

    let created = if resp.created > 0 {
        resp.created
    } else {
        current_timestamp()
    };
    Ok(Response::completion(
        generate_id("img_"),
        model,
        created,
        Message::assistant(MessageContent::Parts(parts)),
        Some(FinishReason::Stop),
        usage,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::ToolChoice;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx(provider: ProviderId) -> ConvertContext {
        ConvertContext::new(provider)
    }

    #[test]
    fn test_request_round_trip() {
        let body = json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "Be terse."},
                {"role": "user", "content": "Weather in Paris?"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "18C"}
            ],
            "tools": [{"type": "function", "function": {"name": "get_weather", "parameters": {"type": "object"}}}],
            "tool_choice": "auto",
            "temperature": 0.2,
            "stop": "END",
            "logit_bias": {"42": -100},
            "reasoning_effort": "medium"
        });
        let req: ChatCompletionsRequest = serde_json::from_value(body).unwrap();
        let canonical = request_to_canonical(req).unwrap();
        assert_eq!(canonical.messages.len(), 4);
        assert_eq!(canonical.stop, Some(vec!["END".to_string()]));
        assert_eq!(canonical.reasoning_effort, Some(ReasoningEffort::Medium));
        assert!(canonical.transformer_metadata.contains(&OPENAI_LOGIT_BIAS));

        let back = request_from_canonical(&canonical, &ctx(ProviderId::OpenAI)).unwrap();
        assert_eq!(back.messages.len(), 4);
        assert_eq!(back.tool_choice, Some(ToolChoice::mode("auto")));
        assert_eq!(back.reasoning_effort.as_deref(), Some("medium"));
        assert_eq!(back.logit_bias.unwrap().get("42"), Some(&-100));
        assert_eq!(
            back.messages[2].tool_calls.as_ref().unwrap()[0].function.arguments,
            "{\"city\":\"Paris\"}"
        );
    }

    #[test]
    fn test_missing_model_is_invalid() {
        let req = ChatCompletionsRequest {
            messages: vec![ChatMessage {
                role: Role::User,
                content: Some("hi".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            request_to_canonical(req),
            Err(TransformError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_xai_effort_clamp_and_budget_fallback() {
        let mut req = Request {
            model: "grok-4".to_string(),
            messages: vec![Message::user("hi")],
            reasoning_effort: Some(ReasoningEffort::Medium),
            ..Default::default()
        };
        let out = request_from_canonical(&req, &ctx(ProviderId::XAI)).unwrap();
        assert_eq!(out.reasoning_effort.as_deref(), Some("high"));

        req.reasoning_effort = None;
        req.reasoning_budget = Some(3000);
        let out = request_from_canonical(&req, &ctx(ProviderId::OpenAI)).unwrap();
        assert_eq!(out.reasoning_effort.as_deref(), Some("low"));
    }

    #[test]
    fn test_developer_role_downgraded_for_compatible_vendors() {
        let req = Request {
            model: "deepseek-chat".to_string(),
            messages: vec![Message::new(Role::Developer, "rules"), Message::user("hi")],
            ..Default::default()
        };
        let out = request_from_canonical(&req, &ctx(ProviderId::Deepseek)).unwrap();
        assert_eq!(out.messages[0].role, Role::System);
        let out = request_from_canonical(&req, &ctx(ProviderId::OpenAI)).unwrap();
        assert_eq!(out.messages[0].role, Role::Developer);
    }

    #[test]
    fn test_response_reasoning_alias_and_repair() {
        let body = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "deepseek-reasoner",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "",
                    "reasoning": "thinking...",
                    "tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "f", "arguments": "{\"invalid\": json}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
        });
        let resp: ChatCompletionsResponse = serde_json::from_value(body).unwrap();
        let canonical = response_to_canonical(resp, &ctx(ProviderId::OpenRouter)).unwrap();
        let message = canonical.message().unwrap();
        assert_eq!(message.reasoning_content.as_deref(), Some("thinking..."));
        assert_eq!(
            message.tool_calls.as_ref().unwrap()[0].function.arguments,
            "{\"invalid\":\"json\"}"
        );
        assert_eq!(canonical.finish_reason(), Some(FinishReason::ToolCalls));
        assert_eq!(canonical.usage.unwrap().total_tokens, 12);

        let back = response_from_canonical(&canonical, &ctx(ProviderId::OpenAI)).unwrap();
        let value = serde_json::to_value(&back).unwrap();
        assert_eq!(value["choices"][0]["finish_reason"], "tool_calls");
        assert_eq!(value["choices"][0]["message"]["reasoning_content"], "thinking...");
    }

    #[test]
    fn test_image_request_rejects_streaming() {
        let req = Request {
            model: "gpt-image-1".to_string(),
            messages: vec![Message::user("a red fox")],
            stream: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            image_request_from_canonical(&req, &ImageGenerationTool::default()),
            Err(TransformError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_images_response_to_data_urls() {
        let resp: ImagesResponse = serde_json::from_value(json!({
            "created": 10,
            "data": [{"b64_json": "QUJD"}],
            "output_format": "webp",
            "usage": {"input_tokens": 5, "output_tokens": 100, "total_tokens": 105}
        }))
        .unwrap();
        let canonical = images_response_to_canonical(resp, "gpt-image-1").unwrap();
        let content = canonical.message().unwrap().content.clone().unwrap();
        assert_eq!(
            content.to_parts(),
            vec![ContentPart::image_url("data:image/webp;base64,QUJD")]
        );
        assert_eq!(canonical.usage.unwrap().total_tokens, 105);
    }
}
