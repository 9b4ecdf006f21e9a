use log::{debug, warn};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::apis::gemini::{
    Blob, Candidate, Content, FileData, FunctionCall, FunctionCallingConfig, FunctionDeclaration,
    FunctionResponse, GeminiTool, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part, ThinkingConfig, ToolConfig, ROLE_MODEL, ROLE_USER,
};
use crate::canonical::metadata::{
    GEMINI_INCLUDE_THOUGHTS, GEMINI_RESPONSE_MODALITIES, GEMINI_SAFETY_SETTINGS,
};
use crate::canonical::request::{TOOL_CHOICE_AUTO, TOOL_CHOICE_NONE, TOOL_CHOICE_REQUIRED};
use crate::canonical::{
    ContentPart, FinishReason, ImageUrl, JsonSchema, Message, MessageContent, ReasoningEffort,
    Request, Response, ResponseFormat, Role, Tool, ToolCall, ToolChoice, TransformerMetadata,
};
use crate::errors::TransformError;
use crate::transforms::lib::*;
use crate::transforms::{usage, ConvertContext};

const MODE_AUTO: &str = "AUTO";
const MODE_ANY: &str = "ANY";
const MODE_NONE: &str = "NONE";
const JSON_MIME_TYPE: &str = "application/json";
/// Key used to wrap plain-text tool results into a function response object.
const OUTPUT_KEY: &str = "output";

// ============================================================================
// REQUEST: GEMINI -> CANONICAL
// ============================================================================

/// Gemini carries the model and the streaming flag in the URL, not the body.
pub fn request_to_canonical(
    req: GenerateContentRequest,
    model: &str,
    stream: bool,
) -> Result<Request, TransformError> {
    let mut metadata = TransformerMetadata::new();
    let mut messages = Vec::new();

    if let Some(system) = req.system_instruction {
        let text = parts_text(&system.parts);
        if !text.is_empty() {
            messages.push(Message::system(text));
        }
    }

    let mut pending_ids: HashMap<String, VecDeque<String>> = HashMap::new();
    for (turn, content) in req.contents.into_iter().enumerate() {
        if content.role.as_deref() == Some(ROLE_MODEL) {
            messages.push(model_content_to_canonical(content.parts, &mut pending_ids));
        } else {
            messages.extend(user_content_to_canonical(
                content.parts,
                turn as u32,
                &mut pending_ids,
            ));
        }
    }

    let mut request = Request {
        model: model.to_string(),
        messages,
        stream: stream.then_some(true),
        ..Default::default()
    };

    if let Some(config) = req.generation_config {
        apply_generation_config(&mut request, config, &mut metadata);
    }

    let tools: Vec<Tool> = req
        .tools
        .into_iter()
        .flatten()
        .flat_map(|tool| {
            if tool.google_search.is_some() || tool.code_execution.is_some() {
                warn!("dropping built-in Gemini tool with no canonical equivalent");
            }
            tool.function_declarations.unwrap_or_default()
        })
        .map(|decl| {
            let parameters = decl
                .parameters
                .or(decl.parameters_json_schema)
                .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
            Tool::function(decl.name, decl.description, parameters)
        })
        .collect();
    if !tools.is_empty() {
        request.tools = Some(tools);
    }

    request.tool_choice = req
        .tool_config
        .and_then(|config| config.function_calling_config)
        .and_then(tool_choice_to_canonical);

    if let Some(safety) = req.safety_settings {
        metadata.insert(&GEMINI_SAFETY_SETTINGS, safety);
    }
    request.transformer_metadata = metadata;
    request.validate()?;
    Ok(request)
}

fn parts_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_thought())
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}

fn user_content_to_canonical(
    parts: Vec<Part>,
    turn: u32,
    pending_ids: &mut HashMap<String, VecDeque<String>>,
) -> Vec<Message> {
    let mut results = Vec::new();
    let mut content = Vec::new();

    for part in parts {
        if let Some(response) = part.function_response {
            let id = response
                .id
                .or_else(|| pending_ids.get_mut(&response.name).and_then(VecDeque::pop_front))
                .unwrap_or_else(|| generate_id("call_"));
            let mut result = Message::tool(id, function_response_text(&response.response));
            result.name = Some(response.name);
            result.message_index = Some(turn);
            results.push(result);
        } else if let Some(text) = part.text {
            content.push(ContentPart::text(text));
        } else if let Some(blob) = part.inline_data {
            content.push(ContentPart::image_url(to_data_url(&blob.mime_type, &blob.data)));
        } else if let Some(file) = part.file_data {
            content.push(ContentPart::image_url(file.file_uri));
        } else {
            debug!("ignoring user part with no canonical equivalent");
        }
    }

    if !content.is_empty() {
        let content = match content.as_slice() {
            [ContentPart::Text { text, .. }] => MessageContent::Text(text.clone()),
            _ => MessageContent::Parts(content),
        };
        results.push(Message::user(content));
    }
    results
}

pub(crate) fn model_content_to_canonical(
    parts: Vec<Part>,
    pending_ids: &mut HashMap<String, VecDeque<String>>,
) -> Message {
    let mut message = Message {
        role: Role::Assistant,
        ..Default::default()
    };
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    for part in parts {
        if part.thought_signature.is_some() && message.reasoning_signature.is_none() {
            message.reasoning_signature = part.thought_signature.clone();
        }
        if let Some(call) = part.function_call {
            let id = match call.id {
                Some(id) => id,
                None => {
                    let id = generate_id("call_");
                    pending_ids
                        .entry(call.name.clone())
                        .or_default()
                        .push_back(id.clone());
                    id
                }
            };
            let arguments = call.args.as_ref().map(arguments_to_string).unwrap_or_else(|| "{}".to_string());
            tool_calls.push(ToolCall::new(id, call.name, arguments));
        } else if let Some(t) = part.text {
            if part.thought.unwrap_or(false) {
                reasoning.push_str(&t);
            } else {
                text.push_str(&t);
            }
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

fn function_response_text(response: &Value) -> String {
    match response {
        Value::String(text) => text.clone(),
        Value::Object(map) if map.len() == 1 => match map.get(OUTPUT_KEY) {
            Some(Value::String(text)) => text.clone(),
            _ => response.to_string(),
        },
        other => other.to_string(),
    }
}

fn apply_generation_config(
    request: &mut Request,
    config: GenerationConfig,
    metadata: &mut TransformerMetadata,
) {
    request.temperature = config.temperature;
    request.top_p = config.top_p;
    request.top_k = config.top_k;
    request.max_tokens = config.max_output_tokens;
    request.stop = config.stop_sequences;
    request.n = config.candidate_count;
    request.presence_penalty = config.presence_penalty;
    request.frequency_penalty = config.frequency_penalty;
    request.seed = config.seed;
    request.logprobs = config.response_logprobs;
    request.top_logprobs = config.logprobs;

    if config.response_mime_type.as_deref() == Some(JSON_MIME_TYPE) {
        let schema = config.response_json_schema.or(config.response_schema);
        request.response_format = Some(match schema {
            Some(schema) => ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: Some(JsonSchema {
                    name: "response".to_string(),
                    description: None,
                    schema: Some(schema),
                    strict: None,
                }),
            },
            None => ResponseFormat {
                format_type: "json_object".to_string(),
                json_schema: None,
            },
        });
    }

    if let Some(modalities) = config.response_modalities {
        metadata.insert(&GEMINI_RESPONSE_MODALITIES, modalities);
    }
    if let Some(thinking) = config.thinking_config {
        if let Some(include) = thinking.include_thoughts {
            metadata.insert(&GEMINI_INCLUDE_THOUGHTS, include);
        }
        request.reasoning_budget = thinking
            .thinking_budget
            .and_then(|budget| u32::try_from(budget).ok());
        request.reasoning_effort = thinking
            .thinking_level
            .as_deref()
            .and_then(ReasoningEffort::parse);
    }
}

fn tool_choice_to_canonical(config: FunctionCallingConfig) -> Option<ToolChoice> {
    let mode = config.mode?;
    Some(match mode.as_str() {
        MODE_NONE => ToolChoice::mode(TOOL_CHOICE_NONE),
        MODE_ANY => match config.allowed_function_names.as_deref() {
            Some([only]) => ToolChoice::named(only.clone()),
            _ => ToolChoice::mode(TOOL_CHOICE_REQUIRED),
        },
        _ => ToolChoice::mode(TOOL_CHOICE_AUTO),
    })
}

// ============================================================================
// REQUEST: CANONICAL -> GEMINI
// ============================================================================

pub fn request_from_canonical(
    req: &Request,
    ctx: &ConvertContext,
) -> Result<GenerateContentRequest, TransformError> {
    req.validate()?;
    let metadata = &req.transformer_metadata;

    let system_text: Vec<String> = req
        .messages
        .iter()
        .filter(|msg| msg.role.is_instruction())
        .map(Message::text)
        .filter(|text| !text.is_empty())
        .collect();
    let system_instruction = (!system_text.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part::text(system_text.join("\n"))],
    });

    let declarations: Vec<FunctionDeclaration> = req
        .function_tools()
        .filter_map(|tool| tool.function.as_ref())
        .map(|function| FunctionDeclaration {
            name: function.name.clone(),
            description: function.description.clone(),
            parameters: function.parameters.clone(),
            parameters_json_schema: None,
        })
        .collect();

    let tool_config = if declarations.is_empty() {
        None
    } else {
        req.tool_choice.as_ref().map(tool_config_from_canonical)
    };

    Ok(GenerateContentRequest {
        contents: contents_from_canonical(&req.messages),
        system_instruction,
        generation_config: generation_config_from_canonical(req, ctx),
        tools: (!declarations.is_empty()).then(|| {
            vec![GeminiTool {
                function_declarations: Some(declarations),
                ..Default::default()
            }]
        }),
        tool_config,
        safety_settings: metadata.get(&GEMINI_SAFETY_SETTINGS),
        cached_content: None,
    })
}

fn contents_from_canonical(messages: &[Message]) -> Vec<Content> {
    let call_names: HashMap<&str, &str> = messages
        .iter()
        .flat_map(|msg| msg.tool_calls.iter().flatten())
        .map(|call| (call.id.as_str(), call.function.name.as_str()))
        .collect();

    let mut contents: Vec<Content> = Vec::new();
    let mut processed: HashSet<usize> = HashSet::new();

    for (i, msg) in messages.iter().enumerate() {
        if processed.contains(&i) || msg.role.is_instruction() {
            continue;
        }
        let content = match msg.role {
            Role::Tool => {
                let mut parts = Vec::new();
                for (j, candidate) in messages.iter().enumerate().skip(i) {
                    if candidate.role != Role::Tool || candidate.message_index != msg.message_index
                    {
                        break;
                    }
                    processed.insert(j);
                    parts.push(function_response_part(candidate, &call_names));
                }
                Content {
                    role: Some(ROLE_USER.to_string()),
                    parts,
                }
            }
            Role::Assistant => Content {
                role: Some(ROLE_MODEL.to_string()),
                parts: model_parts(msg),
            },
            _ => Content {
                role: Some(ROLE_USER.to_string()),
                parts: user_parts(msg),
            },
        };
        processed.insert(i);
        if content.parts.is_empty() {
            debug!("skipping empty {:?} message at {}", msg.role, i);
            continue;
        }
        match contents.last_mut() {
            Some(last) if last.role == content.role => last.parts.extend(content.parts),
            _ => contents.push(content),
        }
    }
    contents
}

fn function_response_part(msg: &Message, call_names: &HashMap<&str, &str>) -> Part {
    let id = msg.tool_call_id.clone().unwrap_or_default();
    let name = msg
        .name
        .clone()
        .or_else(|| call_names.get(id.as_str()).map(|name| name.to_string()))
        .unwrap_or_default();
    let text = msg.text();
    let response = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => {
            let mut map = Map::new();
            map.insert(OUTPUT_KEY.to_string(), Value::String(text));
            Value::Object(map)
        }
    };
    Part {
        function_response: Some(FunctionResponse {
            id: None,
            name,
            response,
        }),
        ..Default::default()
    }
}

fn user_parts(msg: &Message) -> Vec<Part> {
    msg.content
        .iter()
        .flat_map(MessageContent::to_parts)
        .filter_map(|part| match part {
            ContentPart::Text { text, .. } => Some(Part::text(text)),
            ContentPart::ImageUrl { image_url, .. } => Some(image_part(&image_url)),
            ContentPart::InputAudio { input_audio } => Some(Part {
                inline_data: Some(Blob {
                    mime_type: format!("audio/{}", input_audio.format),
                    data: input_audio.data,
                }),
                ..Default::default()
            }),
        })
        .collect()
}

fn image_part(image_url: &ImageUrl) -> Part {
    match parse_data_url(&image_url.url) {
        Some((mime_type, data)) => Part {
            inline_data: Some(Blob { mime_type, data }),
            ..Default::default()
        },
        None => Part {
            file_data: Some(FileData {
                mime_type: None,
                file_uri: image_url.url.clone(),
            }),
            ..Default::default()
        },
    }
}

/// Text then function calls; the thought signature rides on the first call
/// when there is one, otherwise on the first text part.
pub(crate) fn model_parts(msg: &Message) -> Vec<Part> {
    let mut parts: Vec<Part> = msg
        .content
        .iter()
        .flat_map(MessageContent::to_parts)
        .filter_map(|part| match part {
            ContentPart::Text { text, .. } if !text.is_empty() => Some(Part::text(text)),
            ContentPart::ImageUrl { image_url, .. } => Some(image_part(&image_url)),
            _ => None,
        })
        .collect();
    let first_call = parts.len();
    for call in msg.tool_calls.iter().flatten() {
        parts.push(Part {
            function_call: Some(FunctionCall {
                id: None,
                name: call.function.name.clone(),
                args: Some(parse_tool_arguments(&call.function.arguments)),
            }),
            ..Default::default()
        });
    }
    if let Some(signature) = &msg.reasoning_signature {
        let target = if first_call < parts.len() { first_call } else { 0 };
        if let Some(part) = parts.get_mut(target) {
            part.thought_signature = Some(signature.clone());
        }
    }
    parts
}

fn generation_config_from_canonical(req: &Request, ctx: &ConvertContext) -> Option<GenerationConfig> {
    let metadata = &req.transformer_metadata;
    let budget = ctx
        .reasoning
        .resolve_budget(req.reasoning_budget, req.reasoning_effort);
    let include_thoughts = metadata.get(&GEMINI_INCLUDE_THOUGHTS);
    let thinking_config = (budget.is_some() || include_thoughts.is_some()).then(|| ThinkingConfig {
        include_thoughts: include_thoughts.or(budget.filter(|b| *b > 0).map(|_| true)),
        thinking_budget: budget.map(|b| i32::try_from(b).unwrap_or(i32::MAX)),
        thinking_level: None,
    });

    let (response_mime_type, response_json_schema) = match &req.response_format {
        Some(format) if format.format_type == "json_schema" => (
            Some(JSON_MIME_TYPE.to_string()),
            format.json_schema.as_ref().and_then(|s| s.schema.clone()),
        ),
        Some(format) if format.format_type == "json_object" => {
            (Some(JSON_MIME_TYPE.to_string()), None)
        }
        _ => (None, None),
    };

    let config = GenerationConfig {
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        max_output_tokens: req.output_token_limit(),
        stop_sequences: req.stop.clone(),
        candidate_count: req.n,
        presence_penalty: req.presence_penalty,
        frequency_penalty: req.frequency_penalty,
        seed: req.seed,
        response_mime_type,
        response_schema: None,
        response_json_schema,
        response_modalities: metadata.get(&GEMINI_RESPONSE_MODALITIES),
        response_logprobs: req.logprobs,
        logprobs: req.top_logprobs,
        thinking_config,
    };
    (config != GenerationConfig::default()).then_some(config)
}

fn tool_config_from_canonical(choice: &ToolChoice) -> ToolConfig {
    let (mode, allowed) = match choice {
        ToolChoice::Named(named) => (MODE_ANY, Some(vec![named.function.name.clone()])),
        ToolChoice::Mode(mode) => match mode.as_str() {
            TOOL_CHOICE_NONE => (MODE_NONE, None),
            TOOL_CHOICE_REQUIRED => (MODE_ANY, None),
            _ => (MODE_AUTO, None),
        },
    };
    ToolConfig {
        function_calling_config: Some(FunctionCallingConfig {
            mode: Some(mode.to_string()),
            allowed_function_names: allowed,
        }),
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

pub fn finish_reason_to_canonical(reason: &str, has_tool_calls: bool) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            FinishReason::ContentFilter
        }
        _ if has_tool_calls => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

pub fn finish_reason_to_gemini(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Length => "MAX_TOKENS",
        FinishReason::ContentFilter => "SAFETY",
        FinishReason::Stop | FinishReason::ToolCalls | FinishReason::FunctionCall => "STOP",
    }
}

pub fn response_to_canonical(
    resp: GenerateContentResponse,
    _ctx: &ConvertContext,
) -> Result<Response, TransformError> {
    let blocked = resp
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.get("blockReason"))
        .is_some();
    let candidate = resp.candidates.into_iter().next().unwrap_or_default();

    let mut pending_ids = HashMap::new();
    let mut message = model_content_to_canonical(
        candidate.content.map(|c| c.parts).unwrap_or_default(),
        &mut pending_ids,
    );
    if message.content.is_none() && message.tool_calls.is_none() {
        message.content = Some(MessageContent::Text(String::new()));
    }

    let finish_reason = match candidate.finish_reason.as_deref() {
        Some(reason) => Some(finish_reason_to_canonical(reason, message.has_tool_calls())),
        None if blocked => Some(FinishReason::ContentFilter),
        None => None,
    };

    Ok(Response::completion(
        resp.response_id.unwrap_or_else(|| generate_id("gen-")),
        resp.model_version.unwrap_or_default(),
        current_timestamp(),
        message,
        finish_reason,
        resp.usage_metadata.as_ref().map(usage::from_gemini),
    ))
}

pub fn response_from_canonical(
    resp: &Response,
    _ctx: &ConvertContext,
) -> Result<GenerateContentResponse, TransformError> {
    if let Some(error) = &resp.error {
        return Err(TransformError::Upstream(error.clone()));
    }
    let mut parts = Vec::new();
    if let Some(message) = resp
        .first_choice()
        .and_then(|choice| choice.message.as_ref().or(choice.delta.as_ref()))
    {
        if let Some(reasoning) = message.reasoning_content.as_ref().filter(|r| !r.is_empty()) {
            parts.push(Part {
                text: Some(reasoning.clone()),
                thought: Some(true),
                ..Default::default()
            });
        }
        parts.extend(model_parts(message));
    }

    Ok(GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some(ROLE_MODEL.to_string()),
                parts,
            }),
            finish_reason: resp
                .finish_reason()
                .map(|reason| finish_reason_to_gemini(reason).to_string()),
            index: Some(0),
            safety_ratings: None,
        }],
        prompt_feedback: None,
        usage_metadata: resp.usage.as_ref().map(usage::to_gemini),
        model_version: (!resp.model.is_empty()).then(|| resp.model.clone()),
        response_id: (!resp.id.is_empty()).then(|| resp.id.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderId;
    use pretty_assertions::assert_eq;

    fn ctx() -> ConvertContext {
        ConvertContext::new(ProviderId::Gemini)
    }

    fn sample_request() -> GenerateContentRequest {
        serde_json::from_value(json!({
            "systemInstruction": {"parts": [{"text": "Be brief."}]},
            "contents": [
                {"role": "user", "parts": [{"text": "Weather in Paris and Rome?"}]},
                {"role": "model", "parts": [
                    {"functionCall": {"name": "weather", "args": {"city": "Paris"}}, "thoughtSignature": "sig"},
                    {"functionCall": {"name": "weather", "args": {"city": "Rome"}}}
                ]},
                {"role": "user", "parts": [
                    {"functionResponse": {"name": "weather", "response": {"temp": "18C"}}},
                    {"functionResponse": {"name": "weather", "response": {"temp": "24C"}}}
                ]}
            ],
            "tools": [{"functionDeclarations": [{"name": "weather", "parameters": {"type": "object"}}]}],
            "toolConfig": {"functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": ["weather"]}},
            "generationConfig": {"maxOutputTokens": 256, "thinkingConfig": {"thinkingBudget": 2048, "includeThoughts": true}}
        }))
        .unwrap()
    }

    #[test]
    fn test_request_to_canonical_pairs_calls_and_results() {
        let canonical = request_to_canonical(sample_request(), "gemini-2.5-pro", true).unwrap();
        assert_eq!(canonical.model, "gemini-2.5-pro");
        assert!(canonical.is_streaming());
        assert_eq!(canonical.messages.len(), 5);

        let calls = canonical.messages[2].tool_calls.as_ref().unwrap();
        assert_eq!(canonical.messages[3].tool_call_id.as_deref(), Some(calls[0].id.as_str()));
        assert_eq!(canonical.messages[4].tool_call_id.as_deref(), Some(calls[1].id.as_str()));
        assert_eq!(canonical.messages[3].message_index, canonical.messages[4].message_index);
        assert_eq!(canonical.messages[2].reasoning_signature.as_deref(), Some("sig"));

        assert_eq!(canonical.tool_choice, Some(ToolChoice::named("weather")));
        assert_eq!(canonical.reasoning_budget, Some(2048));
        assert_eq!(canonical.max_tokens, Some(256));
    }

    #[test]
    fn test_request_round_trip() {
        let original = sample_request();
        let canonical = request_to_canonical(original.clone(), "gemini-2.5-pro", false).unwrap();
        let back = request_from_canonical(&canonical, &ctx()).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_zero_thinking_budget_stays_off() {
        let original: GenerateContentRequest = serde_json::from_value(json!({
            "contents": [{"role": "user", "parts": [{"text": "Hi"}]}],
            "generationConfig": {"thinkingConfig": {"thinkingBudget": 0}}
        }))
        .unwrap();
        let canonical = request_to_canonical(original.clone(), "gemini-2.5-flash", false).unwrap();
        assert_eq!(canonical.reasoning_budget, Some(0));

        let back = request_from_canonical(&canonical, &ctx()).unwrap();
        assert_eq!(
            back.generation_config.and_then(|c| c.thinking_config),
            Some(ThinkingConfig {
                include_thoughts: None,
                thinking_budget: Some(0),
                thinking_level: None,
            })
        );

        let claude = crate::transforms::anthropic::request_from_canonical(
            &canonical,
            &ConvertContext::new(ProviderId::Anthropic),
        )
        .unwrap();
        assert_eq!(claude.thinking, None);
    }

    #[test]
    fn test_openai_tool_results_grouped_with_names() {
        let req = Request {
            model: "gemini-2.5-flash".to_string(),
            messages: vec![
                Message::user("go"),
                Message {
                    role: Role::Assistant,
                    tool_calls: Some(vec![
                        ToolCall::new("call_a", "alpha", "{}"),
                        ToolCall::new("call_b", "beta", "{\"x\":1}"),
                    ]),
                    ..Default::default()
                },
                Message::tool("call_a", "plain text"),
                Message::tool("call_b", "{\"ok\":true}"),
            ],
            reasoning_effort: Some(ReasoningEffort::Medium),
            ..Default::default()
        };
        let out = request_from_canonical(&req, &ctx()).unwrap();
        assert_eq!(out.contents.len(), 3);
        let results = &out.contents[2].parts;
        assert_eq!(results.len(), 2);
        let first = results[0].function_response.as_ref().unwrap();
        assert_eq!(first.name, "alpha");
        assert_eq!(first.response, json!({"output": "plain text"}));
        assert_eq!(
            results[1].function_response.as_ref().unwrap().response,
            json!({"ok": true})
        );
        let thinking = out.generation_config.unwrap().thinking_config.unwrap();
        assert_eq!(thinking.thinking_budget, Some(15000));
    }

    #[test]
    fn test_response_round_trip() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "pondering", "thought": true},
                    {"text": "Hello"}
                ]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 19, "thoughtsTokenCount": 4},
            "modelVersion": "gemini-2.5-flash",
            "responseId": "resp-1"
        });
        let resp: GenerateContentResponse = serde_json::from_value(body.clone()).unwrap();
        let canonical = response_to_canonical(resp, &ctx()).unwrap();
        let message = canonical.message().unwrap();
        assert_eq!(message.text(), "Hello");
        assert_eq!(message.reasoning_content.as_deref(), Some("pondering"));
        assert_eq!(canonical.finish_reason(), Some(FinishReason::Stop));
        assert_eq!(canonical.usage.unwrap().completion_tokens, 9);

        let back = response_from_canonical(&canonical, &ctx()).unwrap();
        assert_eq!(serde_json::to_value(&back).unwrap(), body);
    }

    #[test]
    fn test_empty_identity_is_omitted() {
        let canonical = Response::completion("", "", 0, Message::assistant("Hi"), Some(FinishReason::Stop), None);
        let value = serde_json::to_value(response_from_canonical(&canonical, &ctx()).unwrap()).unwrap();
        assert!(value.get("responseId").is_none());
        assert!(value.get("modelVersion").is_none());
    }

    #[test]
    fn test_safety_finish_maps_to_content_filter() {
        assert_eq!(finish_reason_to_canonical("SAFETY", false), FinishReason::ContentFilter);
        assert_eq!(finish_reason_to_canonical("STOP", true), FinishReason::ToolCalls);
        assert_eq!(finish_reason_to_canonical("MAX_TOKENS", true), FinishReason::Length);
    }
}
