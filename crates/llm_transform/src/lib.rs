//! llm_transform: translates LLM API traffic between OpenAI Chat Completions,
//! OpenAI Responses, Anthropic Messages and Gemini `generateContent`, for
//! plain and streamed (SSE) exchanges.
//!
//! Every translation goes through the canonical model in [`canonical`]. A
//! gateway looks up an [`Inbound`] for the client's format and an
//! [`Outbound`] for the configured channel in a [`TransformerRegistry`], then
//! wires requests, responses, streams and errors through the pair. HTTP
//! execution, retries and routing stay with the caller.

pub mod apis;
pub mod canonical;
pub mod clients;
pub mod config;
pub mod errors;
pub mod providers;
pub mod streaming;
pub mod transforms;

pub use canonical::{FinishReason, Message, Request, Response, Usage};
pub use clients::{
    outbound_for_channel, ApiFormat, AuthConfig, HttpRequest, HttpResponse, Inbound, Outbound, TransformerRegistry,
};
pub use config::{ChannelConfig, TransformConfig};
pub use errors::{ResponseError, TransformError};
pub use providers::ProviderId;
pub use transforms::{ConvertContext, ReasoningConfig};

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const MESSAGES_PATH: &str = "/v1/messages";
pub const RESPONSES_PATH: &str = "/v1/responses";
pub const IMAGES_GENERATIONS_PATH: &str = "/v1/images/generations";
pub const IMAGES_EDITS_PATH: &str = "/v1/images/edits";
pub const GEMINI_MODELS_PREFIX: &str = "/v1beta/models/";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::sse::{parse_sse, SseEvent};
    use crate::streaming::sse_stream;
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn registry() -> TransformerRegistry {
        let config = TransformConfig {
            channels: vec![
                ChannelConfig::new("gpt", ProviderId::OpenAI, "sk-test"),
                ChannelConfig::new("claude", ProviderId::Anthropic, "sk-ant"),
            ],
            ..Default::default()
        };
        TransformerRegistry::from_config(&config).unwrap()
    }

    fn chunk(delta: Value, finish_reason: Value) -> String {
        let payload = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 7,
            "model": "gpt-4o",
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
        });
        format!("data: {}\n\n", payload)
    }

    #[test]
    fn test_anthropic_client_through_openai_channel() {
        let registry = registry();
        let inbound = registry.inbound_for_path(MESSAGES_PATH).unwrap();
        let outbound = registry.outbound("gpt").unwrap();

        let client_request = HttpRequest::inbound(
            MESSAGES_PATH,
            json!({
                "model": "gpt-4o",
                "max_tokens": 512,
                "system": "Be brief.",
                "messages": [{"role": "user", "content": "Hi"}]
            })
            .to_string(),
        );
        let canonical = inbound.transform_request(&client_request).unwrap();
        let vendor_request = outbound.transform_request(&canonical).unwrap();
        assert_eq!(vendor_request.url, "https://api.openai.com/v1/chat/completions");
        let body: Value = serde_json::from_slice(&vendor_request.body).unwrap();
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "Be brief."}));
        assert_eq!(body["messages"][1]["content"], json!("Hi"));

        let vendor_response = HttpResponse::for_request(
            &vendor_request,
            StatusCode::OK,
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 7,
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello!"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 150, "completion_tokens": 4, "total_tokens": 154,
                          "prompt_tokens_details": {"cached_tokens": 50}}
            })
            .to_string(),
        );
        let canonical = outbound.transform_response(&vendor_response).unwrap();
        let client_response = inbound.transform_response(&canonical).unwrap();
        let body: Value = serde_json::from_slice(&client_response.body).unwrap();
        assert_eq!(body["content"][0]["text"], json!("Hello!"));
        assert_eq!(body["stop_reason"], json!("end_turn"));
        assert_eq!(body["usage"]["input_tokens"], json!(100));
        assert_eq!(body["usage"]["cache_read_input_tokens"], json!(50));
    }

    #[test]
    fn test_openai_stream_reencoded_for_anthropic_client() {
        let registry = registry();
        let inbound = registry.inbound(ApiFormat::AnthropicMessages).unwrap();
        let outbound = registry.outbound("gpt").unwrap();

        let mut text = chunk(json!({"role": "assistant", "content": ""}), Value::Null);
        for piece in ["The ", "quick ", "brown ", "fox ", "jumps"] {
            text.push_str(&chunk(json!({"content": piece}), Value::Null));
        }
        text.push_str(&chunk(json!({}), json!("stop")));
        text.push_str("data: {\"id\":\"chatcmpl-1\",\"object\":\"chat.completion.chunk\",\"created\":7,\"model\":\"gpt-4o\",\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":5,\"total_tokens\":14}}\n\n");
        text.push_str("data: [DONE]\n\n");

        let canonical = outbound.transform_stream(sse_stream(parse_sse(&text)));
        let events: Vec<SseEvent> = inbound.transform_stream(canonical).collect::<Result<_, _>>().unwrap();

        let types: Vec<&str> = events.iter().filter_map(|e| e.event_type()).collect();
        assert_eq!(types.first(), Some(&"message_start"));
        assert_eq!(types.last(), Some(&"message_stop"));
        assert_eq!(types.iter().filter(|t| **t == "message_stop").count(), 1);
        assert_eq!(types.iter().filter(|t| **t == "content_block_delta").count(), 5);

        let (body, usage) = inbound.aggregate_stream_chunks(&events).unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["content"][0]["text"], json!("The quick brown fox jumps"));
        assert_eq!(body["stop_reason"], json!("end_turn"));
        assert_eq!(usage.unwrap().total_tokens, 14);
    }

    #[test]
    fn test_upstream_error_reaches_client_in_its_envelope() {
        let registry = registry();
        let inbound = registry.inbound(ApiFormat::OpenAIChatCompletions).unwrap();
        let outbound = registry.outbound("claude").unwrap();

        let vendor_response = HttpResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"Slow down"}}"#,
        );
        let err = outbound.transform_response(&vendor_response).unwrap_err();
        let client_response = inbound.transform_error(&err);
        assert_eq!(client_response.status, StatusCode::TOO_MANY_REQUESTS);
        let body: Value = serde_json::from_slice(&client_response.body).unwrap();
        assert_eq!(body["error"]["message"], json!("Slow down"));
        assert_eq!(body["error"]["type"], json!("rate_limit_error"));
    }
}
