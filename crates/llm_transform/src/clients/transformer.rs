//! Inbound and outbound transformers, and the registry that holds them.
//!
//! An [`Inbound`] speaks the client's protocol: it turns the client's HTTP
//! request into a canonical [`Request`] and renders canonical responses,
//! streams and errors back in that protocol. An [`Outbound`] speaks a
//! channel's protocol in the opposite direction. A gateway handler pairs one
//! of each:
//!
//! ```text
//! client ──HttpRequest──▶ Inbound ──Request──▶ Outbound ──HttpRequest──▶ vendor
//! client ◀─HttpResponse── Inbound ◀─Response── Outbound ◀─HttpResponse── vendor
//! ```

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

use crate::apis::sse::SseEvent;
use crate::canonical::{Request, Response, Usage};
use crate::clients::anthropic::{AnthropicInbound, AnthropicOutbound};
use crate::clients::endpoints::ApiFormat;
use crate::clients::gemini::{GeminiInbound, GeminiOutbound};
use crate::clients::http::{HttpRequest, HttpResponse, APPLICATION_JSON};
use crate::clients::openai::{OpenAIInbound, OpenAIOutbound};
use crate::clients::responses::{ResponsesInbound, ResponsesOutbound};
use crate::config::{ChannelConfig, TransformConfig};
use crate::errors::{ResponseError, TransformError};
use crate::providers::ProviderId;
use crate::streaming::{run_to_end, CanonicalStream, ResponseAggregator, SseStream, StreamBuffer, TranscodeStream};
use crate::transforms::ReasoningConfig;

/// The client-facing side of a translation.
pub trait Inbound: Send + Sync {
    fn api_format(&self) -> ApiFormat;

    fn transform_request(&self, request: &HttpRequest) -> Result<Request, TransformError>;

    fn transform_response(&self, response: &Response) -> Result<HttpResponse, TransformError>;

    /// Re-encodes a canonical stream as this format's SSE events.
    fn transform_stream<'a>(&self, stream: CanonicalStream<'a>) -> SseStream<'a>;

    /// Folds this format's own SSE events into its non-streaming body.
    fn aggregate_stream_chunks(&self, events: &[SseEvent]) -> Result<(Bytes, Option<Usage>), TransformError>;

    /// Renders an error in this format's envelope.
    fn transform_error(&self, error: &TransformError) -> HttpResponse;
}

/// The vendor-facing side of a translation, bound to one channel.
pub trait Outbound: Send + Sync {
    fn api_format(&self) -> ApiFormat;

    fn provider(&self) -> ProviderId;

    fn transform_request(&self, request: &Request) -> Result<HttpRequest, TransformError>;

    fn transform_response(&self, response: &HttpResponse) -> Result<Response, TransformError>;

    /// Decodes the vendor's SSE events into canonical chunks.
    fn transform_stream<'a>(&self, stream: SseStream<'a>) -> CanonicalStream<'a>;

    fn aggregate_stream_chunks(&self, events: &[SseEvent]) -> Result<Response, TransformError>;

    fn transform_error(&self, response: &HttpResponse) -> TransformError {
        TransformError::Upstream(ResponseError::from_upstream(response.status.as_u16(), &response.body))
    }
}

// ============================================================================
// Shared plumbing for the vendor façades
// ============================================================================

/// Parses a client request body.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, TransformError> {
    Ok(serde_json::from_slice(body)?)
}

/// Parses a vendor response body after mapping error statuses.
pub(crate) fn parse_upstream<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, TransformError> {
    response.error_for_status()?;
    serde_json::from_slice(&response.body).map_err(|e| {
        TransformError::Upstream(ResponseError::new(
            502,
            format!("malformed upstream response: {}", e),
            "api_error",
        ))
    })
}

pub(crate) fn json_body<T: Serialize>(payload: &T) -> Result<Bytes, TransformError> {
    Ok(Bytes::from(serde_json::to_vec(payload)?))
}

/// An error envelope with the status implied by `error`.
pub(crate) fn error_envelope<T: Serialize>(error: &TransformError, envelope: &T) -> HttpResponse {
    let body = serde_json::to_vec(envelope).unwrap_or_default();
    let mut response = HttpResponse::new(error.status_code(), body);
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    response
}

pub(crate) fn encode_stream<'a, B>(stream: CanonicalStream<'a>, encoder: B) -> SseStream<'a>
where
    B: StreamBuffer<Input = Response, Output = SseEvent> + Send + 'a,
{
    Box::new(TranscodeStream::new(stream, encoder))
}

pub(crate) fn decode_stream<'a, B>(stream: SseStream<'a>, decoder: B) -> CanonicalStream<'a>
where
    B: StreamBuffer<Input = SseEvent, Output = Response> + Send + 'a,
{
    Box::new(TranscodeStream::new(stream, decoder))
}

/// Decodes a complete event list and aggregates it into one response.
pub(crate) fn decode_and_aggregate<B>(mut decoder: B, events: &[SseEvent]) -> Result<Response, TransformError>
where
    B: StreamBuffer<Input = SseEvent, Output = Response>,
{
    let chunks = run_to_end(&mut decoder, events.iter().cloned())?;
    let mut aggregator = ResponseAggregator::new();
    for chunk in &chunks {
        aggregator.push(chunk)?;
    }
    debug!("aggregated {} stream chunk(s) from {} event(s)", chunks.len(), events.len());
    Ok(aggregator.finalize())
}

// ============================================================================
// Registry
// ============================================================================

/// Builds the outbound transformer for a configured channel.
pub fn outbound_for_channel(channel: &ChannelConfig, reasoning: &ReasoningConfig) -> Box<dyn Outbound> {
    let channel = channel.clone();
    match channel.format() {
        ApiFormat::OpenAIChatCompletions => Box::new(OpenAIOutbound::new(channel, reasoning)),
        ApiFormat::OpenAIResponses => Box::new(ResponsesOutbound::new(channel, reasoning)),
        ApiFormat::AnthropicMessages => Box::new(AnthropicOutbound::new(channel, reasoning)),
        ApiFormat::GeminiGenerateContent => Box::new(GeminiOutbound::new(channel, reasoning)),
    }
}

/// Inbound transformers keyed by format and outbound ones keyed by channel
/// name. Built once, then shared by reference.
pub struct TransformerRegistry {
    inbound: HashMap<ApiFormat, Box<dyn Inbound>>,
    outbound: HashMap<String, Box<dyn Outbound>>,
}

impl TransformerRegistry {
    pub fn builder() -> TransformerRegistryBuilder {
        TransformerRegistryBuilder::default()
    }

    /// Every inbound format plus one outbound per configured channel.
    pub fn from_config(config: &TransformConfig) -> Result<Self, TransformError> {
        config.validate()?;
        let mut builder = Self::builder().with_default_inbounds(&config.reasoning);
        for channel in &config.channels {
            builder = builder.outbound(channel.name.clone(), outbound_for_channel(channel, &config.reasoning));
        }
        Ok(builder.build())
    }

    pub fn inbound(&self, format: ApiFormat) -> Result<&dyn Inbound, TransformError> {
        self.inbound
            .get(&format)
            .map(|inbound| inbound.as_ref())
            .ok_or_else(|| TransformError::unsupported(format!("no inbound transformer for {}", format)))
    }

    /// The inbound transformer for a client request path.
    pub fn inbound_for_path(&self, path: &str) -> Result<&dyn Inbound, TransformError> {
        let format = ApiFormat::from_endpoint(path)
            .ok_or_else(|| TransformError::unsupported(format!("unsupported endpoint: {}", path)))?;
        self.inbound(format)
    }

    pub fn outbound(&self, channel: &str) -> Result<&dyn Outbound, TransformError> {
        self.outbound
            .get(channel)
            .map(|outbound| outbound.as_ref())
            .ok_or_else(|| TransformError::InvalidModel(format!("unknown channel: {}", channel)))
    }

    pub fn channels(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.outbound.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Default)]
pub struct TransformerRegistryBuilder {
    inbound: HashMap<ApiFormat, Box<dyn Inbound>>,
    outbound: HashMap<String, Box<dyn Outbound>>,
}

impl TransformerRegistryBuilder {
    pub fn inbound(mut self, inbound: Box<dyn Inbound>) -> Self {
        self.inbound.insert(inbound.api_format(), inbound);
        self
    }

    pub fn outbound(mut self, channel: impl Into<String>, outbound: Box<dyn Outbound>) -> Self {
        self.outbound.insert(channel.into(), outbound);
        self
    }

    pub fn with_default_inbounds(self, reasoning: &ReasoningConfig) -> Self {
        self.inbound(Box::new(OpenAIInbound::new(reasoning)))
            .inbound(Box::new(ResponsesInbound::new(reasoning)))
            .inbound(Box::new(AnthropicInbound::new(reasoning)))
            .inbound(Box::new(GeminiInbound::new(reasoning)))
    }

    pub fn build(self) -> TransformerRegistry {
        info!(
            "transformer registry: {} inbound format(s), {} channel(s)",
            self.inbound.len(),
            self.outbound.len()
        );
        TransformerRegistry {
            inbound: self.inbound,
            outbound: self.outbound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> TransformerRegistry {
        let config = TransformConfig {
            channels: vec![
                ChannelConfig::new("claude", ProviderId::Anthropic, "k1"),
                ChannelConfig::new("ds", ProviderId::Deepseek, "k2"),
                ChannelConfig::new("flash", ProviderId::Gemini, "k3"),
                ChannelConfig::new("gpt", ProviderId::OpenAI, "k4").with_format(ApiFormat::OpenAIResponses),
            ],
            ..Default::default()
        };
        TransformerRegistry::from_config(&config).unwrap()
    }

    #[test]
    fn test_registry_lookups() {
        let registry = registry();
        assert_eq!(registry.channels(), vec!["claude", "ds", "flash", "gpt"]);
        assert_eq!(registry.outbound("claude").unwrap().api_format(), ApiFormat::AnthropicMessages);
        assert_eq!(registry.outbound("ds").unwrap().provider(), ProviderId::Deepseek);
        assert_eq!(registry.outbound("gpt").unwrap().api_format(), ApiFormat::OpenAIResponses);
        assert_eq!(
            registry.inbound_for_path("/v1beta/models/x:generateContent").unwrap().api_format(),
            ApiFormat::GeminiGenerateContent
        );
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = registry();
        assert!(matches!(registry.outbound("nope"), Err(TransformError::InvalidModel(_))));
        assert!(matches!(
            registry.inbound_for_path("/v1/embeddings"),
            Err(TransformError::UnsupportedOperation(_))
        ));
        let empty = TransformerRegistry::builder().build();
        assert!(matches!(
            empty.inbound(ApiFormat::OpenAIChatCompletions),
            Err(TransformError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_outbound_transform_error_is_upstream() {
        let registry = registry();
        let response = HttpResponse::new(
            http::StatusCode::SERVICE_UNAVAILABLE,
            r#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#,
        );
        match registry.outbound("claude").unwrap().transform_error(&response) {
            TransformError::Upstream(err) => {
                assert_eq!(err.status_code, 503);
                assert_eq!(err.error_type(), "overloaded_error");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
