use bytes::Bytes;
use http::StatusCode;

use crate::apis::anthropic::{AnthropicErrorResponse, MessagesRequest, MessagesResponse, DEFAULT_ANTHROPIC_VERSION};
use crate::apis::sse::SseEvent;
use crate::canonical::{Request, Response, Usage};
use crate::clients::endpoints::ApiFormat;
use crate::clients::http::{AuthConfig, HttpRequest, HttpResponse, OUTBOUND_MODEL, TEXT_EVENT_STREAM};
use crate::clients::transformer::{
    decode_and_aggregate, decode_stream, encode_stream, error_envelope, json_body, parse_body, parse_upstream,
    Inbound, Outbound,
};
use crate::config::ChannelConfig;
use crate::errors::TransformError;
use crate::providers::ProviderId;
use crate::streaming::anthropic::{MessagesStreamDecoder, MessagesStreamEncoder};
use crate::streaming::{CanonicalStream, SseStream};
use crate::transforms::{anthropic, ConvertContext, ReasoningConfig};
use crate::MESSAGES_PATH;

const API_KEY_HEADER: &str = "x-api-key";
const VERSION_HEADER: &str = "anthropic-version";

#[derive(Debug, Clone)]
pub struct AnthropicInbound {
    ctx: ConvertContext,
}

impl AnthropicInbound {
    pub fn new(reasoning: &ReasoningConfig) -> Self {
        AnthropicInbound {
            ctx: ConvertContext::new(ProviderId::Anthropic).with_reasoning(reasoning.clone()),
        }
    }
}

impl Inbound for AnthropicInbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::AnthropicMessages
    }

    fn transform_request(&self, request: &HttpRequest) -> Result<Request, TransformError> {
        let body: MessagesRequest = parse_body(&request.body)?;
        anthropic::request_to_canonical(body)
    }

    fn transform_response(&self, response: &Response) -> Result<HttpResponse, TransformError> {
        if let Some(error) = &response.error {
            return Ok(self.transform_error(&TransformError::Upstream(error.clone())));
        }
        let body = anthropic::response_from_canonical(response, &self.ctx)?;
        HttpResponse::json(StatusCode::OK, &body)
    }

    fn transform_stream<'a>(&self, stream: CanonicalStream<'a>) -> SseStream<'a> {
        encode_stream(stream, MessagesStreamEncoder::new(self.ctx.clone()))
    }

    fn aggregate_stream_chunks(&self, events: &[SseEvent]) -> Result<(Bytes, Option<Usage>), TransformError> {
        let response = decode_and_aggregate(MessagesStreamDecoder::new(self.ctx.clone()), events)?;
        let body = anthropic::response_from_canonical(&response, &self.ctx)?;
        Ok((json_body(&body)?, response.usage))
    }

    fn transform_error(&self, error: &TransformError) -> HttpResponse {
        error_envelope(error, &AnthropicErrorResponse::from(&error.to_response_error()))
    }
}

/// Messages API channel. Besides Anthropic itself this serves the
/// Anthropic-compatible endpoints some vendors expose; the channel's provider
/// decides how cache tokens are counted.
#[derive(Debug, Clone)]
pub struct AnthropicOutbound {
    channel: ChannelConfig,
    ctx: ConvertContext,
}

impl AnthropicOutbound {
    pub fn new(channel: ChannelConfig, reasoning: &ReasoningConfig) -> Self {
        let ctx = channel.convert_context(reasoning);
        AnthropicOutbound { channel, ctx }
    }
}

impl Outbound for AnthropicOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::AnthropicMessages
    }

    fn provider(&self) -> ProviderId {
        self.channel.provider
    }

    fn transform_request(&self, request: &Request) -> Result<HttpRequest, TransformError> {
        let body = anthropic::request_from_canonical(request, &self.ctx)?;
        let version = self.channel.api_version.as_deref().unwrap_or(DEFAULT_ANTHROPIC_VERSION);
        let http_request = HttpRequest::post_json(self.channel.base_url(), MESSAGES_PATH, &body)?
            .with_auth(AuthConfig::api_key_header(API_KEY_HEADER, self.channel.api_key.clone()))
            .with_header(VERSION_HEADER, version)?
            .with_metadata(OUTBOUND_MODEL, request.model.clone());
        if request.is_streaming() {
            return http_request.with_header("accept", TEXT_EVENT_STREAM);
        }
        Ok(http_request)
    }

    fn transform_response(&self, response: &HttpResponse) -> Result<Response, TransformError> {
        let body: MessagesResponse = parse_upstream(response)?;
        anthropic::response_to_canonical(body, &self.ctx)
    }

    fn transform_stream<'a>(&self, stream: SseStream<'a>) -> CanonicalStream<'a> {
        decode_stream(stream, MessagesStreamDecoder::new(self.ctx.clone()))
    }

    fn aggregate_stream_chunks(&self, events: &[SseEvent]) -> Result<Response, TransformError> {
        decode_and_aggregate(MessagesStreamDecoder::new(self.ctx.clone()), events)
    }
}
