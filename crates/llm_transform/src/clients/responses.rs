use bytes::Bytes;
use http::StatusCode;

use crate::apis::openai::OpenAIErrorResponse;
use crate::apis::openai_responses::{ResponsesRequest, ResponsesResponse};
use crate::apis::sse::SseEvent;
use crate::canonical::{Request, Response, Usage};
use crate::clients::endpoints::ApiFormat;
use crate::clients::http::{HttpRequest, HttpResponse, OUTBOUND_MODEL, TEXT_EVENT_STREAM};
use crate::clients::openai::openai_family_auth;
use crate::clients::transformer::{
    decode_and_aggregate, decode_stream, encode_stream, error_envelope, json_body, parse_body, parse_upstream,
    Inbound, Outbound,
};
use crate::config::ChannelConfig;
use crate::errors::TransformError;
use crate::providers::ProviderId;
use crate::streaming::responses::{ResponsesStreamDecoder, ResponsesStreamEncoder};
use crate::streaming::{CanonicalStream, SseStream};
use crate::transforms::{responses, ConvertContext, ReasoningConfig};
use crate::RESPONSES_PATH;

#[derive(Debug, Clone)]
pub struct ResponsesInbound {
    ctx: ConvertContext,
}

impl ResponsesInbound {
    pub fn new(reasoning: &ReasoningConfig) -> Self {
        ResponsesInbound {
            ctx: ConvertContext::new(ProviderId::OpenAI).with_reasoning(reasoning.clone()),
        }
    }
}

impl Inbound for ResponsesInbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::OpenAIResponses
    }

    fn transform_request(&self, request: &HttpRequest) -> Result<Request, TransformError> {
        let body: ResponsesRequest = parse_body(&request.body)?;
        responses::request_to_canonical(body)
    }

    fn transform_response(&self, response: &Response) -> Result<HttpResponse, TransformError> {
        if let Some(error) = &response.error {
            return Ok(self.transform_error(&TransformError::Upstream(error.clone())));
        }
        let body = responses::response_from_canonical(response, &self.ctx)?;
        HttpResponse::json(StatusCode::OK, &body)
    }

    fn transform_stream<'a>(&self, stream: CanonicalStream<'a>) -> SseStream<'a> {
        encode_stream(stream, ResponsesStreamEncoder::new())
    }

    fn aggregate_stream_chunks(&self, events: &[SseEvent]) -> Result<(Bytes, Option<Usage>), TransformError> {
        let response = decode_and_aggregate(ResponsesStreamDecoder::new(), events)?;
        let body = responses::response_from_canonical(&response, &self.ctx)?;
        Ok((json_body(&body)?, response.usage))
    }

    fn transform_error(&self, error: &TransformError) -> HttpResponse {
        error_envelope(error, &OpenAIErrorResponse::from(&error.to_response_error()))
    }
}

/// Responses API channel (OpenAI or Azure).
#[derive(Debug, Clone)]
pub struct ResponsesOutbound {
    channel: ChannelConfig,
    ctx: ConvertContext,
}

impl ResponsesOutbound {
    pub fn new(channel: ChannelConfig, reasoning: &ReasoningConfig) -> Self {
        let ctx = channel.convert_context(reasoning);
        ResponsesOutbound { channel, ctx }
    }
}

impl Outbound for ResponsesOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::OpenAIResponses
    }

    fn provider(&self) -> ProviderId {
        self.channel.provider
    }

    fn transform_request(&self, request: &Request) -> Result<HttpRequest, TransformError> {
        let body = responses::request_from_canonical(request, &self.ctx)?;
        let http_request = HttpRequest::post_json(self.channel.base_url(), RESPONSES_PATH, &body)?
            .with_auth(openai_family_auth(&self.channel))
            .with_metadata(OUTBOUND_MODEL, request.model.clone());
        if request.is_streaming() {
            return http_request.with_header("accept", TEXT_EVENT_STREAM);
        }
        Ok(http_request)
    }

    fn transform_response(&self, response: &HttpResponse) -> Result<Response, TransformError> {
        let body: ResponsesResponse = parse_upstream(response)?;
        responses::response_to_canonical(body, &self.ctx)
    }

    fn transform_stream<'a>(&self, stream: SseStream<'a>) -> CanonicalStream<'a> {
        decode_stream(stream, ResponsesStreamDecoder::new())
    }

    fn aggregate_stream_chunks(&self, events: &[SseEvent]) -> Result<Response, TransformError> {
        decode_and_aggregate(ResponsesStreamDecoder::new(), events)
    }
}
