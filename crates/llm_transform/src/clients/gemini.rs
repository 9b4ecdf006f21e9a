use bytes::Bytes;
use http::StatusCode;

use crate::apis::gemini::{parse_model_path, GeminiApi, GeminiErrorResponse, GenerateContentRequest, GenerateContentResponse};
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
use crate::streaming::gemini::{GeminiStreamDecoder, GeminiStreamEncoder};
use crate::streaming::{CanonicalStream, SseStream};
use crate::transforms::{gemini, ConvertContext, ReasoningConfig};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct GeminiInbound {
    ctx: ConvertContext,
}

impl GeminiInbound {
    pub fn new(reasoning: &ReasoningConfig) -> Self {
        GeminiInbound {
            ctx: ConvertContext::new(ProviderId::Gemini).with_reasoning(reasoning.clone()),
        }
    }
}

impl Inbound for GeminiInbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::GeminiGenerateContent
    }

    /// The model and the streaming flag come from the request path.
    fn transform_request(&self, request: &HttpRequest) -> Result<Request, TransformError> {
        let (model, api) = parse_model_path(&request.path).ok_or_else(|| {
            TransformError::invalid_request(format!("not a generateContent path: {}", request.path))
        })?;
        let body: GenerateContentRequest = parse_body(&request.body)?;
        gemini::request_to_canonical(body, &model, api == GeminiApi::StreamGenerateContent)
    }

    fn transform_response(&self, response: &Response) -> Result<HttpResponse, TransformError> {
        if let Some(error) = &response.error {
            return Ok(self.transform_error(&TransformError::Upstream(error.clone())));
        }
        let body = gemini::response_from_canonical(response, &self.ctx)?;
        HttpResponse::json(StatusCode::OK, &body)
    }

    fn transform_stream<'a>(&self, stream: CanonicalStream<'a>) -> SseStream<'a> {
        encode_stream(stream, GeminiStreamEncoder::new())
    }

    fn aggregate_stream_chunks(&self, events: &[SseEvent]) -> Result<(Bytes, Option<Usage>), TransformError> {
        let response = decode_and_aggregate(GeminiStreamDecoder::new(), events)?;
        let body = gemini::response_from_canonical(&response, &self.ctx)?;
        Ok((json_body(&body)?, response.usage))
    }

    fn transform_error(&self, error: &TransformError) -> HttpResponse {
        error_envelope(error, &GeminiErrorResponse::from(&error.to_response_error()))
    }
}

#[derive(Debug, Clone)]
pub struct GeminiOutbound {
    channel: ChannelConfig,
    ctx: ConvertContext,
}

impl GeminiOutbound {
    pub fn new(channel: ChannelConfig, reasoning: &ReasoningConfig) -> Self {
        let ctx = channel.convert_context(reasoning);
        GeminiOutbound { channel, ctx }
    }
}

impl Outbound for GeminiOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::GeminiGenerateContent
    }

    fn provider(&self) -> ProviderId {
        self.channel.provider
    }

    fn transform_request(&self, request: &Request) -> Result<HttpRequest, TransformError> {
        let body = gemini::request_from_canonical(request, &self.ctx)?;
        let api = if request.is_streaming() {
            GeminiApi::StreamGenerateContent
        } else {
            GeminiApi::GenerateContent
        };
        let http_request = HttpRequest::post_json(self.channel.base_url(), api.path_for_model(&request.model), &body)?
            .with_auth(AuthConfig::api_key_header(API_KEY_HEADER, self.channel.api_key.clone()))
            .with_metadata(OUTBOUND_MODEL, request.model.clone());
        if request.is_streaming() {
            return http_request.with_header("accept", TEXT_EVENT_STREAM);
        }
        Ok(http_request)
    }

    fn transform_response(&self, response: &HttpResponse) -> Result<Response, TransformError> {
        let body: GenerateContentResponse = parse_upstream(response)?;
        let mut canonical = gemini::response_to_canonical(body, &self.ctx)?;
        if canonical.model.is_empty() {
            if let Some(model) = response.metadata.get(OUTBOUND_MODEL) {
                canonical.model = model.clone();
            }
        }
        Ok(canonical)
    }

    fn transform_stream<'a>(&self, stream: SseStream<'a>) -> CanonicalStream<'a> {
        decode_stream(stream, GeminiStreamDecoder::new())
    }

    fn aggregate_stream_chunks(&self, events: &[SseEvent]) -> Result<Response, TransformError> {
        decode_and_aggregate(GeminiStreamDecoder::new(), events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::{FinishReason, Message};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn outbound() -> GeminiOutbound {
        GeminiOutbound::new(
            ChannelConfig::new("flash", ProviderId::Gemini, "g-key"),
            &ReasoningConfig::default(),
        )
    }

    #[test]
    fn test_inbound_reads_model_from_path() {
        let inbound = GeminiInbound::new(&ReasoningConfig::default());
        let body = json!({"contents": [{"role": "user", "parts": [{"text": "Hi"}]}]}).to_string();

        let request = HttpRequest::inbound("/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse", body.clone());
        let canonical = inbound.transform_request(&request).unwrap();
        assert_eq!(canonical.model, "gemini-2.5-pro");
        assert!(canonical.is_streaming());

        let bad = HttpRequest::inbound("/v1/chat/completions", body);
        assert!(matches!(
            inbound.transform_request(&bad),
            Err(TransformError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_outbound_paths_and_auth() {
        let mut request = Request {
            model: "gemini-2.5-flash".to_string(),
            messages: vec![Message::user("Hi")],
            ..Default::default()
        };
        let http = outbound().transform_request(&request).unwrap();
        assert_eq!(
            http.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(http.resolved_headers().unwrap()[API_KEY_HEADER], "g-key");

        request.stream = Some(true);
        let http = outbound().transform_request(&request).unwrap();
        assert!(http.path.ends_with(":streamGenerateContent?alt=sse"));
    }

    #[test]
    fn test_outbound_response_fills_model() {
        let request = HttpRequest::default().with_metadata(OUTBOUND_MODEL, "gemini-2.5-flash");
        let body = json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 1, "totalTokenCount": 4}
        });
        let response = HttpResponse::for_request(&request, StatusCode::OK, body.to_string());
        let canonical = outbound().transform_response(&response).unwrap();
        assert_eq!(canonical.model, "gemini-2.5-flash");
        assert_eq!(canonical.message().unwrap().text(), "Hello");
        assert_eq!(canonical.finish_reason(), Some(FinishReason::Stop));
        assert_eq!(canonical.usage.unwrap().total_tokens, 4);
    }

    #[test]
    fn test_inbound_error_envelope() {
        let inbound = GeminiInbound::new(&ReasoningConfig::default());
        let http = inbound.transform_error(&TransformError::InvalidModel("unknown channel: x".to_string()));
        assert_eq!(http.status, StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(&http.body).unwrap();
        assert_eq!(body["error"]["code"], json!(404));
        assert_eq!(body["error"]["status"], json!("NOT_FOUND"));
    }
}
