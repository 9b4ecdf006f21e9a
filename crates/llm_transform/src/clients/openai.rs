use bytes::Bytes;
use http::{Method, StatusCode};
use log::debug;
use serde_json::Value;

use crate::apis::openai::{ChatCompletionsRequest, ChatCompletionsResponse, ImagesResponse, OpenAIErrorResponse};
use crate::apis::sse::SseEvent;
use crate::canonical::{ImageGenerationTool, Request, Response, Usage};
use crate::clients::endpoints::ApiFormat;
use crate::clients::http::{
    join_url, AuthConfig, HttpRequest, HttpResponse, MultipartBody, MultipartFile, OUTBOUND_FORMAT_TYPE,
    OUTBOUND_MODEL, TEXT_EVENT_STREAM,
};
use crate::clients::transformer::{
    decode_and_aggregate, decode_stream, encode_stream, error_envelope, json_body, parse_body, parse_upstream,
    Inbound, Outbound,
};
use crate::config::ChannelConfig;
use crate::errors::TransformError;
use crate::providers::ProviderId;
use crate::streaming::openai::{ChatCompletionsStreamDecoder, ChatCompletionsStreamEncoder};
use crate::streaming::{CanonicalStream, SseStream};
use crate::transforms::lib::{decode_base64, extension_for_media_type};
use crate::transforms::{openai, ConvertContext, ReasoningConfig};
use crate::{IMAGES_EDITS_PATH, IMAGES_GENERATIONS_PATH};

pub const FORMAT_CHAT_COMPLETIONS: &str = "chat_completions";
pub const FORMAT_IMAGE_GENERATION: &str = "image_generation";
pub const FORMAT_IMAGE_EDIT: &str = "image_edit";

/// Multipart field name for edit input images.
const IMAGE_FIELD: &str = "image[]";

// ============================================================================
// INBOUND
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAIInbound {
    ctx: ConvertContext,
}

impl OpenAIInbound {
    pub fn new(reasoning: &ReasoningConfig) -> Self {
        OpenAIInbound {
            ctx: ConvertContext::new(ProviderId::OpenAI).with_reasoning(reasoning.clone()),
        }
    }
}

impl Inbound for OpenAIInbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::OpenAIChatCompletions
    }

    fn transform_request(&self, request: &HttpRequest) -> Result<Request, TransformError> {
        let body: ChatCompletionsRequest = parse_body(&request.body)?;
        openai::request_to_canonical(body)
    }

    fn transform_response(&self, response: &Response) -> Result<HttpResponse, TransformError> {
        if let Some(error) = &response.error {
            return Ok(self.transform_error(&TransformError::Upstream(error.clone())));
        }
        let body = openai::response_from_canonical(response, &self.ctx)?;
        HttpResponse::json(StatusCode::OK, &body)
    }

    fn transform_stream<'a>(&self, stream: CanonicalStream<'a>) -> SseStream<'a> {
        encode_stream(stream, ChatCompletionsStreamEncoder::new())
    }

    fn aggregate_stream_chunks(&self, events: &[SseEvent]) -> Result<(Bytes, Option<Usage>), TransformError> {
        let response = decode_and_aggregate(ChatCompletionsStreamDecoder::new(), events)?;
        let body = openai::response_from_canonical(&response, &self.ctx)?;
        Ok((json_body(&body)?, response.usage))
    }

    fn transform_error(&self, error: &TransformError) -> HttpResponse {
        error_envelope(error, &OpenAIErrorResponse::from(&error.to_response_error()))
    }
}

// ============================================================================
// OUTBOUND
// ============================================================================

/// Chat Completions channel for OpenAI and OpenAI-compatible vendors. Requests
/// carrying an `image_generation` tool go to the images endpoints instead.
#[derive(Debug, Clone)]
pub struct OpenAIOutbound {
    channel: ChannelConfig,
    ctx: ConvertContext,
}

impl OpenAIOutbound {
    pub fn new(channel: ChannelConfig, reasoning: &ReasoningConfig) -> Self {
        let ctx = channel.convert_context(reasoning);
        OpenAIOutbound { channel, ctx }
    }

    fn auth(&self) -> AuthConfig {
        openai_family_auth(&self.channel)
    }

    fn image_request(&self, request: &Request, options: &ImageGenerationTool) -> Result<HttpRequest, TransformError> {
        let generation = openai::image_request_from_canonical(request, options)?;
        let inputs = openai::image_inputs(request);
        if inputs.is_empty() {
            return Ok(
                HttpRequest::post_json(self.channel.base_url(), IMAGES_GENERATIONS_PATH, &generation)?
                    .with_auth(self.auth())
                    .with_metadata(OUTBOUND_FORMAT_TYPE, FORMAT_IMAGE_GENERATION)
                    .with_metadata(OUTBOUND_MODEL, request.model.clone()),
            );
        }

        let mut form = MultipartBody::default();
        form.field("model", &generation.model);
        form.field("prompt", &generation.prompt);
        form.optional_field("n", generation.n);
        form.optional_field("size", generation.size);
        form.optional_field("quality", generation.quality);
        form.optional_field("output_format", generation.output_format);
        form.optional_field("output_compression", generation.output_compression);
        form.optional_field("background", generation.background);
        form.optional_field("moderation", generation.moderation);
        form.optional_field("user", generation.user);
        for (position, (media_type, data)) in inputs.iter().enumerate() {
            form.files.push(MultipartFile {
                field: IMAGE_FIELD.to_string(),
                filename: format!("image_{}.{}", position, extension_for_media_type(media_type)),
                content_type: media_type.clone(),
                data: Bytes::from(decode_base64(data)?),
            });
        }
        debug!("routing image request with {} input image(s) to edits", form.files.len());

        Ok(HttpRequest {
            method: Method::POST,
            url: join_url(self.channel.base_url(), IMAGES_EDITS_PATH),
            path: IMAGES_EDITS_PATH.to_string(),
            multipart: Some(form),
            ..Default::default()
        }
        .with_auth(self.auth())
        .with_metadata(OUTBOUND_FORMAT_TYPE, FORMAT_IMAGE_EDIT)
        .with_metadata(OUTBOUND_MODEL, request.model.clone()))
    }
}

/// Bearer auth, except Azure's `api-key` header.
pub(crate) fn openai_family_auth(channel: &ChannelConfig) -> AuthConfig {
    match channel.provider {
        ProviderId::AzureOpenAI => AuthConfig::api_key_header("api-key", channel.api_key.clone()),
        _ => AuthConfig::Bearer(channel.api_key.clone()),
    }
}

/// An images body has `data` and no `choices`.
fn looks_like_images(body: &[u8]) -> bool {
    serde_json::from_slice::<Value>(body)
        .map(|value| value.get("data").is_some() && value.get("choices").is_none())
        .unwrap_or(false)
}

impl Outbound for OpenAIOutbound {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::OpenAIChatCompletions
    }

    fn provider(&self) -> ProviderId {
        self.channel.provider
    }

    fn transform_request(&self, request: &Request) -> Result<HttpRequest, TransformError> {
        if let Some(tool) = request.image_generation_tool() {
            let options = tool.image_generation.clone().unwrap_or_default();
            return self.image_request(request, &options);
        }

        let body = openai::request_from_canonical(request, &self.ctx)?;
        let path = self
            .channel
            .provider
            .chat_completions_path(&request.model, self.channel.api_version.as_deref());
        let http_request = HttpRequest::post_json(self.channel.base_url(), path, &body)?
            .with_auth(self.auth())
            .with_metadata(OUTBOUND_FORMAT_TYPE, FORMAT_CHAT_COMPLETIONS)
            .with_metadata(OUTBOUND_MODEL, request.model.clone());
        if request.is_streaming() {
            return http_request.with_header("accept", TEXT_EVENT_STREAM);
        }
        Ok(http_request)
    }

    fn transform_response(&self, response: &HttpResponse) -> Result<Response, TransformError> {
        response.error_for_status()?;
        let is_images = match response.metadata.get(OUTBOUND_FORMAT_TYPE).map(String::as_str) {
            Some(FORMAT_IMAGE_GENERATION) | Some(FORMAT_IMAGE_EDIT) => true,
            Some(_) => false,
            None => looks_like_images(&response.body),
        };
        if is_images {
            let images: ImagesResponse = parse_upstream(response)?;
            let model = response.metadata.get(OUTBOUND_MODEL).cloned().unwrap_or_default();
            return openai::images_response_to_canonical(images, &model);
        }
        let body: ChatCompletionsResponse = parse_upstream(response)?;
        openai::response_to_canonical(body, &self.ctx)
    }

    fn transform_stream<'a>(&self, stream: SseStream<'a>) -> CanonicalStream<'a> {
        decode_stream(stream, ChatCompletionsStreamDecoder::new())
    }

    fn aggregate_stream_chunks(&self, events: &[SseEvent]) -> Result<Response, TransformError> {
        decode_and_aggregate(ChatCompletionsStreamDecoder::new(), events)
    }
}
