//! Supported API formats and the endpoints that carry them.
//!
//! # Examples
//!
//! ```rust
//! use llm_transform::clients::endpoints::{supported_endpoints, ApiFormat};
//!
//! assert_eq!(ApiFormat::from_endpoint("/v1/chat/completions"), Some(ApiFormat::OpenAIChatCompletions));
//! assert_eq!(
//!     ApiFormat::from_endpoint("/v1beta/models/gemini-2.5-pro:generateContent"),
//!     Some(ApiFormat::GeminiGenerateContent)
//! );
//! assert!(ApiFormat::from_endpoint("/v1/unknown").is_none());
//! assert!(supported_endpoints().contains(&"/v1/messages"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::apis::gemini::parse_model_path;
use crate::apis::{AnthropicApi, ApiDefinition, GeminiApi, OpenAIApi};
use crate::errors::TransformError;
use crate::providers::ProviderId;

/// A vendor wire protocol, as spoken by a client (inbound) or a channel (outbound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiFormat {
    #[serde(rename = "openai")]
    OpenAIChatCompletions,
    #[serde(rename = "openai_responses")]
    OpenAIResponses,
    #[serde(rename = "anthropic")]
    AnthropicMessages,
    #[serde(rename = "gemini")]
    GeminiGenerateContent,
}

impl ApiFormat {
    pub fn all() -> [ApiFormat; 4] {
        [
            ApiFormat::OpenAIChatCompletions,
            ApiFormat::OpenAIResponses,
            ApiFormat::AnthropicMessages,
            ApiFormat::GeminiGenerateContent,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFormat::OpenAIChatCompletions => "openai",
            ApiFormat::OpenAIResponses => "openai_responses",
            ApiFormat::AnthropicMessages => "anthropic",
            ApiFormat::GeminiGenerateContent => "gemini",
        }
    }

    /// Format of an inbound request path. Image endpoints are outbound-only.
    pub fn from_endpoint(endpoint: &str) -> Option<Self> {
        match OpenAIApi::from_endpoint(endpoint) {
            Some(OpenAIApi::ChatCompletions) => return Some(ApiFormat::OpenAIChatCompletions),
            Some(OpenAIApi::Responses) => return Some(ApiFormat::OpenAIResponses),
            Some(_) => return None,
            None => {}
        }
        if AnthropicApi::from_endpoint(endpoint).is_some() {
            return Some(ApiFormat::AnthropicMessages);
        }
        parse_model_path(endpoint).map(|_| ApiFormat::GeminiGenerateContent)
    }

    /// Endpoint path (a template for Gemini).
    pub fn endpoint(&self) -> &'static str {
        match self {
            ApiFormat::OpenAIChatCompletions => OpenAIApi::ChatCompletions.endpoint(),
            ApiFormat::OpenAIResponses => OpenAIApi::Responses.endpoint(),
            ApiFormat::AnthropicMessages => AnthropicApi::Messages.endpoint(),
            ApiFormat::GeminiGenerateContent => GeminiApi::GenerateContent.endpoint(),
        }
    }

    /// Native format of a provider's channel when none is configured.
    pub fn for_provider(provider: ProviderId) -> Self {
        match provider {
            ProviderId::Anthropic => ApiFormat::AnthropicMessages,
            ProviderId::Gemini => ApiFormat::GeminiGenerateContent,
            _ => ApiFormat::OpenAIChatCompletions,
        }
    }
}

impl fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.endpoint())
    }
}

impl FromStr for ApiFormat {
    type Err = TransformError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ApiFormat::all()
            .into_iter()
            .find(|format| format.as_str() == value)
            .ok_or_else(|| TransformError::unsupported(format!("unknown API format: {}", value)))
    }
}

/// Every endpoint an inbound request can arrive on.
pub fn supported_endpoints() -> Vec<&'static str> {
    let mut endpoints: Vec<&'static str> = OpenAIApi::all_variants()
        .iter()
        .filter(|api| api.supports_streaming())
        .map(|api| api.endpoint())
        .collect();
    endpoints.extend(AnthropicApi::all_variants().iter().map(|api| api.endpoint()));
    endpoints.extend(GeminiApi::all_variants().iter().map(|api| api.endpoint()));
    endpoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_endpoint() {
        assert_eq!(ApiFormat::from_endpoint("/v1/responses"), Some(ApiFormat::OpenAIResponses));
        assert_eq!(ApiFormat::from_endpoint("/v1/messages"), Some(ApiFormat::AnthropicMessages));
        assert_eq!(
            ApiFormat::from_endpoint("/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"),
            Some(ApiFormat::GeminiGenerateContent)
        );
        assert_eq!(ApiFormat::from_endpoint("/v1/images/generations"), None);
        assert_eq!(ApiFormat::from_endpoint("/v2/chat"), None);
        assert_eq!(ApiFormat::from_endpoint(""), None);
    }

    #[test]
    fn test_supported_endpoints_resolve_back() {
        let endpoints = supported_endpoints();
        assert_eq!(endpoints.len(), 5);
        for endpoint in endpoints.iter().filter(|e| !e.contains('{')) {
            assert!(ApiFormat::from_endpoint(endpoint).is_some(), "{}", endpoint);
        }
    }

    #[test]
    fn test_parse_and_provider_defaults() {
        assert_eq!("anthropic".parse::<ApiFormat>().unwrap(), ApiFormat::AnthropicMessages);
        assert!(matches!(
            "grpc".parse::<ApiFormat>(),
            Err(TransformError::UnsupportedOperation(_))
        ));
        assert_eq!(ApiFormat::for_provider(ProviderId::Deepseek), ApiFormat::OpenAIChatCompletions);
        assert_eq!(ApiFormat::for_provider(ProviderId::Gemini), ApiFormat::GeminiGenerateContent);
    }
}
