use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt::Display;
use std::str::FromStr;

use crate::canonical::ReasoningEffort;
use crate::errors::TransformError;

/// Vendor or platform an outbound transformer talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum ProviderId {
    OpenAI,
    AzureOpenAI,
    Anthropic,
    Gemini,
    Deepseek,
    Moonshot,
    OpenRouter,
    XAI,
    Groq,
    Mistral,
    Zhipu,
    Qwen,
}

/// How a platform reports prompt-cache tokens relative to its base input count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAccounting {
    /// Base input excludes cache reads and writes (native Anthropic).
    ExcludesCache,
    /// Base input already contains cache tokens; cache counts are a breakdown only.
    IncludesCache,
}

impl FromStr for ProviderId {
    type Err = TransformError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAI),
            "azure_openai" | "azure" => Ok(ProviderId::AzureOpenAI),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            "gemini" | "google" => Ok(ProviderId::Gemini),
            "deepseek" => Ok(ProviderId::Deepseek),
            "moonshot" | "moonshotai" => Ok(ProviderId::Moonshot),
            "openrouter" => Ok(ProviderId::OpenRouter),
            "xai" => Ok(ProviderId::XAI),
            "groq" => Ok(ProviderId::Groq),
            "mistral" => Ok(ProviderId::Mistral),
            "zhipu" => Ok(ProviderId::Zhipu),
            "qwen" => Ok(ProviderId::Qwen),
            _ => Err(TransformError::InvalidModel(format!(
                "unknown provider: {}",
                value
            ))),
        }
    }
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::AzureOpenAI => "azure_openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Gemini => "gemini",
            ProviderId::Deepseek => "deepseek",
            ProviderId::Moonshot => "moonshot",
            ProviderId::OpenRouter => "openrouter",
            ProviderId::XAI => "xai",
            ProviderId::Groq => "groq",
            ProviderId::Mistral => "mistral",
            ProviderId::Zhipu => "zhipu",
            ProviderId::Qwen => "qwen",
        }
    }

    pub fn cache_accounting(&self) -> CacheAccounting {
        match self {
            ProviderId::Anthropic => CacheAccounting::ExcludesCache,
            _ => CacheAccounting::IncludesCache,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "https://api.openai.com",
            ProviderId::AzureOpenAI => "https://example.openai.azure.com",
            ProviderId::Anthropic => "https://api.anthropic.com",
            ProviderId::Gemini => "https://generativelanguage.googleapis.com",
            ProviderId::Deepseek => "https://api.deepseek.com",
            ProviderId::Moonshot => "https://api.moonshot.ai",
            ProviderId::OpenRouter => "https://openrouter.ai/api",
            ProviderId::XAI => "https://api.x.ai",
            ProviderId::Groq => "https://api.groq.com",
            ProviderId::Mistral => "https://api.mistral.ai",
            ProviderId::Zhipu => "https://open.bigmodel.cn",
            ProviderId::Qwen => "https://dashscope.aliyuncs.com",
        }
    }

    /// Chat completions path for OpenAI-compatible vendors.
    pub fn chat_completions_path(&self, model: &str, api_version: Option<&str>) -> String {
        match self {
            ProviderId::Groq => "/openai/v1/chat/completions".to_string(),
            ProviderId::Zhipu => "/api/paas/v4/chat/completions".to_string(),
            ProviderId::Qwen => "/compatible-mode/v1/chat/completions".to_string(),
            ProviderId::Gemini => "/v1beta/openai/chat/completions".to_string(),
            ProviderId::AzureOpenAI => format!(
                "/openai/deployments/{}/chat/completions?api-version={}",
                model,
                api_version.unwrap_or(AZURE_DEFAULT_API_VERSION)
            ),
            _ => crate::CHAT_COMPLETIONS_PATH.to_string(),
        }
    }

    /// Vendors whose chat responses carry `reasoning_content` on the message.
    pub fn reports_reasoning_content(&self) -> bool {
        matches!(
            self,
            ProviderId::Deepseek | ProviderId::Moonshot | ProviderId::OpenRouter
        )
    }

    /// Clamp a reasoning effort to what the vendor accepts.
    pub fn supported_effort(&self, effort: ReasoningEffort) -> ReasoningEffort {
        match (self, effort) {
            (ProviderId::XAI, ReasoningEffort::Minimal) => ReasoningEffort::Low,
            (ProviderId::XAI, ReasoningEffort::Medium) => ReasoningEffort::High,
            _ => effort,
        }
    }
}

pub const AZURE_DEFAULT_API_VERSION: &str = "2025-01-01-preview";

impl Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_conversion() {
        assert_eq!("openai".parse::<ProviderId>().unwrap(), ProviderId::OpenAI);
        assert_eq!("Mistral".parse::<ProviderId>().unwrap(), ProviderId::Mistral);
        assert_eq!("moonshotai".parse::<ProviderId>().unwrap(), ProviderId::Moonshot);
        assert!(matches!(
            "bedrock".parse::<ProviderId>(),
            Err(TransformError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_cache_accounting_by_platform() {
        assert_eq!(
            ProviderId::Anthropic.cache_accounting(),
            CacheAccounting::ExcludesCache
        );
        assert_eq!(
            ProviderId::Deepseek.cache_accounting(),
            CacheAccounting::IncludesCache
        );
    }

    #[test]
    fn test_vendor_chat_paths() {
        assert_eq!(
            ProviderId::Zhipu.chat_completions_path("glm-4", None),
            "/api/paas/v4/chat/completions"
        );
        assert_eq!(
            ProviderId::AzureOpenAI.chat_completions_path("gpt-4o", Some("2024-10-21")),
            "/openai/deployments/gpt-4o/chat/completions?api-version=2024-10-21"
        );
        assert_eq!(
            ProviderId::OpenAI.chat_completions_path("gpt-4o", None),
            "/v1/chat/completions"
        );
    }

    #[test]
    fn test_xai_effort_clamp() {
        assert_eq!(
            ProviderId::XAI.supported_effort(ReasoningEffort::Medium),
            ReasoningEffort::High
        );
        assert_eq!(
            ProviderId::OpenAI.supported_effort(ReasoningEffort::Medium),
            ReasoningEffort::Medium
        );
    }
}
