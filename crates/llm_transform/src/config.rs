//! Library configuration: outbound channels and the reasoning bucket table.
//!
//! ```yaml
//! reasoning:
//!   budget_thresholds:
//!     - { max_budget: 5000, effort: low }
//!     - { max_budget: 15000, effort: medium }
//!   above_threshold_effort: high
//! channels:
//!   - name: claude
//!     provider: anthropic
//!     api_key: sk-ant-...
//!   - name: deepseek-anthropic
//!     provider: deepseek
//!     base_url: https://api.deepseek.com/anthropic
//!     format: anthropic
//!     api_key: sk-...
//! ```

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::clients::endpoints::ApiFormat;
use crate::errors::TransformError;
use crate::providers::ProviderId;
use crate::transforms::{ConvertContext, ReasoningConfig};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    pub name: String,
    pub provider: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Wire format spoken to the channel; defaults to the provider's native one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ApiFormat>,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, provider: ProviderId, api_key: impl Into<String>) -> Self {
        ChannelConfig {
            name: name.into(),
            provider,
            base_url: None,
            api_key: api_key.into(),
            api_version: None,
            format: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    pub fn with_format(mut self, format: ApiFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn format(&self) -> ApiFormat {
        self.format.unwrap_or_else(|| ApiFormat::for_provider(self.provider))
    }

    pub fn convert_context(&self, reasoning: &ReasoningConfig) -> ConvertContext {
        ConvertContext::new(self.provider).with_reasoning(reasoning.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TransformConfig {
    pub reasoning: ReasoningConfig,
    pub channels: Vec<ChannelConfig>,
}

impl TransformConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TransformError> {
        let config: TransformConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TransformError::invalid_request(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        info!(
            "loaded transform configuration with {} channel(s)",
            config.channels.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TransformError> {
        self.reasoning.validate()?;
        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(TransformError::invalid_request("channel name must not be empty"));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(TransformError::invalid_request(format!(
                    "duplicate channel name: {}",
                    channel.name
                )));
            }
        }
        Ok(())
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|channel| channel.name == name)
    }
}
