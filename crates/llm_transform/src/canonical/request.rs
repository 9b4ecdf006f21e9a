use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::HashMap;
use std::fmt;

use crate::canonical::message::{Message, Role};
use crate::canonical::metadata::TransformerMetadata;
use crate::errors::TransformError;

pub const TOOL_TYPE_FUNCTION: &str = "function";
pub const TOOL_TYPE_IMAGE_GENERATION: &str = "image_generation";

pub const TOOL_CHOICE_AUTO: &str = "auto";
pub const TOOL_CHOICE_NONE: &str = "none";
pub const TOOL_CHOICE_REQUIRED: &str = "required";

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub cache_type: String,
    pub ttl: Option<String>,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        CacheControl {
            cache_type: "ephemeral".to_string(),
            ttl: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }

    /// Lenient parse used for vendor strings; unknown labels yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "minimal" => Some(ReasoningEffort::Minimal),
            "low" => Some(ReasoningEffort::Low),
            "medium" => Some(ReasoningEffort::Medium),
            "high" => Some(ReasoningEffort::High),
            _ => None,
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub description: Option<String>,
    /// JSON schema of the arguments.
    pub parameters: Option<Value>,
    pub strict: Option<bool>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ImageGenerationTool {
    pub quality: Option<String>,
    pub size: Option<String>,
    pub output_format: Option<String>,
    pub background: Option<String>,
    pub output_compression: Option<u32>,
    pub moderation: Option<String>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: Option<Function>,
    pub image_generation: Option<ImageGenerationTool>,
    pub cache_control: Option<CacheControl>,
}

impl Tool {
    pub fn function(name: impl Into<String>, description: Option<String>, parameters: Value) -> Self {
        Tool {
            tool_type: TOOL_TYPE_FUNCTION.to_string(),
            function: Some(Function {
                name: name.into(),
                description,
                parameters: Some(parameters),
                strict: None,
            }),
            image_generation: None,
            cache_control: None,
        }
    }

    pub fn image_generation(options: ImageGenerationTool) -> Self {
        Tool {
            tool_type: TOOL_TYPE_IMAGE_GENERATION.to_string(),
            function: None,
            image_generation: Some(options),
            cache_control: None,
        }
    }

    pub fn is_function(&self) -> bool {
        self.tool_type == TOOL_TYPE_FUNCTION && self.function.is_some()
    }

    pub fn is_image_generation(&self) -> bool {
        self.tool_type == TOOL_TYPE_IMAGE_GENERATION
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolChoiceFunction {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NamedToolChoice {
    #[serde(rename = "type")]
    pub choice_type: String,
    pub function: ToolChoiceFunction,
}

/// Either a mode (`auto`, `none`, `required`) or a specific function.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Named(NamedToolChoice),
}

impl ToolChoice {
    pub fn named(name: impl Into<String>) -> Self {
        ToolChoice::Named(NamedToolChoice {
            choice_type: TOOL_TYPE_FUNCTION.to_string(),
            function: ToolChoiceFunction { name: name.into() },
        })
    }

    pub fn mode(mode: &str) -> Self {
        ToolChoice::Mode(mode.to_string())
    }

    pub fn function_name(&self) -> Option<&str> {
        match self {
            ToolChoice::Named(named) => Some(named.function.name.as_str()),
            ToolChoice::Mode(_) => None,
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct StreamOptions {
    pub include_usage: Option<bool>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JsonSchema {
    pub name: String,
    pub description: Option<String>,
    pub schema: Option<Value>,
    pub strict: Option<bool>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResponseFormat {
    /// `text`, `json_object` or `json_schema`.
    #[serde(rename = "type")]
    pub format_type: String,
    pub json_schema: Option<JsonSchema>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Request {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Option<Vec<Tool>>,
    pub tool_choice: Option<ToolChoice>,
    pub parallel_tool_calls: Option<bool>,

    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    pub max_completion_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub seed: Option<i64>,
    pub n: Option<u32>,
    pub logprobs: Option<bool>,
    pub top_logprobs: Option<u32>,
    pub user: Option<String>,

    pub stream: Option<bool>,
    pub stream_options: Option<StreamOptions>,

    pub reasoning_effort: Option<ReasoningEffort>,
    pub reasoning_budget: Option<u32>,
    pub reasoning_summary: Option<String>,

    pub response_format: Option<ResponseFormat>,
    pub metadata: Option<HashMap<String, String>>,
    pub service_tier: Option<String>,

    /// Vendor fields with no canonical slot, carried for same-vendor round trips.
    #[serde(skip)]
    pub transformer_metadata: TransformerMetadata,
}

impl Request {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// `max_completion_tokens` wins over the legacy `max_tokens`.
    pub fn output_token_limit(&self) -> Option<u32> {
        self.max_completion_tokens.or(self.max_tokens)
    }

    pub fn function_tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter().flatten().filter(|tool| tool.is_function())
    }

    pub fn image_generation_tool(&self) -> Option<&Tool> {
        self.tools
            .iter()
            .flatten()
            .find(|tool| tool.is_image_generation())
    }

    pub fn include_usage(&self) -> bool {
        self.stream_options
            .as_ref()
            .and_then(|opts| opts.include_usage)
            .unwrap_or(false)
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|msg| msg.role == Role::User)
    }

    /// Checks the fields every outbound needs before any network call.
    pub fn validate(&self) -> Result<(), TransformError> {
        if self.model.trim().is_empty() {
            return Err(TransformError::InvalidRequest(
                "model is required".to_string(),
            ));
        }
        if self.messages.is_empty() {
            return Err(TransformError::InvalidRequest(
                "messages must not be empty".to_string(),
            ));
        }
        for tool in self.tools.iter().flatten() {
            if tool.tool_type == TOOL_TYPE_FUNCTION {
                match &tool.function {
                    Some(function) if !function.name.is_empty() => {}
                    _ => {
                        return Err(TransformError::InvalidRequest(
                            "function tools require a name".to_string(),
                        ))
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_rejects_missing_model_and_messages() {
        let req = Request {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        assert!(matches!(
            req.validate(),
            Err(TransformError::InvalidRequest(_))
        ));

        let req = Request {
            model: "gpt-4o".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            req.validate(),
            Err(TransformError::InvalidRequest(_))
        ));

        let req = Request {
            model: "gpt-4o".to_string(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_tool_choice_shapes() {
        let mode: ToolChoice = serde_json::from_value(json!("required")).unwrap();
        assert_eq!(mode, ToolChoice::mode(TOOL_CHOICE_REQUIRED));

        let named: ToolChoice = serde_json::from_value(json!({
            "type": "function",
            "function": {"name": "get_weather"}
        }))
        .unwrap();
        assert_eq!(named.function_name(), Some("get_weather"));
    }

    #[test]
    fn test_output_token_limit_prefers_max_completion_tokens() {
        let req = Request {
            max_tokens: Some(100),
            max_completion_tokens: Some(200),
            ..Default::default()
        };
        assert_eq!(req.output_token_limit(), Some(200));
    }

    #[test]
    fn test_reasoning_effort_parse_is_lenient() {
        assert_eq!(ReasoningEffort::parse("HIGH"), Some(ReasoningEffort::High));
        assert_eq!(ReasoningEffort::parse("extreme"), None);
    }
}
