//! Typed bag for vendor fields that have no slot in the canonical request.
//!
//! Every key is a [`MetadataKey`] constant declared here, so the inbound that
//! produces a value and the outbound that consumes it share one spelling and
//! one value type.

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;

pub struct MetadataKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> MetadataKey<T> {
    pub const fn new(name: &'static str) -> Self {
        MetadataKey {
            name,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Anthropic `system` arrived as an array of text blocks rather than a string.
pub const ANTHROPIC_SYSTEM_AS_BLOCKS: MetadataKey<bool> =
    MetadataKey::new("anthropic.system_as_blocks");
/// Anthropic `container` identifier for code-execution sessions.
pub const ANTHROPIC_CONTAINER: MetadataKey<String> = MetadataKey::new("anthropic.container");
/// Anthropic `thinking.type` when it is something other than `enabled`.
pub const ANTHROPIC_THINKING_TYPE: MetadataKey<String> =
    MetadataKey::new("anthropic.thinking_type");

/// OpenAI `logit_bias` map.
pub const OPENAI_LOGIT_BIAS: MetadataKey<HashMap<String, i32>> =
    MetadataKey::new("openai.logit_bias");
/// OpenAI output `modalities`.
pub const OPENAI_MODALITIES: MetadataKey<Vec<String>> = MetadataKey::new("openai.modalities");
/// OpenAI `store` flag for chat completions.
pub const OPENAI_STORE: MetadataKey<bool> = MetadataKey::new("openai.store");

/// Responses API `previous_response_id`.
pub const RESPONSES_PREVIOUS_RESPONSE_ID: MetadataKey<String> =
    MetadataKey::new("responses.previous_response_id");
/// Responses API `store` flag.
pub const RESPONSES_STORE: MetadataKey<bool> = MetadataKey::new("responses.store");
/// Responses API `include` list.
pub const RESPONSES_INCLUDE: MetadataKey<Vec<String>> = MetadataKey::new("responses.include");
/// Responses API `truncation` strategy.
pub const RESPONSES_TRUNCATION: MetadataKey<String> = MetadataKey::new("responses.truncation");
/// Responses API `input` was a bare string instead of an item list.
pub const RESPONSES_INPUT_AS_TEXT: MetadataKey<bool> =
    MetadataKey::new("responses.input_as_text");

/// Gemini `safetySettings`, kept verbatim.
pub const GEMINI_SAFETY_SETTINGS: MetadataKey<Value> = MetadataKey::new("gemini.safety_settings");
/// Gemini `thinkingConfig.includeThoughts`.
pub const GEMINI_INCLUDE_THOUGHTS: MetadataKey<bool> =
    MetadataKey::new("gemini.include_thoughts");
/// Gemini `generationConfig.responseModalities`.
pub const GEMINI_RESPONSE_MODALITIES: MetadataKey<Vec<String>> =
    MetadataKey::new("gemini.response_modalities");

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformerMetadata {
    values: HashMap<String, Value>,
}

impl TransformerMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Serialize>(&mut self, key: &MetadataKey<T>, value: T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.values.insert(key.name.to_string(), value);
            }
            Err(e) => warn!("dropping transformer metadata `{}`: {}", key.name, e),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &MetadataKey<T>) -> Option<T> {
        let value = self.values.get(key.name)?;
        match serde_json::from_value(value.clone()) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!("transformer metadata `{}` has unexpected shape: {}", key.name, e);
                None
            }
        }
    }

    /// Boolean flags default to `false` when absent.
    pub fn flag(&self, key: &MetadataKey<bool>) -> bool {
        self.get(key).unwrap_or(false)
    }

    pub fn contains<T>(&self, key: &MetadataKey<T>) -> bool {
        self.values.contains_key(key.name)
    }

    pub fn remove<T: DeserializeOwned>(&mut self, key: &MetadataKey<T>) -> Option<T> {
        let value = self.values.remove(key.name)?;
        serde_json::from_value(value).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_round_trip() {
        let mut meta = TransformerMetadata::new();
        meta.insert(&ANTHROPIC_SYSTEM_AS_BLOCKS, true);
        meta.insert(&RESPONSES_INCLUDE, vec!["reasoning.encrypted_content".to_string()]);
        meta.insert(&GEMINI_SAFETY_SETTINGS, json!([{"category": "HARM_CATEGORY_HATE_SPEECH"}]));

        assert!(meta.flag(&ANTHROPIC_SYSTEM_AS_BLOCKS));
        assert_eq!(
            meta.get(&RESPONSES_INCLUDE),
            Some(vec!["reasoning.encrypted_content".to_string()])
        );
        assert_eq!(meta.len(), 3);
        assert!(!meta.flag(&GEMINI_INCLUDE_THOUGHTS));
    }

    #[test]
    fn test_remove_returns_value_once() {
        let mut meta = TransformerMetadata::new();
        meta.insert(&RESPONSES_PREVIOUS_RESPONSE_ID, "resp_1".to_string());
        assert_eq!(
            meta.remove(&RESPONSES_PREVIOUS_RESPONSE_ID),
            Some("resp_1".to_string())
        );
        assert!(meta.remove(&RESPONSES_PREVIOUS_RESPONSE_ID).is_none());
        assert!(meta.is_empty());
    }
}
