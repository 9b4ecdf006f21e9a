use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PromptTokensDetails {
    /// Prompt tokens served through the cache path (reads plus writes).
    #[serde(default)]
    pub cached_tokens: u32,
    /// Portion of `cached_tokens` that was written to the cache on this call.
    #[serde(default)]
    pub write_cached_tokens: u32,
    #[serde(default)]
    pub audio_tokens: u32,
}

impl PromptTokensDetails {
    /// Cache reads, excluding the tokens written on this call.
    pub fn cache_read_tokens(&self) -> u32 {
        self.cached_tokens.saturating_sub(self.write_cached_tokens)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u32,
    #[serde(default)]
    pub audio_tokens: u32,
    #[serde(default)]
    pub accepted_prediction_tokens: u32,
    #[serde(default)]
    pub rejected_prediction_tokens: u32,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            prompt_tokens_details: None,
            completion_tokens_details: None,
        }
    }

    /// Re-derives `total_tokens` from its parts.
    pub fn normalized(mut self) -> Self {
        self.total_tokens = self.prompt_tokens.saturating_add(self.completion_tokens);
        self
    }

    pub fn cached_tokens(&self) -> u32 {
        self.prompt_tokens_details
            .map(|d| d.cached_tokens)
            .unwrap_or(0)
    }

    pub fn write_cached_tokens(&self) -> u32 {
        self.prompt_tokens_details
            .map(|d| d.write_cached_tokens)
            .unwrap_or(0)
    }

    pub fn cache_read_tokens(&self) -> u32 {
        self.prompt_tokens_details
            .map(|d| d.cache_read_tokens())
            .unwrap_or(0)
    }

    pub fn reasoning_tokens(&self) -> u32 {
        self.completion_tokens_details
            .map(|d| d.reasoning_tokens)
            .unwrap_or(0)
    }

    /// Later usage reports replace earlier ones field by field, keeping any
    /// non-zero counts the later report leaves out.
    pub fn merge(self, later: Usage) -> Usage {
        let prompt_tokens = if later.prompt_tokens > 0 {
            later.prompt_tokens
        } else {
            self.prompt_tokens
        };
        let completion_tokens = if later.completion_tokens > 0 {
            later.completion_tokens
        } else {
            self.completion_tokens
        };
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            prompt_tokens_details: later.prompt_tokens_details.or(self.prompt_tokens_details),
            completion_tokens_details: later
                .completion_tokens_details
                .or(self.completion_tokens_details),
        }
    }
}
