//! Usage reconciliation between vendor token reports and canonical [`Usage`].
//!
//! Every vendor report is first reduced to [`TokenCounts`], then folded into
//! canonical usage by [`reconcile`], which owns the cache accounting rule.

use log::debug;

use crate::apis::anthropic::MessagesUsage;
use crate::apis::gemini::UsageMetadata;
use crate::apis::openai::{self as openai_api, ChatUsage};
use crate::apis::openai_responses::{InputTokensDetails, OutputTokensDetails, ResponsesUsage};
use crate::canonical::{CompletionTokensDetails, PromptTokensDetails, Usage};
use crate::providers::CacheAccounting;

/// Raw counts as a vendor reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenCounts {
    pub input: u32,
    pub output: u32,
    pub cache_write: u32,
    pub cache_read: u32,
    pub reasoning: u32,
}

pub fn reconcile(counts: TokenCounts, accounting: CacheAccounting) -> Usage {
    let prompt_tokens = match accounting {
        CacheAccounting::ExcludesCache => counts
            .input
            .saturating_add(counts.cache_write)
            .saturating_add(counts.cache_read),
        CacheAccounting::IncludesCache => counts.input,
    };
    let cached = counts.cache_read.saturating_add(counts.cache_write);

    let mut usage = Usage::new(prompt_tokens, counts.output);
    if cached > 0 {
        usage.prompt_tokens_details = Some(PromptTokensDetails {
            cached_tokens: cached,
            write_cached_tokens: counts.cache_write,
            audio_tokens: 0,
        });
    }
    if counts.reasoning > 0 {
        usage.completion_tokens_details = Some(CompletionTokensDetails {
            reasoning_tokens: counts.reasoning,
            ..Default::default()
        });
    }
    usage
}

/// Inverse of [`reconcile`].
pub fn split(usage: &Usage, accounting: CacheAccounting) -> TokenCounts {
    let cache_write = usage.write_cached_tokens();
    let cache_read = usage.cache_read_tokens();
    let input = match accounting {
        CacheAccounting::ExcludesCache => usage
            .prompt_tokens
            .saturating_sub(cache_write.saturating_add(cache_read)),
        CacheAccounting::IncludesCache => usage.prompt_tokens,
    };
    TokenCounts {
        input,
        output: usage.completion_tokens,
        cache_write,
        cache_read,
        reasoning: usage.reasoning_tokens(),
    }
}

// ============================================================================
// ANTHROPIC
// ============================================================================

pub fn from_anthropic(usage: &MessagesUsage, accounting: CacheAccounting) -> Usage {
    let cache_read = match (usage.cache_read_input_tokens, usage.cached_tokens) {
        (Some(read), _) => read,
        (None, Some(alias)) => {
            debug!("using cached_tokens alias for cache reads: {}", alias);
            alias
        }
        (None, None) => 0,
    };
    reconcile(
        TokenCounts {
            input: usage.input_tokens,
            output: usage.output_tokens,
            cache_write: usage.cache_creation_input_tokens.unwrap_or(0),
            cache_read,
            reasoning: 0,
        },
        accounting,
    )
}

pub fn to_anthropic(usage: &Usage, accounting: CacheAccounting) -> MessagesUsage {
    let counts = split(usage, accounting);
    MessagesUsage {
        input_tokens: counts.input,
        output_tokens: counts.output,
        cache_creation_input_tokens: (counts.cache_write > 0).then_some(counts.cache_write),
        cache_read_input_tokens: (counts.cache_read > 0).then_some(counts.cache_read),
        cached_tokens: None,
    }
}

// ============================================================================
// OPENAI CHAT COMPLETIONS
// ============================================================================

pub fn from_openai(usage: &ChatUsage) -> Usage {
    let documented = usage
        .prompt_tokens_details
        .as_ref()
        .and_then(|d| d.cached_tokens);
    let cached = match documented {
        Some(cached) => cached,
        None => match usage.prompt_cache_hit_tokens.or(usage.cached_tokens) {
            Some(alias) => {
                debug!("using vendor cache-hit alias for cached tokens: {}", alias);
                alias
            }
            None => 0,
        },
    };
    let reasoning = usage
        .completion_tokens_details
        .as_ref()
        .and_then(|d| d.reasoning_tokens)
        .unwrap_or(0);

    let mut canonical = reconcile(
        TokenCounts {
            input: usage.prompt_tokens,
            output: usage.completion_tokens,
            cache_write: 0,
            cache_read: cached,
            reasoning,
        },
        CacheAccounting::IncludesCache,
    );
    if let Some(audio) = usage
        .prompt_tokens_details
        .as_ref()
        .and_then(|d| d.audio_tokens)
    {
        canonical
            .prompt_tokens_details
            .get_or_insert_with(Default::default)
            .audio_tokens = audio;
    }
    if let Some(details) = &usage.completion_tokens_details {
        let target = canonical
            .completion_tokens_details
            .get_or_insert_with(Default::default);
        target.audio_tokens = details.audio_tokens.unwrap_or(0);
        target.accepted_prediction_tokens = details.accepted_prediction_tokens.unwrap_or(0);
        target.rejected_prediction_tokens = details.rejected_prediction_tokens.unwrap_or(0);
    }
    canonical
}

pub fn to_openai(usage: &Usage) -> ChatUsage {
    ChatUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.prompt_tokens.saturating_add(usage.completion_tokens),
        prompt_tokens_details: usage.prompt_tokens_details.map(|d| {
            openai_api::PromptTokensDetails {
                cached_tokens: Some(d.cached_tokens),
                audio_tokens: (d.audio_tokens > 0).then_some(d.audio_tokens),
            }
        }),
        completion_tokens_details: usage.completion_tokens_details.map(|d| {
            openai_api::CompletionTokensDetails {
                reasoning_tokens: Some(d.reasoning_tokens),
                audio_tokens: (d.audio_tokens > 0).then_some(d.audio_tokens),
                accepted_prediction_tokens: (d.accepted_prediction_tokens > 0)
                    .then_some(d.accepted_prediction_tokens),
                rejected_prediction_tokens: (d.rejected_prediction_tokens > 0)
                    .then_some(d.rejected_prediction_tokens),
            }
        }),
        ..Default::default()
    }
}

// ============================================================================
// OPENAI RESPONSES
// ============================================================================

pub fn from_responses(usage: &ResponsesUsage) -> Usage {
    reconcile(
        TokenCounts {
            input: usage.input_tokens,
            output: usage.output_tokens,
            cache_write: 0,
            cache_read: usage
                .input_tokens_details
                .as_ref()
                .map(|d| d.cached_tokens)
                .unwrap_or(0),
            reasoning: usage
                .output_tokens_details
                .as_ref()
                .map(|d| d.reasoning_tokens)
                .unwrap_or(0),
        },
        CacheAccounting::IncludesCache,
    )
}

pub fn to_responses(usage: &Usage) -> ResponsesUsage {
    ResponsesUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.prompt_tokens.saturating_add(usage.completion_tokens),
        input_tokens_details: Some(InputTokensDetails {
            cached_tokens: usage.cached_tokens(),
        }),
        output_tokens_details: Some(OutputTokensDetails {
            reasoning_tokens: usage.reasoning_tokens(),
        }),
    }
}

// ============================================================================
// GEMINI
// ============================================================================

/// Gemini reports thought tokens beside, not inside, `candidatesTokenCount`.
pub fn from_gemini(usage: &UsageMetadata) -> Usage {
    let thoughts = usage.thoughts_token_count.unwrap_or(0);
    reconcile(
        TokenCounts {
            input: usage.prompt_token_count,
            output: usage.candidates_token_count.saturating_add(thoughts),
            cache_write: 0,
            cache_read: usage.cached_content_token_count.unwrap_or(0),
            reasoning: thoughts,
        },
        CacheAccounting::IncludesCache,
    )
}

pub fn to_gemini(usage: &Usage) -> UsageMetadata {
    let thoughts = usage.reasoning_tokens();
    let cached = usage.cached_tokens();
    UsageMetadata {
        prompt_token_count: usage.prompt_tokens,
        candidates_token_count: usage.completion_tokens.saturating_sub(thoughts),
        total_token_count: usage.prompt_tokens.saturating_add(usage.completion_tokens),
        cached_content_token_count: (cached > 0).then_some(cached),
        thoughts_token_count: (thoughts > 0).then_some(thoughts),
    }
}
