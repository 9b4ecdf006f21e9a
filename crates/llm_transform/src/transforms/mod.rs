//! Canonical ↔ vendor converters.
//!
//! Each vendor module exposes the same four conversions:
//! - `request_to_canonical` / `request_from_canonical`
//! - `response_to_canonical` / `response_from_canonical`
//!
//! They are pure functions of their input plus a [`ConvertContext`]; fields a
//! vendor has no canonical slot for travel in the request's
//! `TransformerMetadata` so a same-vendor round trip is lossless.

pub mod anthropic;
pub mod gemini;
pub mod lib;
pub mod openai;
pub mod reasoning;
pub mod responses;
pub mod usage;

pub use lib::*;
pub use reasoning::ReasoningConfig;

use crate::providers::ProviderId;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default maximum tokens when the target vendor requires one and the request has none
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Per-call settings shared by every converter.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertContext {
    /// Vendor on the far side of the conversion; selects wire quirks and cache accounting.
    pub provider: ProviderId,
    pub reasoning: ReasoningConfig,
}

impl ConvertContext {
    pub fn new(provider: ProviderId) -> Self {
        ConvertContext {
            provider,
            reasoning: ReasoningConfig::default(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningConfig) -> Self {
        self.reasoning = reasoning;
        self
    }
}
