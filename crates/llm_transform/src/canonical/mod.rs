//! Vendor-neutral request/response model every transformer converts through.

pub mod message;
pub mod metadata;
pub mod request;
pub mod response;
pub mod usage;

pub use message::{ContentPart, FunctionCall, ImageUrl, InputAudio, Message, MessageContent, Role, ToolCall};
pub use metadata::{MetadataKey, TransformerMetadata};
pub use request::{
    CacheControl, Function, ImageGenerationTool, JsonSchema, NamedToolChoice, ReasoningEffort,
    Request, ResponseFormat, StreamOptions, Tool, ToolChoice, ToolChoiceFunction,
};
pub use response::{Choice, FinishReason, Response};
pub use usage::{CompletionTokensDetails, PromptTokensDetails, Usage};
