pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod openai_responses;
pub mod sse;

// Explicit exports to avoid naming conflicts
pub use anthropic::{AnthropicApi, MessagesRequest, MessagesResponse, MessagesStreamEvent};
pub use gemini::{GeminiApi, GenerateContentRequest, GenerateContentResponse};
pub use openai::{
    ChatCompletionChunk, ChatCompletionsRequest, ChatCompletionsResponse, OpenAIApi,
};
pub use openai_responses::{ResponsesRequest, ResponsesResponse, ResponsesStreamEvent};
pub use sse::{SseEvent, SseParser, SseStreamIter};

pub trait ApiDefinition {
    /// Returns the endpoint path for this API
    fn endpoint(&self) -> &'static str;

    /// Creates an API instance from an endpoint path
    fn from_endpoint(endpoint: &str) -> Option<Self>
    where
        Self: Sized;

    /// Returns whether this API supports streaming responses
    fn supports_streaming(&self) -> bool;

    /// Returns whether this API supports tool/function calling
    fn supports_tools(&self) -> bool;

    /// Returns whether this API supports vision/image processing
    fn supports_vision(&self) -> bool;

    /// Returns all variants of this API enum
    fn all_variants() -> Vec<Self>
    where
        Self: Sized;
}
