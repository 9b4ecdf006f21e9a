//! Inbound/outbound transformers: the HTTP-facing side of the library.

pub mod anthropic;
pub mod endpoints;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod responses;
pub mod transformer;

pub use endpoints::{supported_endpoints, ApiFormat};
pub use http::{AuthConfig, HttpRequest, HttpResponse, MultipartBody, MultipartFile};
pub use transformer::{outbound_for_channel, Inbound, Outbound, TransformerRegistry, TransformerRegistryBuilder};
