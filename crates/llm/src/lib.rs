//! Build Verify LLM
//!
//! Provides the model-provider boundary used by the verify stage:
//! - `CompletionClient` trait and the `CompletionStream` handle it returns
//! - OpenAI-compatible streaming client (chat completions over SSE)
//! - Bounded retry policy that observes a cancellation scope
//!
//! Also includes the OpenAI SSE stream adapter and the HTTP client factory.

pub mod http_client;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod streaming_adapters;
pub mod types;

// Re-export main types
pub use http_client::build_http_client;
pub use openai::{OpenAIClient, OpenAIClientConfig};
pub use provider::{CompletionClient, CompletionStream};
pub use retry::{create_stream_with_retries, RetryPolicy};
pub use types::*;

// Re-export streaming adapters
pub use streaming_adapters::OpenAIAdapter;
