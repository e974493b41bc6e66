//! Completion Client Trait
//!
//! Defines the model-provider boundary: a client that opens a streaming
//! completion under a cancellation scope and hands back a live stream handle.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::types::{ChatRequest, LlmError, LlmResult};
use build_verify_core::streaming::UnifiedStreamEvent;

/// Trait that all completion providers must implement.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Open a streaming completion for `request`.
    ///
    /// Returns once the provider has accepted the request; events then arrive
    /// on the returned stream. Implementations must stop producing events once
    /// `cancel` fires.
    async fn create_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> LlmResult<CompletionStream>;
}

/// Live handle to a streaming completion.
///
/// Transport failures mid-stream arrive as `Err` items; the stream ends when
/// the producer finishes or is dropped.
#[derive(Debug)]
pub struct CompletionStream {
    rx: mpsc::Receiver<LlmResult<UnifiedStreamEvent>>,
}

impl CompletionStream {
    pub fn new(rx: mpsc::Receiver<LlmResult<UnifiedStreamEvent>>) -> Self {
        Self { rx }
    }

    /// Create a stream together with the sender that feeds it.
    pub fn channel(buffer: usize) -> (mpsc::Sender<LlmResult<UnifiedStreamEvent>>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self::new(rx))
    }

    /// Build an already-finished stream from a fixed list of items.
    pub fn from_events(events: Vec<LlmResult<UnifiedStreamEvent>>) -> Self {
        let (tx, stream) = Self::channel(events.len());
        for event in events {
            // Capacity equals the number of items, so this never fails.
            let _ = tx.try_send(event);
        }
        stream
    }

    /// Receive the next event, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<LlmResult<UnifiedStreamEvent>> {
        self.rx.recv().await
    }
}

/// Helper function to create an error for a missing API key
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Helper function to parse HTTP error status codes
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
            retry_after: None,
        },
        400 if body.contains("context_length_exceeded") => LlmError::ContextLengthExceeded {
            message: body.to_string(),
        },
        400 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        503 => LlmError::ProviderUnavailable {
            message: format!("{}: {}", provider, body),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}
