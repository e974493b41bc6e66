//! Retrying Stream Creation
//!
//! Opens a completion stream, retrying transient provider failures with
//! exponential back-off. Every attempt and every back-off wait observes the
//! caller's cancellation scope.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::provider::{CompletionClient, CompletionStream};
use super::types::{ChatRequest, LlmError, LlmResult};

/// Bounded retry policy for stream creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles each attempt
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No retries: a single attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), honouring a provider
    /// `retry_after` hint when it asks for longer.
    pub fn delay_for(&self, attempt: u32, error: &LlmError) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let backoff = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        match error.retry_after_secs() {
            Some(secs) => backoff.max(Duration::from_secs(secs)),
            None => backoff,
        }
    }
}

/// Create a completion stream, retrying transient failures.
///
/// Returns `LlmError::Cancelled` as soon as `cancel` fires, whether that
/// happens before an attempt, during one, or while backing off. The last
/// error is returned once retries are exhausted or a non-retryable error
/// occurs.
pub async fn create_stream_with_retries(
    client: &dyn CompletionClient,
    cancel: &CancellationToken,
    request: &ChatRequest,
    policy: &RetryPolicy,
) -> LlmResult<CompletionStream> {
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let error = match client.create_stream(request, cancel).await {
            Ok(stream) => return Ok(stream),
            Err(e) => e,
        };

        if cancel.is_cancelled() || error.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        if !error.is_retryable() || attempt >= policy.max_retries {
            return Err(error);
        }

        let wait = policy.delay_for(attempt, &error);
        tracing::warn!(
            "[llm:retry] {} {} on attempt {}/{}, retrying in {:?}",
            client.name(),
            error,
            attempt + 1,
            policy.max_retries,
            wait
        );

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
        }
        attempt += 1;
    }
}
