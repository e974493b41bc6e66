//! OpenAI Client
//!
//! Implementation of `CompletionClient` for OpenAI-compatible chat completion
//! endpoints. Requests are always streamed; function calling and
//! `response_format` are passed through from the `ChatRequest`.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::provider::{missing_api_key_error, parse_http_error, CompletionClient, CompletionStream};
use super::types::{ChatRequest, LlmError, LlmResult, ProviderType, ToolChoice, ToolDefinition};
use crate::http_client::build_http_client;
use crate::streaming_adapters::OpenAIAdapter;
use build_verify_core::streaming::{StreamAdapter, UnifiedStreamEvent};

/// Default OpenAI API endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default OpenRouter API endpoint
const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Buffered events between the SSE pump and the consumer
const STREAM_BUFFER: usize = 64;

/// Connection settings for one credential.
#[derive(Debug, Clone, Default)]
pub struct OpenAIClientConfig {
    pub provider: ProviderType,
    pub api_key: Option<String>,
    /// Base URL override (full chat-completions URL)
    pub base_url: Option<String>,
    pub proxy: Option<String>,
}

/// OpenAI-compatible streaming client
pub struct OpenAIClient {
    config: OpenAIClientConfig,
    client: reqwest::Client,
}

impl OpenAIClient {
    /// Create a new client with the given configuration
    pub fn new(config: OpenAIClientConfig) -> LlmResult<Self> {
        let client = build_http_client(config.proxy.as_deref())?;
        Ok(Self { config, client })
    }

    /// Get the API URL
    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(match self.config.provider {
                ProviderType::OpenAI => OPENAI_API_URL,
                ProviderType::OpenRouter => OPENROUTER_API_URL,
            })
    }

    /// Build the request body for the API
    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> =
                request.tools.iter().map(|t| self.tool_to_openai(t)).collect();
            body["tools"] = serde_json::json!(tools);
            body["tool_choice"] = match &request.tool_choice {
                ToolChoice::Auto => serde_json::json!("auto"),
                ToolChoice::Required => serde_json::json!("required"),
                ToolChoice::Function { name } => serde_json::json!({
                    "type": "function",
                    "function": { "name": name }
                }),
            };
        }

        if let Some(format) = request.response_format {
            body["response_format"] = serde_json::json!({ "type": format.as_str() });
        }

        body
    }

    /// Convert a ToolDefinition to OpenAI API format
    fn tool_to_openai(&self, tool: &ToolDefinition) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema
            }
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    fn name(&self) -> &'static str {
        match self.config.provider {
            ProviderType::OpenAI => "openai",
            ProviderType::OpenRouter => "openrouter",
        }
    }

    async fn create_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> LlmResult<CompletionStream> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| missing_api_key_error(self.name()))?;

        let body = self.build_request_body(request);

        let send = self
            .client
            .post(self.base_url())
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            result = send => result.map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?,
        };

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());
            let body_text = tokio::select! {
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                result = response.text() => result.map_err(|e| LlmError::NetworkError {
                    message: e.to_string(),
                })?,
            };
            return Err(match parse_http_error(status, &body_text, self.name()) {
                LlmError::RateLimited { message, .. } => LlmError::RateLimited {
                    message,
                    retry_after,
                },
                other => other,
            });
        }

        let (tx, stream) = CompletionStream::channel(STREAM_BUFFER);
        let adapter = OpenAIAdapter::new(&request.model);
        tokio::spawn(pump_sse(response.bytes_stream(), adapter, tx, cancel.clone()));

        Ok(stream)
    }
}

/// Forward SSE lines from `body` through `adapter` into `tx` until the body
/// ends, the consumer goes away, or `cancel` fires.
///
/// Lines are split on raw bytes and decoded whole, so a multi-byte character
/// split across chunks survives.
async fn pump_sse<S, B, E>(
    body: S,
    mut adapter: OpenAIAdapter,
    tx: mpsc::Sender<LlmResult<UnifiedStreamEvent>>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut bytes = std::pin::pin!(body);
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("[openai] stream cancelled for model {}", adapter.model());
                return;
            }
            chunk = bytes.next() => chunk,
        };

        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(LlmError::NetworkError {
                        message: e.to_string(),
                    }))
                    .await;
                return;
            }
            None => break,
        };

        buffer.extend_from_slice(chunk.as_ref());

        // Process complete lines
        while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            if line.trim().is_empty() {
                continue;
            }
            if !forward_line(&mut adapter, &line, &tx).await {
                return;
            }
        }
    }

    // Trailing line without a newline terminator
    let line = String::from_utf8_lossy(&buffer).into_owned();
    if !line.trim().is_empty() && !forward_line(&mut adapter, &line, &tx).await {
        return;
    }

    // Flush a call left open by servers that never send finish_reason
    if let Ok(events) = adapter.adapt("data: [DONE]") {
        for event in events {
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }
    }
}

/// Returns false once the consumer has gone away.
async fn forward_line(
    adapter: &mut OpenAIAdapter,
    line: &str,
    tx: &mpsc::Sender<LlmResult<UnifiedStreamEvent>>,
) -> bool {
    match adapter.adapt(line) {
        Ok(events) => {
            for event in events {
                if tx.send(Ok(event)).await.is_err() {
                    return false;
                }
            }
            true
        }
        Err(e) => {
            tracing::warn!(
                "[openai] {} adapter rejected line for model {}: {}",
                adapter.provider_name(),
                adapter.model(),
                e
            );
            tx.send(Err(LlmError::ParseError {
                message: e.to_string(),
            }))
            .await
            .is_ok()
        }
    }
}
