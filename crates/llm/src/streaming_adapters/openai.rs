//! OpenAI API Adapter
//!
//! Handles the OpenAI chat-completions SSE format, accumulating streamed
//! function-call arguments until the call is complete.

use build_verify_core::streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};
use serde::Deserialize;

/// Internal event types from OpenAI API SSE format
#[derive(Debug, Deserialize)]
struct OpenAIEvent {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// A function call whose arguments are still streaming in.
#[derive(Debug)]
struct PendingToolCall {
    index: usize,
    id: String,
    name: String,
    arguments: String,
}

/// Adapter for OpenAI API SSE format
pub struct OpenAIAdapter {
    model: String,
    pending: Option<PendingToolCall>,
}

impl OpenAIAdapter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            pending: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Flush any pending tool call, emitting a ToolComplete event
    fn flush_pending_tool(&mut self) -> Option<UnifiedStreamEvent> {
        self.pending
            .take()
            .map(|call| UnifiedStreamEvent::ToolComplete {
                tool_id: call.id,
                tool_name: call.name,
                arguments: call.arguments,
            })
    }

    fn apply_tool_delta(&mut self, tc: ToolCallDelta, events: &mut Vec<UnifiedStreamEvent>) {
        let index = tc.index.unwrap_or(0);
        let (name, arguments) = match tc.function {
            Some(func) => (func.name, func.arguments),
            None => (None, None),
        };

        let starts_new_call = match &self.pending {
            Some(call) => call.index != index || tc.id.as_ref().is_some_and(|id| *id != call.id),
            None => true,
        };

        if starts_new_call {
            if let Some(done) = self.flush_pending_tool() {
                events.push(done);
            }
            let id = tc.id.unwrap_or_else(|| format!("call_{}", index));
            let name = name.unwrap_or_default();
            events.push(UnifiedStreamEvent::ToolStart {
                tool_id: id.clone(),
                tool_name: name.clone(),
                arguments: None,
            });
            self.pending = Some(PendingToolCall {
                index,
                id,
                name,
                arguments: String::new(),
            });
        } else if let (Some(call), Some(name)) = (self.pending.as_mut(), name) {
            // Some compatible servers send the name after the id.
            if call.name.is_empty() {
                call.name = name;
            }
        }

        if let (Some(call), Some(args)) = (self.pending.as_mut(), arguments) {
            if !args.is_empty() {
                call.arguments.push_str(&args);
                events.push(UnifiedStreamEvent::ToolDelta {
                    tool_id: call.id.clone(),
                    delta: args,
                });
            }
        }
    }
}

impl StreamAdapter for OpenAIAdapter {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError> {
        let trimmed = input.trim();

        // SSE streams may include event:, id:, retry: and comment lines.
        let json_str = if let Some(rest) = trimmed.strip_prefix("data:") {
            rest.trim_start()
        } else if trimmed.starts_with('{') {
            trimmed
        } else {
            return Ok(vec![]);
        };

        if json_str.is_empty() {
            return Ok(vec![]);
        }

        if json_str == "[DONE]" {
            return Ok(self.flush_pending_tool().into_iter().collect());
        }

        let event: OpenAIEvent =
            serde_json::from_str(json_str).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        let mut events = vec![];

        if let Some(error) = event.error {
            events.push(UnifiedStreamEvent::Error {
                message: error.message,
                code: error.code.map(|c| match c {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
            });
            return Ok(events);
        }

        for choice in event.choices {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content {
                    if !content.is_empty() {
                        events.push(UnifiedStreamEvent::TextDelta { content });
                    }
                }

                if let Some(tool_calls) = delta.tool_calls {
                    for tc in tool_calls {
                        self.apply_tool_delta(tc, &mut events);
                    }
                }
            }

            if let Some(finish_reason) = choice.finish_reason {
                if let Some(done) = self.flush_pending_tool() {
                    events.push(done);
                }
                events.push(UnifiedStreamEvent::Complete {
                    stop_reason: Some(finish_reason),
                });
            }
        }

        if let Some(usage) = event.usage {
            events.push(UnifiedStreamEvent::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cache_read_tokens: usage.prompt_tokens_details.and_then(|d| d.cached_tokens),
            });
        }

        Ok(events)
    }
}
