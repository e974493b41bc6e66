//! Verify Stream Listener
//!
//! Consumes the verifier's completion stream for one file and drives the
//! file to exactly one terminal outcome.

use build_verify_core::UnifiedStreamEvent;
use build_verify_llm::CompletionStream;
use tokio_util::sync::CancellationToken;

use super::file_state::ActiveBuildStreamFileState;
use crate::services::prompts::parse_verify_output;
use crate::utils::error::{AppError, STREAM_CANCELLED};

/// Counters kept while the verify stream is open
#[derive(Debug, Default)]
struct StreamProgress {
    events_received: usize,
    text_chars: usize,
    tool_name: Option<String>,
}

/// Listen to the verify stream until it yields a verdict, fails, or the plan
/// is cancelled.
pub async fn listen_stream_verify_output(
    mut file_state: ActiveBuildStreamFileState,
    mut stream: CompletionStream,
    cancel: CancellationToken,
) {
    let path = file_state.file_path.clone();
    let mut progress = StreamProgress::default();
    file_state.begin_streaming();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("[Verify] Plan cancelled while verifying {}", path);
                file_state
                    .on_build_file_error(AppError::stream(
                        &path,
                        STREAM_CANCELLED,
                        progress.events_received,
                    ))
                    .await;
                return;
            }
            next = stream.recv() => next,
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                let message = if e.is_cancelled() {
                    STREAM_CANCELLED.to_string()
                } else {
                    e.to_string()
                };
                file_state
                    .on_build_file_error(AppError::stream(
                        &path,
                        message,
                        progress.events_received,
                    ))
                    .await;
                return;
            }
            None => {
                file_state
                    .on_build_file_error(AppError::stream(
                        &path,
                        "stream ended before the verifier called verifyOutput",
                        progress.events_received,
                    ))
                    .await;
                return;
            }
        };
        progress.events_received += 1;

        match event {
            UnifiedStreamEvent::TextDelta { content } => {
                progress.text_chars += content.len();
            }
            UnifiedStreamEvent::ToolStart { tool_name, .. } => {
                tracing::debug!("[Verify] {} verifier called {}", path, tool_name);
                progress.tool_name = Some(tool_name);
            }
            UnifiedStreamEvent::ToolDelta { .. } => {}
            UnifiedStreamEvent::Usage {
                input_tokens,
                output_tokens,
                ..
            } => {
                tracing::debug!(
                    "[Verify] {} usage: {} input, {} output tokens",
                    path,
                    input_tokens,
                    output_tokens
                );
            }
            UnifiedStreamEvent::ToolComplete {
                tool_name,
                arguments,
                ..
            } => {
                let tool_name = if tool_name.is_empty() {
                    progress.tool_name.take().unwrap_or_default()
                } else {
                    tool_name
                };
                match parse_verify_output(&path, &tool_name, &arguments) {
                    Ok(verdict) => {
                        let note = verdict.note().to_string();
                        file_state.on_finish_build_file(Some(verdict), note).await;
                    }
                    Err(e) => {
                        file_state.on_build_file_error(e).await;
                    }
                }
                return;
            }
            UnifiedStreamEvent::Error { message, code } => {
                let message = match code {
                    Some(code) => format!("{} ({})", message, code),
                    None => message,
                };
                file_state
                    .on_build_file_error(AppError::stream(
                        &path,
                        message,
                        progress.events_received,
                    ))
                    .await;
                return;
            }
            UnifiedStreamEvent::Complete { stop_reason } => {
                tracing::debug!(
                    "[Verify] {} stream completed ({:?}) after {} chars of text",
                    path,
                    stop_reason,
                    progress.text_chars
                );
                file_state
                    .on_build_file_error(AppError::verdict_parse(
                        &path,
                        "verifier finished without calling verifyOutput",
                    ))
                    .await;
                return;
            }
        }
    }
}
