//! Error Handling
//!
//! Unified error types for the verify pipeline.
//! Uses thiserror for ergonomic error definitions.

use build_verify_llm::LlmError;
use thiserror::Error;

/// Application-wide error type
///
/// File-scoped variants (`StateResolution`, `Config` raised for a file,
/// `Invocation`, `Stream`, `VerdictParse`) carry the file path so the build
/// pipeline can decide whether to retry the whole build.
#[derive(Error, Debug)]
pub enum AppError {
    /// No credential session is loaded
    #[error("error setting auth header: auth not loaded")]
    AuthNotLoaded,

    /// The authorization value could not be encoded or decoded
    #[error("Auth header error: {0}")]
    AuthHeader(String),

    /// Prior build data is present but inconsistent
    #[error("error getting verify state for file '{path}': {message}")]
    StateResolution { path: String, message: String },

    /// Configuration errors (missing model client, invalid model pack, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The verify call could not be started (retries exhausted, non-retryable
    /// provider failure, or plan cancelled while starting)
    #[error("error creating plan file stream for path '{path}': {source}")]
    Invocation {
        path: String,
        #[source]
        source: LlmError,
    },

    /// Transport failure or cancellation while the verify stream was open
    #[error("stream error for path '{path}' after {events_received} events: {message}")]
    Stream {
        path: String,
        message: String,
        events_received: usize,
    },

    /// The verifier's structured output did not match the forced function
    #[error("error parsing verify output for path '{path}': {message}")]
    VerdictParse { path: String, message: String },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create an auth header error
    pub fn auth_header(msg: impl Into<String>) -> Self {
        Self::AuthHeader(msg.into())
    }

    /// Create a state resolution error for a file
    pub fn state_resolution(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StateResolution {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invocation error for a file
    pub fn invocation(path: impl Into<String>, source: LlmError) -> Self {
        Self::Invocation {
            path: path.into(),
            source,
        }
    }

    /// Create a stream error for a file
    pub fn stream(path: impl Into<String>, msg: impl Into<String>, events_received: usize) -> Self {
        Self::Stream {
            path: path.into(),
            message: msg.into(),
            events_received,
        }
    }

    /// Create a verdict parse error for a file
    pub fn verdict_parse(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::VerdictParse {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// File path the error is scoped to, if any.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            AppError::StateResolution { path, .. }
            | AppError::Invocation { path, .. }
            | AppError::Stream { path, .. }
            | AppError::VerdictParse { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Whether the error came from the plan's cancellation scope.
    pub fn is_cancelled(&self) -> bool {
        match self {
            AppError::Invocation { source, .. } => source.is_cancelled(),
            AppError::Stream { message, .. } => message == STREAM_CANCELLED,
            _ => false,
        }
    }
}

/// Message recorded on a stream error caused by plan cancellation.
pub const STREAM_CANCELLED: &str = "plan cancelled";

/// Convert AppError to a string
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
