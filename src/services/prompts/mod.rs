//! Prompts
//!
//! Prompt templates and forced-function contracts for model calls.

pub mod verify;

pub use verify::{
    parse_verify_output, verify_output_fn, DefaultVerifyPrompt, VerifyPromptRenderer,
    VERIFY_OUTPUT_FN_NAME,
};
