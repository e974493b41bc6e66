//! Provider-Specific Stream Adapters
//!
//! Each adapter handles the unique streaming format of its provider.

pub mod openai;

pub use openai::OpenAIAdapter;
