//! Services
//!
//! Business logic for the verify stage.

pub mod auth;
pub mod plan;
pub mod prompts;

pub use auth::{decode_auth_header, encode_auth_header, AuthHeader, AuthSession, AuthStore};
