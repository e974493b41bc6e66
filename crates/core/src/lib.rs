//! Build Verify Core
//!
//! Foundational stream types shared by the LLM crate (provider clients and
//! SSE adapters) and the application crate (the verify stream listener).
//! This crate depends on nothing else in the workspace.
//!
//! ## Module Organization
//!
//! - `streaming` - Unified stream event types and adapter trait

pub mod streaming;

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};
