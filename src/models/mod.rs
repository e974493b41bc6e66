//! Data Models
//!
//! Contains the data structures shared by the verify services.

pub mod build;
pub mod settings;

pub use build::*;
pub use settings::*;
