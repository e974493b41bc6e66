//! Build Models
//!
//! Results produced by the build pass and consumed by the verify pass.

use serde::{Deserialize, Serialize};

/// Build-pass result for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveBuild {
    /// Model reply the build was derived from
    pub reply_id: String,
    pub path: String,
    /// Description of the proposed change, as written by the planning model
    #[serde(default)]
    pub file_description: String,
    /// File content after the proposed change was applied; `None` until the
    /// build pass has written it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_verify_updated_state: Option<String>,
}

impl ActiveBuild {
    pub fn new(reply_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            reply_id: reply_id.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.file_description = description.into();
        self
    }

    pub fn with_updated_state(mut self, updated: impl Into<String>) -> Self {
        self.to_verify_updated_state = Some(updated.into());
        self
    }
}

/// Structured verdict returned by the verifier model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyVerdict {
    /// The applied content matches the proposed change
    Accepted,
    /// The applied content does not match; `reason` says why
    Rejected { reason: String },
}

impl VerifyVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, VerifyVerdict::Accepted)
    }

    /// Note passed to the finish callback alongside the verdict.
    pub fn note(&self) -> &str {
        match self {
            VerifyVerdict::Accepted => "",
            VerifyVerdict::Rejected { reason } => reason,
        }
    }
}
