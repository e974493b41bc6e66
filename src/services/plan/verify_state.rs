//! Verify State
//!
//! Extracts the inputs of a verify pass from a file's build state.

use crate::models::ActiveBuild;
use crate::utils::error::{AppError, AppResult};

/// Inputs of one verify pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyState {
    /// File content before the build
    pub pre_build_state: String,
    /// File content after the proposed change was applied
    pub updated_state: String,
    /// Description of the proposed change
    pub proposed_changes: String,
}

/// Resolve the verify inputs for a file.
///
/// Returns `Ok(None)` when there is nothing to compare: the file is new (no
/// pre-build content) or the build recorded no updated content.
pub fn resolve(
    path: &str,
    active_build: Option<&ActiveBuild>,
    pre_build_state: Option<&str>,
) -> AppResult<Option<VerifyState>> {
    let build = active_build
        .ok_or_else(|| AppError::state_resolution(path, "no active build for file"))?;

    let pre_build_state = match pre_build_state {
        Some(pre) if !pre.is_empty() => pre,
        _ => return Ok(None),
    };

    let updated_state = match build.to_verify_updated_state.as_deref() {
        Some(updated) if !updated.is_empty() => updated,
        _ => return Ok(None),
    };

    if build.file_description.trim().is_empty() {
        return Err(AppError::state_resolution(
            path,
            "updated content recorded without a proposed-change description",
        ));
    }

    Ok(Some(VerifyState {
        pre_build_state: pre_build_state.to_string(),
        updated_state: updated_state.to_string(),
        proposed_changes: build.file_description.clone(),
    }))
}
