//! Verify Prompt
//!
//! System prompt for the verify pass and the `verifyOutput` function the
//! verifier is forced to call.

use std::collections::HashMap;

use build_verify_llm::{ParameterSchema, ToolDefinition};
use serde::Deserialize;

use crate::models::VerifyVerdict;
use crate::services::plan::verify_state::VerifyState;
use crate::utils::error::{AppError, AppResult};

/// Name of the forced verification function
pub const VERIFY_OUTPUT_FN_NAME: &str = "verifyOutput";

/// Renders the verify-pass system prompt.
pub trait VerifyPromptRenderer: Send + Sync {
    fn render(&self, path: &str, state: &VerifyState) -> String;
}

/// Built-in verify prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultVerifyPrompt;

impl VerifyPromptRenderer for DefaultVerifyPrompt {
    fn render(&self, path: &str, state: &VerifyState) -> String {
        format!(
            "You are a careful code reviewer checking that a proposed change was applied correctly.\n\n\
             File: {path}\n\n\
             ## Original file\n\n```\n{pre}\n```\n\n\
             ## Proposed changes\n\n{proposed}\n\n\
             ## Updated file\n\n```\n{updated}\n```\n\n\
             Compare the updated file against the original file and the proposed changes. \
             Check that every proposed change is present, that nothing outside the proposed \
             changes was removed or altered, and that the updated file has no syntax errors, \
             duplicated code or leftover placeholders.\n\n\
             Call the {fn_name} function with your verdict. Set `accepted` to true only if \
             the updated file is correct. If it is not, set `accepted` to false and explain \
             the problems in `reasoning`.",
            path = path,
            pre = state.pre_build_state,
            proposed = state.proposed_changes,
            updated = state.updated_state,
            fn_name = VERIFY_OUTPUT_FN_NAME,
        )
    }
}

/// Tool definition for the forced verification function.
pub fn verify_output_fn() -> ToolDefinition {
    let mut properties = HashMap::new();
    properties.insert(
        "accepted".to_string(),
        ParameterSchema::boolean(Some(
            "true if the updated file correctly applies the proposed changes",
        )),
    );
    properties.insert(
        "reasoning".to_string(),
        ParameterSchema::string(Some("Why the updated file was accepted or rejected")),
    );
    properties.insert(
        "problems".to_string(),
        ParameterSchema::array(
            Some("Specific problems found in the updated file"),
            ParameterSchema::string(None),
        ),
    );

    ToolDefinition {
        name: VERIFY_OUTPUT_FN_NAME.to_string(),
        description: "Report whether the proposed changes were applied correctly".to_string(),
        input_schema: ParameterSchema::object(
            None,
            properties,
            vec!["accepted".to_string()],
        ),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerifyOutputArgs {
    accepted: bool,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    problems: Vec<String>,
}

/// Parse the arguments of a completed `verifyOutput` call.
///
/// The call must target the forced function and match its schema exactly;
/// a rejection must say why.
pub fn parse_verify_output(path: &str, tool_name: &str, arguments: &str) -> AppResult<VerifyVerdict> {
    if tool_name != VERIFY_OUTPUT_FN_NAME {
        return Err(AppError::verdict_parse(
            path,
            format!(
                "expected a call to {}, got '{}'",
                VERIFY_OUTPUT_FN_NAME, tool_name
            ),
        ));
    }

    let args: VerifyOutputArgs = serde_json::from_str(arguments)
        .map_err(|e| AppError::verdict_parse(path, format!("invalid arguments: {}", e)))?;

    if args.accepted {
        return Ok(VerifyVerdict::Accepted);
    }

    let reasoning = args
        .reasoning
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    let problems: Vec<&str> = args
        .problems
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

    let reason = match (reasoning, problems.is_empty()) {
        (Some(r), true) => r.to_string(),
        (Some(r), false) => format!("{} ({})", r, problems.join("; ")),
        (None, false) => problems.join("; "),
        (None, true) => {
            return Err(AppError::verdict_parse(
                path,
                "rejection carries no reasoning",
            ))
        }
    };

    Ok(VerifyVerdict::Rejected { reason })
}
