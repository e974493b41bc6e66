//! Build Verification
//!
//! Runs the verify pass for a file whose build has finished: resolves the
//! verify inputs, issues one forced-function completion call under the
//! plan's cancellation scope, and hands the stream to a listener task.

use std::sync::Arc;

use build_verify_llm::{
    create_stream_with_retries, ChatRequest, CompletionClient, CompletionStream, Message,
    ResponseFormat, RetryPolicy, ToolChoice,
};
use tokio::task::JoinHandle;

use super::file_state::{ActiveBuildStreamFileState, ModelClients};
use super::listener::listen_stream_verify_output;
use super::registry::{ActiveBuildPlan, ActivePlans};
use super::verify_state::VerifyState;
use crate::models::ModelRoleConfig;
use crate::services::prompts::{
    verify_output_fn, DefaultVerifyPrompt, VerifyPromptRenderer, VERIFY_OUTPUT_FN_NAME,
};
use crate::utils::error::{AppError, AppResult};

/// Runs verify passes for files of active plans
pub struct BuildVerifier {
    plans: Arc<dyn ActivePlans>,
    prompt: Arc<dyn VerifyPromptRenderer>,
    retry: RetryPolicy,
}

impl BuildVerifier {
    pub fn new(plans: Arc<dyn ActivePlans>) -> Self {
        Self {
            plans,
            prompt: Arc::new(DefaultVerifyPrompt),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn VerifyPromptRenderer>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Verify a file's finished build.
    ///
    /// Returns the listener task when a verify stream was opened. Every other
    /// path has already resolved the file (finished or errored) before
    /// returning, except a missing plan, which is logged and left alone.
    pub async fn verify_file_build(
        &self,
        mut file_state: ActiveBuildStreamFileState,
    ) -> Option<JoinHandle<()>> {
        let Some(plan) = self.plans.get(&file_state.plan_id, &file_state.branch) else {
            tracing::warn!(
                "[Verify] Active plan not found for plan {} on branch {}, skipping {}",
                file_state.plan_id,
                file_state.branch,
                file_state.file_path
            );
            return None;
        };

        let verify_state = match file_state.get_verify_state() {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::debug!(
                    "[Verify] Nothing to verify for {}, finishing",
                    file_state.file_path
                );
                file_state.on_finish_build_file(None, "").await;
                return None;
            }
            Err(e) => {
                file_state.on_build_file_error(e).await;
                return None;
            }
        };

        match self.invoke_verify(&file_state, &verify_state, &plan).await {
            Ok(stream) => {
                let cancel = plan.cancel_token().clone();
                Some(tokio::spawn(listen_stream_verify_output(
                    file_state, stream, cancel,
                )))
            }
            Err(e) => {
                file_state.on_build_file_error(e).await;
                None
            }
        }
    }

    /// Issue the verify completion call for a file.
    pub async fn invoke_verify(
        &self,
        file_state: &ActiveBuildStreamFileState,
        verify_state: &VerifyState,
        plan: &ActiveBuildPlan,
    ) -> AppResult<CompletionStream> {
        let path = &file_state.file_path;
        let config = file_state.settings.model_pack.get_verifier();
        let sys_prompt = self.prompt.render(path, verify_state);
        let request = build_verify_request(config, sys_prompt);

        let env_var = &config.base_model_config.api_key_env_var;
        let client = resolve_client(&file_state.clients, path, env_var)?;

        tracing::info!(
            "[Verify] Verifying {} with {} (plan {})",
            path,
            request.model,
            plan.key()
        );

        create_stream_with_retries(client.as_ref(), plan.cancel_token(), &request, &self.retry)
            .await
            .map_err(|e| AppError::invocation(path.as_str(), e))
    }
}

/// Build the verify request: one system message and the forced
/// `verifyOutput` function, sampled with the role's parameters as given.
pub fn build_verify_request(config: &ModelRoleConfig, sys_prompt: String) -> ChatRequest {
    let base = &config.base_model_config;
    ChatRequest {
        model: base.model_name.clone(),
        messages: vec![Message::system(sys_prompt)],
        tools: vec![verify_output_fn()],
        tool_choice: ToolChoice::function(VERIFY_OUTPUT_FN_NAME),
        temperature: config.temperature,
        top_p: config.top_p,
        max_tokens: base.max_tokens,
        response_format: base
            .has_json_response_mode
            .then_some(ResponseFormat::JsonObject),
    }
}

fn resolve_client(
    clients: &ModelClients,
    path: &str,
    env_var: &str,
) -> AppResult<Arc<dyn CompletionClient>> {
    clients.get(env_var).cloned().ok_or_else(|| {
        AppError::config(format!(
            "no model client for {} (needed to verify {})",
            env_var, path
        ))
    })
}
