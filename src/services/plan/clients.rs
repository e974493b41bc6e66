//! Model Clients
//!
//! Builds the model client set for a plan: one streaming client per distinct
//! credential env var referenced by the model pack.

use std::collections::HashMap;
use std::sync::Arc;

use build_verify_llm::{CompletionClient, OpenAIClient, OpenAIClientConfig};

use super::file_state::ModelClients;
use crate::models::ModelPack;
use crate::utils::error::{AppError, AppResult};

/// Read the API keys referenced by `pack` from the process environment.
/// Unset or empty variables are left out.
pub fn api_keys_from_env(pack: &ModelPack) -> HashMap<String, String> {
    pack.api_key_env_vars()
        .into_iter()
        .filter_map(|var| match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Some((var.to_string(), value)),
            _ => None,
        })
        .collect()
}

/// Create a client for every credential env var in `pack`.
///
/// Roles sharing an env var share a client; the builder's endpoint settings
/// win when both roles name the same variable.
pub fn init_clients(
    api_keys: &HashMap<String, String>,
    pack: &ModelPack,
    proxy: Option<&str>,
) -> AppResult<ModelClients> {
    let mut clients: HashMap<String, Arc<dyn CompletionClient>> = HashMap::new();

    for role in std::iter::once(&pack.builder).chain(pack.verifier.as_ref()) {
        let base = &role.base_model_config;
        if clients.contains_key(&base.api_key_env_var) {
            continue;
        }

        let api_key = api_keys.get(&base.api_key_env_var).ok_or_else(|| {
            AppError::config(format!(
                "{} model '{}' needs {}, which is not set",
                role.role, base.model_name, base.api_key_env_var
            ))
        })?;

        let client = OpenAIClient::new(OpenAIClientConfig {
            provider: base.provider,
            api_key: Some(api_key.clone()),
            base_url: base.base_url.clone(),
            proxy: proxy.map(str::to_string),
        })
        .map_err(|e| AppError::config(format!("failed to create model client: {}", e)))?;

        tracing::debug!(
            "[Verify] Created {} client for {}",
            base.provider,
            base.api_key_env_var
        );
        clients.insert(base.api_key_env_var.clone(), Arc::new(client));
    }

    Ok(Arc::new(clients))
}
