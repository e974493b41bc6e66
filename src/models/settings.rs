//! Settings Models
//!
//! Model-pack configuration: which model (and credential) handles the build
//! pass and which handles the verify pass.

use std::collections::BTreeSet;

use build_verify_llm::ProviderType;
use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, AppResult};

/// Provider-level model description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseModelConfig {
    /// Wire format / default endpoint
    #[serde(default)]
    pub provider: ProviderType,
    /// Model name sent to the provider
    pub model_name: String,
    /// Name of the environment variable holding the API key; also the key
    /// of the model client set
    pub api_key_env_var: String,
    /// Base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Whether the model supports `response_format: json_object`
    #[serde(default)]
    pub has_json_response_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Role a model plays within a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Builder,
    Verifier,
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelRole::Builder => write!(f, "builder"),
            ModelRole::Verifier => write!(f, "verifier"),
        }
    }
}

/// A model bound to a role, with its sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRoleConfig {
    pub role: ModelRole,
    pub base_model_config: BaseModelConfig,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_top_p() -> f32 {
    0.1
}

impl ModelRoleConfig {
    fn validate(&self) -> AppResult<()> {
        let base = &self.base_model_config;
        if base.model_name.trim().is_empty() {
            return Err(AppError::validation(format!(
                "{} model_name must not be empty",
                self.role
            )));
        }
        if base.api_key_env_var.trim().is_empty() {
            return Err(AppError::validation(format!(
                "{} api_key_env_var must not be empty",
                self.role
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AppError::validation(format!(
                "{} temperature {} must be within 0.0..=2.0",
                self.role, self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(AppError::validation(format!(
                "{} top_p {} must be within (0.0, 1.0]",
                self.role, self.top_p
            )));
        }
        Ok(())
    }
}

/// The set of models a plan uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPack {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub builder: ModelRoleConfig,
    /// Verify-pass model; the builder model is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<ModelRoleConfig>,
}

impl ModelPack {
    /// Model configuration for the verify pass.
    pub fn get_verifier(&self) -> &ModelRoleConfig {
        self.verifier.as_ref().unwrap_or(&self.builder)
    }

    /// Every credential env var referenced by the pack.
    pub fn api_key_env_vars(&self) -> BTreeSet<&str> {
        std::iter::once(&self.builder)
            .chain(self.verifier.as_ref())
            .map(|c| c.base_model_config.api_key_env_var.as_str())
            .collect()
    }

    /// Validate the pack
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("model pack name must not be empty"));
        }
        if self.builder.role != ModelRole::Builder {
            return Err(AppError::validation(format!(
                "model pack '{}': builder slot holds a {} config",
                self.name, self.builder.role
            )));
        }
        self.builder.validate()?;
        if let Some(verifier) = &self.verifier {
            if verifier.role != ModelRole::Verifier {
                return Err(AppError::validation(format!(
                    "model pack '{}': verifier slot holds a {} config",
                    self.name, verifier.role
                )));
            }
            verifier.validate()?;
        }
        Ok(())
    }
}

impl Default for ModelPack {
    fn default() -> Self {
        let base = BaseModelConfig {
            provider: ProviderType::OpenAI,
            model_name: "gpt-4o".to_string(),
            api_key_env_var: "OPENAI_API_KEY".to_string(),
            base_url: None,
            has_json_response_mode: true,
            max_tokens: None,
        };
        Self {
            name: "default".to_string(),
            description: Some("gpt-4o for both the build and verify passes".to_string()),
            builder: ModelRoleConfig {
                role: ModelRole::Builder,
                base_model_config: base.clone(),
                temperature: default_temperature(),
                top_p: default_top_p(),
            },
            verifier: Some(ModelRoleConfig {
                role: ModelRole::Verifier,
                base_model_config: base,
                temperature: 0.2,
                top_p: 0.2,
            }),
        }
    }
}

/// Per-plan settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSettings {
    pub model_pack: ModelPack,
}

impl PlanSettings {
    /// Parse settings from JSON and validate them.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let settings: PlanSettings = serde_json::from_str(json)?;
        settings.model_pack.validate()?;
        Ok(settings)
    }
}
