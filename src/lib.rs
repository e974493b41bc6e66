//! Build Verify
//!
//! Verification stage of the file-build pipeline. After a model has proposed
//! and applied changes to a file, a second model pass checks that the applied
//! content matches the proposed change before the file's build is finished.
//! It includes:
//! - Active plan registry with per-plan cancellation scopes
//! - Verify state resolution and the forced `verifyOutput` call
//! - Stream listener driving each file to a single outcome
//! - Auth header codec for outbound API requests

pub mod models;
pub mod services;
pub mod utils;

// Re-export the verify pipeline entry points
pub use models::{ActiveBuild, ModelPack, ModelRole, ModelRoleConfig, PlanSettings, VerifyVerdict};
pub use services::auth::{AuthSession, AuthStore};
pub use services::plan::{
    ActiveBuildPlan, ActiveBuildStreamFileState, ActivePlanRegistry, ActivePlans,
    BuildFileOutcome, BuildFilePhase, BuildVerifier, VerifyState,
};
pub use utils::error::{AppError, AppResult};
