//! Plan Pipeline
//!
//! Active plans and the per-file verify pass:
//! - `registry` - active plans and their cancellation scopes
//! - `verify_state` - verify inputs for a finished build
//! - `build_verify` - issues the verify call
//! - `listener` - consumes the verify stream
//! - `file_state` - per-file state and its single outcome
//! - `clients` - model client set for a plan

pub mod build_verify;
pub mod clients;
pub mod file_state;
pub mod listener;
pub mod registry;
pub mod verify_state;

pub use build_verify::{build_verify_request, BuildVerifier};
pub use clients::{api_keys_from_env, init_clients};
pub use file_state::{ActiveBuildStreamFileState, BuildFileOutcome, BuildFilePhase, ModelClients};
pub use listener::listen_stream_verify_output;
pub use registry::{ActiveBuildPlan, ActivePlanRegistry, ActivePlans, PlanKey};
pub use verify_state::VerifyState;
