//! Build File State
//!
//! Per-file state of an in-flight build/verify cycle. The state is owned by a
//! single task; its terminal outcome leaves through an `mpsc` channel and is
//! sent at most once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use build_verify_llm::CompletionClient;
use tokio::sync::mpsc;

use super::registry::PlanKey;
use super::verify_state::{self, VerifyState};
use crate::models::{ActiveBuild, PlanSettings, VerifyVerdict};
use crate::utils::error::{AppError, AppResult};

/// Model clients keyed by credential env var name
pub type ModelClients = Arc<HashMap<String, Arc<dyn CompletionClient>>>;

/// Lifecycle phase of a file's verify pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFilePhase {
    AwaitingVerify,
    Streaming,
    Finished,
    Errored,
}

impl BuildFilePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildFilePhase::Finished | BuildFilePhase::Errored)
    }
}

/// Terminal result of a file's build
#[derive(Debug)]
pub enum BuildFileOutcome {
    /// The build is done. `verdict` is `None` when there was nothing to
    /// verify.
    Finished {
        file_path: String,
        verdict: Option<VerifyVerdict>,
        note: String,
    },
    /// The build failed; the pipeline decides whether to retry it.
    Errored { file_path: String, error: AppError },
}

impl BuildFileOutcome {
    pub fn file_path(&self) -> &str {
        match self {
            BuildFileOutcome::Finished { file_path, .. }
            | BuildFileOutcome::Errored { file_path, .. } => file_path,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, BuildFileOutcome::Finished { .. })
    }
}

/// State of one file moving through the build/verify pipeline
pub struct ActiveBuildStreamFileState {
    pub file_path: String,
    pub plan_id: String,
    pub branch: String,
    pub clients: ModelClients,
    pub settings: Arc<PlanSettings>,
    /// Result of the build pass
    pub active_build: Option<ActiveBuild>,
    /// File content before the build; `None` for new files
    pub pre_build_state: Option<String>,
    /// Snapshot taken by `get_verify_state`
    pub verify_state: Option<VerifyState>,
    phase: BuildFilePhase,
    outcome_tx: Option<mpsc::Sender<BuildFileOutcome>>,
}

impl fmt::Debug for ActiveBuildStreamFileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveBuildStreamFileState")
            .field("file_path", &self.file_path)
            .field("plan_id", &self.plan_id)
            .field("branch", &self.branch)
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl ActiveBuildStreamFileState {
    pub fn new(
        file_path: impl Into<String>,
        plan_id: impl Into<String>,
        branch: impl Into<String>,
        clients: ModelClients,
        settings: Arc<PlanSettings>,
        outcome_tx: mpsc::Sender<BuildFileOutcome>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            plan_id: plan_id.into(),
            branch: branch.into(),
            clients,
            settings,
            active_build: None,
            pre_build_state: None,
            verify_state: None,
            phase: BuildFilePhase::AwaitingVerify,
            outcome_tx: Some(outcome_tx),
        }
    }

    pub fn with_active_build(mut self, build: ActiveBuild) -> Self {
        self.active_build = Some(build);
        self
    }

    pub fn with_pre_build_state(mut self, content: impl Into<String>) -> Self {
        self.pre_build_state = Some(content.into());
        self
    }

    pub fn phase(&self) -> BuildFilePhase {
        self.phase
    }

    pub fn plan_key(&self) -> PlanKey {
        PlanKey::new(self.plan_id.clone(), self.branch.clone())
    }

    /// Resolve and snapshot the verify inputs for this file.
    pub fn get_verify_state(&mut self) -> AppResult<Option<VerifyState>> {
        let state = verify_state::resolve(
            &self.file_path,
            self.active_build.as_ref(),
            self.pre_build_state.as_deref(),
        )?;
        self.verify_state = state.clone();
        Ok(state)
    }

    /// Mark the verify stream as open.
    pub fn begin_streaming(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = BuildFilePhase::Streaming;
        }
    }

    /// Finish the file's build. Returns false if the file already reached a
    /// terminal phase.
    pub async fn on_finish_build_file(
        &mut self,
        verdict: Option<VerifyVerdict>,
        note: impl Into<String>,
    ) -> bool {
        let Some(tx) = self.take_outcome_sender() else {
            return false;
        };
        self.phase = BuildFilePhase::Finished;

        let note = note.into();
        match &verdict {
            Some(VerifyVerdict::Rejected { reason }) => {
                tracing::warn!("[Verify] {} rejected by verifier: {}", self.file_path, reason)
            }
            Some(VerifyVerdict::Accepted) => {
                tracing::info!("[Verify] {} accepted by verifier", self.file_path)
            }
            None => tracing::debug!("[Verify] {} finished without verification", self.file_path),
        }

        let outcome = BuildFileOutcome::Finished {
            file_path: self.file_path.clone(),
            verdict,
            note,
        };
        if tx.send(outcome).await.is_err() {
            tracing::warn!(
                "[Verify] Outcome receiver dropped before {} finished",
                self.file_path
            );
        }
        true
    }

    /// Fail the file's build. Returns false if the file already reached a
    /// terminal phase.
    pub async fn on_build_file_error(&mut self, error: AppError) -> bool {
        let Some(tx) = self.take_outcome_sender() else {
            tracing::debug!(
                "[Verify] Ignoring error for {} after terminal phase: {}",
                self.file_path,
                error
            );
            return false;
        };
        self.phase = BuildFilePhase::Errored;

        tracing::error!("[Verify] Build failed for {}: {}", self.file_path, error);

        let outcome = BuildFileOutcome::Errored {
            file_path: self.file_path.clone(),
            error,
        };
        if tx.send(outcome).await.is_err() {
            tracing::warn!(
                "[Verify] Outcome receiver dropped before {} errored",
                self.file_path
            );
        }
        true
    }

    fn take_outcome_sender(&mut self) -> Option<mpsc::Sender<BuildFileOutcome>> {
        if self.phase.is_terminal() {
            return None;
        }
        self.outcome_tx.take()
    }
}
