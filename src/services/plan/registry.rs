//! Active Plan Registry
//!
//! Tracks the build plans currently in flight, one per `(plan_id, branch)`.
//! Each plan carries a cancellation token derived from the registry root, so
//! a single plan or every plan can be cancelled as a unit.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::utils::error::{AppError, AppResult};

/// Registry key of an active plan
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub plan_id: String,
    pub branch: String,
}

impl PlanKey {
    pub fn new(plan_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            branch: branch.into(),
        }
    }
}

impl fmt::Display for PlanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plan_id, self.branch)
    }
}

/// A build plan currently in flight
#[derive(Debug)]
pub struct ActiveBuildPlan {
    pub id: String,
    pub branch: String,
    pub started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl ActiveBuildPlan {
    pub fn new(
        id: impl Into<String>,
        branch: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            branch: branch.into(),
            started_at: Utc::now(),
            cancel,
        }
    }

    pub fn key(&self) -> PlanKey {
        PlanKey::new(self.id.clone(), self.branch.clone())
    }

    /// Cancellation scope for every model call made on behalf of this plan.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Lookup of active plans, injected into the verify pipeline.
pub trait ActivePlans: Send + Sync {
    /// Active plan for `(plan_id, branch)`, if one is running.
    fn get(&self, plan_id: &str, branch: &str) -> Option<Arc<ActiveBuildPlan>>;

    /// Register a plan; fails if one is already active for its key.
    fn insert(&self, plan: Arc<ActiveBuildPlan>) -> AppResult<()>;

    /// Unregister a plan, returning it if it was active.
    fn remove(&self, plan_id: &str, branch: &str) -> Option<Arc<ActiveBuildPlan>>;
}

/// Concurrent registry of active plans
#[derive(Debug, Default)]
pub struct ActivePlanRegistry {
    plans: DashMap<PlanKey, Arc<ActiveBuildPlan>>,
    root: CancellationToken,
}

impl ActivePlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a plan whose cancellation scope is a child of the
    /// registry root.
    pub fn start_plan(&self, plan_id: &str, branch: &str) -> AppResult<Arc<ActiveBuildPlan>> {
        let plan = Arc::new(ActiveBuildPlan::new(
            plan_id,
            branch,
            self.root.child_token(),
        ));
        self.insert(plan.clone())?;
        Ok(plan)
    }

    /// Cancel a plan and unregister it. Returns false if it was not active.
    pub fn cancel_plan(&self, plan_id: &str, branch: &str) -> bool {
        match self.remove(plan_id, branch) {
            Some(plan) => {
                plan.cancel();
                tracing::info!("[PlanRegistry] Cancelled plan {}", plan.key());
                true
            }
            None => false,
        }
    }

    /// Cancel every plan, including plans registered later through
    /// `start_plan`.
    pub fn shutdown(&self) {
        self.root.cancel();
        let count = self.plans.len();
        self.plans.clear();
        tracing::info!("[PlanRegistry] Shut down, cancelled {} active plans", count);
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

impl ActivePlans for ActivePlanRegistry {
    fn get(&self, plan_id: &str, branch: &str) -> Option<Arc<ActiveBuildPlan>> {
        self.plans
            .get(&PlanKey::new(plan_id, branch))
            .map(|entry| entry.value().clone())
    }

    fn insert(&self, plan: Arc<ActiveBuildPlan>) -> AppResult<()> {
        match self.plans.entry(plan.key()) {
            Entry::Occupied(entry) => Err(AppError::validation(format!(
                "plan {} is already active",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                tracing::debug!("[PlanRegistry] Registered plan {}", entry.key());
                entry.insert(plan);
                Ok(())
            }
        }
    }

    fn remove(&self, plan_id: &str, branch: &str) -> Option<Arc<ActiveBuildPlan>> {
        self.plans
            .remove(&PlanKey::new(plan_id, branch))
            .map(|(_, plan)| plan)
    }
}
