//! Active Plan Registry Integration Tests
//!
//! Registry behaviour under concurrent use and its effect on plan
//! cancellation scopes.

use std::sync::Arc;
use std::time::Duration;

use build_verify::services::plan::{ActiveBuildPlan, ActivePlanRegistry, ActivePlans};
use build_verify::AppError;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_concurrent_start_registers_once() {
    let registry = Arc::new(ActivePlanRegistry::new());

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            registry.start_plan("p1", "main").is_ok()
        }));
    }

    let mut started = 0;
    for task in tasks {
        if task.await.unwrap() {
            started += 1;
        }
    }
    assert_eq!(started, 1);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_cancel_plan_wakes_waiters() {
    let registry = ActivePlanRegistry::new();
    let plan = registry.start_plan("p1", "main").unwrap();

    let token = plan.cancel_token().clone();
    let waiter = tokio::spawn(async move { token.cancelled().await });

    registry.cancel_plan("p1", "main");
    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap();
}

#[test]
fn test_insert_external_plan() {
    let registry = ActivePlanRegistry::new();
    let plan = Arc::new(ActiveBuildPlan::new("p1", "main", CancellationToken::new()));
    registry.insert(plan.clone()).unwrap();

    let err = registry
        .insert(Arc::new(ActiveBuildPlan::new(
            "p1",
            "main",
            CancellationToken::new(),
        )))
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(Arc::ptr_eq(&plan, &registry.get("p1", "main").unwrap()));

    // Plans not derived from the root are not reached by shutdown.
    registry.shutdown();
    assert!(!plan.is_cancelled());
    assert!(registry.is_empty());
}

#[test]
fn test_branches_are_independent() {
    let registry = ActivePlanRegistry::new();
    registry.start_plan("p1", "main").unwrap();
    registry.start_plan("p1", "feature/login").unwrap();
    registry.start_plan("p2", "main").unwrap();

    assert_eq!(registry.len(), 3);
    assert!(registry.cancel_plan("p1", "feature/login"));
    assert!(registry.get("p1", "main").is_some());
    assert!(registry.get("p2", "main").is_some());
}
