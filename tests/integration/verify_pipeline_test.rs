//! Verify Pipeline Integration Tests
//!
//! Drives `BuildVerifier::verify_file_build` end to end against scripted
//! model clients.

use std::sync::Arc;
use std::time::Duration;

use build_verify::models::VerifyVerdict;
use build_verify::services::plan::{
    ActivePlanRegistry, ActivePlans, BuildFileOutcome, BuildVerifier,
};
use build_verify::AppError;
use build_verify_llm::{LlmError, ResponseFormat, RetryPolicy, ToolChoice};

use crate::support::{clients_with, main_go_state, verify_call, Script, ScriptedClient};

const TIMEOUT: Duration = Duration::from_secs(5);

fn setup() -> (Arc<ActivePlanRegistry>, BuildVerifier) {
    let registry = Arc::new(ActivePlanRegistry::new());
    registry.start_plan("p1", "main").unwrap();
    let verifier = BuildVerifier::new(registry.clone()).with_retry_policy(RetryPolicy::none());
    (registry, verifier)
}

// ============================================================================
// Verdicts
// ============================================================================

#[tokio::test]
async fn test_main_go_accepted() {
    let (_registry, verifier) = setup();
    let client = ScriptedClient::new(vec![Script::Events(verify_call(
        r#"{"accepted":true,"reasoning":"run() call added, nothing else changed"}"#,
    ))]);
    let (state, mut rx) = main_go_state(clients_with(client.clone()));

    let handle = verifier.verify_file_build(state).await.unwrap();
    tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();

    match rx.recv().await.unwrap() {
        BuildFileOutcome::Finished {
            file_path,
            verdict,
            note,
        } => {
            assert_eq!(file_path, "main.go");
            assert_eq!(verdict, Some(VerifyVerdict::Accepted));
            assert_eq!(note, "");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(rx.recv().await.is_none());
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_main_go_rejected() {
    let (_registry, verifier) = setup();
    let client = ScriptedClient::new(vec![Script::Events(verify_call(
        r#"{"accepted":false,"reasoning":"main body was emptied","problems":["run() missing"]}"#,
    ))]);
    let (state, mut rx) = main_go_state(clients_with(client));

    let handle = verifier.verify_file_build(state).await.unwrap();
    handle.await.unwrap();

    match rx.recv().await.unwrap() {
        BuildFileOutcome::Finished { verdict, note, .. } => {
            assert!(matches!(verdict, Some(VerifyVerdict::Rejected { .. })));
            assert_eq!(note, "main body was emptied (run() missing)");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_main_go_malformed_output() {
    let (_registry, verifier) = setup();
    let client = ScriptedClient::new(vec![Script::Events(verify_call(
        r#"{"accepted":true,"score":10}"#,
    ))]);
    let (state, mut rx) = main_go_state(clients_with(client));

    let handle = verifier.verify_file_build(state).await.unwrap();
    handle.await.unwrap();

    match rx.recv().await.unwrap() {
        BuildFileOutcome::Errored { file_path, error } => {
            assert_eq!(file_path, "main.go");
            assert!(matches!(error, AppError::VerdictParse { .. }));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(rx.recv().await.is_none());
}

// ============================================================================
// Request shape
// ============================================================================

#[tokio::test]
async fn test_single_request_with_pinned_function() {
    let (_registry, verifier) = setup();
    let client = ScriptedClient::new(vec![Script::Events(verify_call(r#"{"accepted":true}"#))]);
    let (state, _rx) = main_go_state(clients_with(client.clone()));

    verifier.verify_file_build(state).await.unwrap().await.unwrap();

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.model, "gpt-4o");
    assert_eq!(request.tool_choice, ToolChoice::function("verifyOutput"));
    assert_eq!(request.tools.len(), 1);
    assert_eq!(request.temperature, 0.2);
    assert_eq!(request.top_p, 0.2);
    assert_eq!(request.response_format, Some(ResponseFormat::JsonObject));
    assert_eq!(request.messages.len(), 1);
    assert!(request.messages[0].content.contains("Call run() from main"));
}

// ============================================================================
// Short-circuits
// ============================================================================

#[tokio::test]
async fn test_new_file_finishes_without_model_call() {
    let (_registry, verifier) = setup();
    let client = ScriptedClient::new(vec![]);
    let (mut state, mut rx) = main_go_state(clients_with(client.clone()));
    state.pre_build_state = None;

    assert!(verifier.verify_file_build(state).await.is_none());

    match rx.recv().await.unwrap() {
        BuildFileOutcome::Finished { verdict, note, .. } => {
            assert_eq!(verdict, None);
            assert_eq!(note, "");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_removed_plan_is_a_no_op() {
    let (registry, verifier) = setup();
    registry.remove("p1", "main").unwrap();
    let client = ScriptedClient::new(vec![]);
    let (state, mut rx) = main_go_state(clients_with(client.clone()));

    assert!(verifier.verify_file_build(state).await.is_none());

    // No outcome: the state (and its sender) was dropped.
    assert!(rx.recv().await.is_none());
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_inconsistent_build_is_state_error() {
    let (_registry, verifier) = setup();
    let client = ScriptedClient::new(vec![]);
    let (mut state, mut rx) = main_go_state(clients_with(client.clone()));
    if let Some(build) = state.active_build.as_mut() {
        build.file_description.clear();
    }

    assert!(verifier.verify_file_build(state).await.is_none());

    match rx.recv().await.unwrap() {
        BuildFileOutcome::Errored { error, .. } => {
            assert!(matches!(error, AppError::StateResolution { .. }))
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_missing_client_is_config_error() {
    let (_registry, verifier) = setup();
    let (state, mut rx) = main_go_state(Arc::new(Default::default()));

    assert!(verifier.verify_file_build(state).await.is_none());

    match rx.recv().await.unwrap() {
        BuildFileOutcome::Errored { error, .. } => {
            assert!(matches!(error, AppError::Config(_)));
            assert!(error.to_string().contains("OPENAI_API_KEY"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

// ============================================================================
// Retries and cancellation
// ============================================================================

#[tokio::test]
async fn test_retries_exhausted() {
    let registry = Arc::new(ActivePlanRegistry::new());
    registry.start_plan("p1", "main").unwrap();
    let verifier = BuildVerifier::new(registry.clone()).with_retry_policy(RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    });
    let overloaded = || {
        Script::Fail(LlmError::ServerError {
            message: "overloaded".to_string(),
            status: Some(529),
        })
    };
    let client = ScriptedClient::new(vec![overloaded(), overloaded(), overloaded()]);
    let (state, mut rx) = main_go_state(clients_with(client.clone()));

    assert!(verifier.verify_file_build(state).await.is_none());

    match rx.recv().await.unwrap() {
        BuildFileOutcome::Errored { error, .. } => match error {
            AppError::Invocation { path, source } => {
                assert_eq!(path, "main.go");
                assert!(matches!(source, LlmError::ServerError { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        },
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn test_transient_failure_then_verdict() {
    let registry = Arc::new(ActivePlanRegistry::new());
    registry.start_plan("p1", "main").unwrap();
    let verifier = BuildVerifier::new(registry.clone()).with_retry_policy(RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    });
    let client = ScriptedClient::new(vec![
        Script::Fail(LlmError::NetworkError {
            message: "connection reset".to_string(),
        }),
        Script::Events(verify_call(r#"{"accepted":true}"#)),
    ]);
    let (state, mut rx) = main_go_state(clients_with(client.clone()));

    verifier.verify_file_build(state).await.unwrap().await.unwrap();

    assert!(rx.recv().await.unwrap().is_finished());
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_cancel_while_streaming() {
    let (registry, verifier) = setup();
    let client = ScriptedClient::new(vec![Script::Hang]);
    let (state, mut rx) = main_go_state(clients_with(client.clone()));

    let handle = verifier.verify_file_build(state).await.unwrap();
    assert!(registry.cancel_plan("p1", "main"));

    tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();

    match rx.recv().await.unwrap() {
        BuildFileOutcome::Errored { error, .. } => {
            assert!(matches!(error, AppError::Stream { .. }));
            assert!(error.is_cancelled());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(rx.recv().await.is_none());
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_cancel_during_backoff_stops_retrying() {
    let registry = Arc::new(ActivePlanRegistry::new());
    registry.start_plan("p1", "main").unwrap();
    let verifier = Arc::new(BuildVerifier::new(registry.clone()).with_retry_policy(
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
        },
    ));
    let client = ScriptedClient::new(vec![Script::Fail(LlmError::RateLimited {
        message: "slow down".to_string(),
        retry_after: None,
    })]);
    let (state, mut rx) = main_go_state(clients_with(client.clone()));

    let task = {
        let verifier = verifier.clone();
        tokio::spawn(async move { verifier.verify_file_build(state).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    registry.cancel_plan("p1", "main");

    let handle = tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
    assert!(handle.is_none());

    match rx.recv().await.unwrap() {
        BuildFileOutcome::Errored { error, .. } => {
            assert!(matches!(error, AppError::Invocation { .. }));
            assert!(error.is_cancelled());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_files_verified_concurrently() {
    let (_registry, verifier) = setup();
    let client = ScriptedClient::new(vec![
        Script::Events(verify_call(r#"{"accepted":true}"#)),
        Script::Events(verify_call(r#"{"accepted":false,"reasoning":"duplicate import"}"#)),
    ]);
    let clients = clients_with(client.clone());

    let (first, mut first_rx) = main_go_state(clients.clone());
    let (mut second, mut second_rx) = main_go_state(clients);
    second.file_path = "util.go".to_string();

    let a = verifier.verify_file_build(first).await.unwrap();
    let b = verifier.verify_file_build(second).await.unwrap();
    let _ = tokio::join!(a, b);

    assert_eq!(first_rx.recv().await.unwrap().file_path(), "main.go");
    assert_eq!(second_rx.recv().await.unwrap().file_path(), "util.go");
    assert!(first_rx.recv().await.is_none());
    assert!(second_rx.recv().await.is_none());
    assert_eq!(client.calls(), 2);
}
