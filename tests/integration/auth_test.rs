//! Auth Header Integration Tests
//!
//! Outbound requests carry the encoded session, or fail before any network
//! call when no session is loaded.

use build_verify::services::auth::{decode_auth_header, AuthSession, AuthStore};
use build_verify::AppError;

// Port 9 (discard) on loopback; nothing in these tests ever sends.
const API_URL: &str = "http://127.0.0.1:9/api/plans";

#[test]
fn test_request_without_session_fails_before_sending() {
    let store = AuthStore::new();
    let client = reqwest::Client::new();

    let err = store.set_auth_header(client.post(API_URL)).unwrap_err();
    assert!(matches!(err, AppError::AuthNotLoaded));
    assert_eq!(err.to_string(), "error setting auth header: auth not loaded");
}

#[test]
fn test_session_round_trips_through_request() {
    let store = AuthStore::new();
    store.load(AuthSession::new("tok-abc", "org-42"));

    let request = store
        .set_auth_header(reqwest::Client::new().post(API_URL))
        .unwrap()
        .build()
        .unwrap();

    let value = request.headers()["authorization"].to_str().unwrap();
    assert!(value.starts_with("Bearer "));
    let header = decode_auth_header(value).unwrap();
    assert_eq!(header.token, "tok-abc");
    assert_eq!(header.org_id, "org-42");
}

#[test]
fn test_cleared_session_fails() {
    let store = AuthStore::with_session(AuthSession::new("tok", "org"));
    assert!(store.is_loaded());
    store.clear();
    assert!(matches!(
        store.set_auth_header(reqwest::Client::new().get(API_URL)),
        Err(AppError::AuthNotLoaded)
    ));
}
