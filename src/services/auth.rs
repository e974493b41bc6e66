//! Auth Header
//!
//! Turns the loaded session credential into the outbound `Authorization`
//! value: the `{token, orgId}` pair as JSON, base64-encoded, sent as a bearer
//! token. Requests fail before touching the network when no session is
//! loaded.

use std::sync::RwLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, AppResult};

const BEARER_PREFIX: &str = "Bearer ";

/// A loaded account session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            org_id: org_id.into(),
            email: None,
        }
    }
}

/// Wire shape of the encoded credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthHeader {
    pub token: String,
    pub org_id: String,
}

/// Encode a session as a full `Authorization` header value.
pub fn encode_auth_header(session: &AuthSession) -> AppResult<String> {
    let header = AuthHeader {
        token: session.token.clone(),
        org_id: session.org_id.clone(),
    };
    let bytes = serde_json::to_vec(&header)
        .map_err(|e| AppError::auth_header(format!("error marshalling auth header: {}", e)))?;
    Ok(format!("{}{}", BEARER_PREFIX, BASE64.encode(bytes)))
}

/// Decode an `Authorization` header value produced by `encode_auth_header`.
pub fn decode_auth_header(value: &str) -> AppResult<AuthHeader> {
    let encoded = value
        .trim()
        .strip_prefix(BEARER_PREFIX)
        .ok_or_else(|| AppError::auth_header("authorization value is not a bearer token"))?;
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| AppError::auth_header(format!("invalid base64 in auth header: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::auth_header(format!("invalid auth header payload: {}", e)))
}

/// Holds the current session for outbound API requests.
#[derive(Debug, Default)]
pub struct AuthStore {
    current: RwLock<Option<AuthSession>>,
}

impl AuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: AuthSession) -> Self {
        Self {
            current: RwLock::new(Some(session)),
        }
    }

    /// Replace the current session.
    pub fn load(&self, session: AuthSession) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(session);
    }

    /// Forget the current session.
    pub fn clear(&self) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = None;
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Authorization value for the current session.
    pub fn authorization_value(&self) -> AppResult<String> {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        let session = current.as_ref().ok_or(AppError::AuthNotLoaded)?;
        encode_auth_header(session)
    }

    /// Attach the authorization header to an outbound request.
    pub fn set_auth_header(
        &self,
        request: reqwest::RequestBuilder,
    ) -> AppResult<reqwest::RequestBuilder> {
        let value = self.authorization_value()?;
        Ok(request.header(reqwest::header::AUTHORIZATION, value))
    }
}
