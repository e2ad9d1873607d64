//! Connection authorization, delegated to the auth service.
//!
//! The relay never validates credentials itself: it hands the caller's
//! token to the auth service and gets a user id back (or a rejection).

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

/// Why a connection token could not be resolved to a user.
#[derive(Debug)]
pub enum AuthError {
    /// The token is invalid or expired.
    Rejected,
    /// The auth service could not be reached or answered unexpectedly.
    Unavailable(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Rejected => write!(f, "token rejected"),
            AuthError::Unavailable(reason) => write!(f, "auth service unavailable: {reason}"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Resolves a connection token to the authenticated user's id.
#[async_trait]
pub trait SessionAuth: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Uuid, AuthError>;
}

/// Production implementation backed by the auth service's session endpoint.
#[derive(Clone)]
pub struct HttpSessionAuth {
    auth_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(rename = "userId")]
    user_id: Uuid,
}

impl HttpSessionAuth {
    pub fn new(auth_url: &str) -> Self {
        Self {
            auth_url: auth_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SessionAuth for HttpSessionAuth {
    async fn resolve(&self, token: &str) -> Result<Uuid, AuthError> {
        let resp = self
            .http
            .get(format!("{}/api/v1/auth/session", self.auth_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::Rejected);
        }

        let body: SessionResponse = resp
            .error_for_status()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        Ok(body.user_id)
    }
}
