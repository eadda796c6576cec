//! Credential verification against the Craftboard identity service
//!
//! Stateless. Three calls: exchange email/password for a bearer token,
//! quiet token liveness, and token-to-identity resolution. Timeouts here are
//! the short identity timeout; a timed-out call is a network failure, never
//! "invalid credentials".

use async_trait::async_trait;
use cb_types::{AppError, AppResult, Identity};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Identity-service operations the broker and dispatcher depend on
///
/// Implemented by [`CredentialVerifier`]; tests substitute stubs.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Exchange an email/password pair for a bearer token
    async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<String>;

    /// Quiet liveness probe for a bearer token. False on any failure.
    async fn verify_token(&self, bearer_token: &str) -> bool;

    /// Resolve a bearer token to the identity behind it
    async fn resolve_identity(&self, bearer_token: &str) -> AppResult<Identity>;
}

/// Login response from the identity service
///
/// The field name has drifted across upstream releases; accept either.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl LoginResponse {
    fn into_token(self) -> Option<String> {
        self.token.or(self.access_token).filter(|t| !t.is_empty())
    }
}

/// Profile response from the identity service
#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(alias = "user_id")]
    id: String,
    email: String,
}

/// Stateless verifier for Craftboard credentials
pub struct CredentialVerifier {
    client: Client,
    identity_base_url: String,
    timeout: Duration,
}

impl CredentialVerifier {
    pub fn new(identity_base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            identity_base_url: identity_base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.identity_base_url, path)
    }
}

#[async_trait]
impl IdentityVerifier for CredentialVerifier {
    async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<String> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Login request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!("Identity service rejected credentials for {}", email);
            return Err(AppError::InvalidCredentials);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamUnavailable(format!(
                "Login failed with status {}: {}",
                status, body
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedUpstreamResponse(e.to_string()))?;

        let token = login.into_token().ok_or_else(|| {
            AppError::MalformedUpstreamResponse("No token field in login response".to_string())
        })?;

        info!("Credentials verified for {}", email);
        Ok(token)
    }

    async fn verify_token(&self, bearer_token: &str) -> bool {
        let result = self
            .client
            .get(self.url("/auth/check"))
            .bearer_auth(bearer_token)
            .timeout(self.timeout)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Token liveness check failed: {}", e);
                false
            }
        }
    }

    async fn resolve_identity(&self, bearer_token: &str) -> AppResult<Identity> {
        let response = self
            .client
            .get(self.url("/me"))
            .bearer_auth(bearer_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Profile request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::InvalidToken);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamUnavailable(format!(
                "Profile failed with status {}: {}",
                status, body
            )));
        }

        let profile: ProfileResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedUpstreamResponse(e.to_string()))?;

        Ok(Identity {
            user_id: profile.id,
            email: profile.email,
        })
    }
}
