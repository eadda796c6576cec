//! Ephemeral authorization-code and callback-session stores

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use cb_types::{AppError, AppResult};
use cb_upstream::IdentityVerifier;

/// `state` value IDE clients send to request the credential form directly,
/// skipping the callback-session indirection.
pub const DIRECT_LOGIN_STATE: &str = "mcp-auth";

/// A not-yet-redeemed authorization code
struct PendingAuthorization {
    bearer_token: String,
    created_at: DateTime<Utc>,
}

/// Bridges a caller-supplied redirect target through the login form.
///
/// Exists because the upstream identity provider cannot register arbitrary
/// per-client redirect URIs; the gateway itself remembers where to send the
/// caller back.
struct CallbackSession {
    original_state: String,
    redirect_uri: String,
    client_id: String,
    created_at: DateTime<Utc>,
}

/// What `begin_authorization` tells the HTTP layer to do
#[derive(Debug, PartialEq, Eq)]
pub enum AuthorizeAction {
    /// Render the credential form directly
    ShowForm { state: String, redirect_uri: String },
    /// Redirect the browser to the identity provider's login page,
    /// which will return through our `/callback` bridge
    RedirectToProvider { location: String },
}

/// What `submit_credentials` tells the HTTP layer to do on success
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Send the caller back to their redirect URI with `code` and `state`
    Redirect { location: String },
    /// Direct-login flow: render the success page embedding the code
    SuccessPage { code: String },
}

/// Authorization-code broker
pub struct AuthCodeBroker {
    pending: RwLock<HashMap<String, PendingAuthorization>>,
    callbacks: RwLock<HashMap<String, CallbackSession>>,
    verifier: Arc<dyn IdentityVerifier>,
    /// Identity provider login page (used for the indirect flow)
    provider_login_url: String,
    /// This gateway's own public callback URI
    callback_uri: String,
    ttl: Duration,
}

impl AuthCodeBroker {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        provider_login_url: &str,
        callback_uri: &str,
        ttl_secs: u64,
    ) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(HashMap::new()),
            verifier,
            provider_login_url: provider_login_url.to_string(),
            callback_uri: callback_uri.to_string(),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Start an authorization attempt
    pub fn begin_authorization(
        &self,
        requested_state: &str,
        caller_redirect_uri: &str,
        client_id: &str,
    ) -> AppResult<AuthorizeAction> {
        if requested_state == DIRECT_LOGIN_STATE {
            debug!("Direct-login marker present, showing credential form");
            return Ok(AuthorizeAction::ShowForm {
                state: requested_state.to_string(),
                redirect_uri: caller_redirect_uri.to_string(),
            });
        }

        // Indirect flow: remember where to send the caller back, then point
        // the provider at our own /callback keyed by the session.
        let session_key = cb_utils::crypto::generate_opaque_id("cbk")
            .map_err(|e| AppError::Internal(format!("Failed to generate session key: {}", e)))?;

        let session = CallbackSession {
            original_state: requested_state.to_string(),
            redirect_uri: caller_redirect_uri.to_string(),
            client_id: client_id.to_string(),
            created_at: Utc::now(),
        };
        self.callbacks.write().insert(session_key.clone(), session);

        let bridged_redirect = format!("{}?session={}", self.callback_uri, session_key);
        let location = format!(
            "{}?redirect_uri={}",
            self.provider_login_url,
            urlencoding::encode(&bridged_redirect)
        );

        info!(
            "Authorization started for client {} via callback session",
            client_id
        );
        Ok(AuthorizeAction::RedirectToProvider { location })
    }

    /// Verify submitted credentials and mint a single-use code
    ///
    /// On verifier failure the error propagates; the HTTP layer re-renders
    /// the form and never redirects, so no state leaks to an unintended
    /// target.
    pub async fn submit_credentials(
        &self,
        email: &str,
        password: &str,
        state: &str,
        redirect_uri: &str,
    ) -> AppResult<SubmitOutcome> {
        let bearer_token = self.verifier.verify_credentials(email, password).await?;

        let code = cb_utils::crypto::generate_opaque_id("cbc")
            .map_err(|e| AppError::Internal(format!("Failed to generate code: {}", e)))?;

        self.pending.write().insert(
            code.clone(),
            PendingAuthorization {
                bearer_token,
                created_at: Utc::now(),
            },
        );

        // A submission that came through the callback bridge carries its
        // session key in the redirect_uri query; consume it (one-shot) to
        // recover the caller's true target.
        if let Some(session_key) = extract_session_key(redirect_uri) {
            let session = self.callbacks.write().remove(&session_key);
            match session {
                Some(session) if Utc::now() - session.created_at <= self.ttl => {
                    info!(
                        "Issuing code through callback session for client {}",
                        session.client_id
                    );
                    let location = format!(
                        "{}?code={}&state={}",
                        session.redirect_uri,
                        urlencoding::encode(&code),
                        urlencoding::encode(&session.original_state)
                    );
                    return Ok(SubmitOutcome::Redirect { location });
                }
                Some(_) => {
                    warn!("Callback session expired before credentials arrived");
                    return Err(AppError::InvalidGrant(
                        "Login session expired, restart authorization".to_string(),
                    ));
                }
                None => {
                    warn!("Unknown callback session key on credential submission");
                    return Err(AppError::InvalidGrant(
                        "Unknown login session, restart authorization".to_string(),
                    ));
                }
            }
        }

        if state == DIRECT_LOGIN_STATE || redirect_uri.is_empty() {
            return Ok(SubmitOutcome::SuccessPage { code });
        }

        let location = format!(
            "{}?code={}&state={}",
            redirect_uri,
            urlencoding::encode(&code),
            urlencoding::encode(state)
        );
        Ok(SubmitOutcome::Redirect { location })
    }

    /// Redeem a single-use authorization code for its bearer credential
    pub async fn redeem_code(&self, code: &str, grant_type: &str) -> AppResult<String> {
        if grant_type != "authorization_code" {
            return Err(AppError::UnsupportedGrantType(grant_type.to_string()));
        }

        // Remove first: the code is consumed whether or not the credential
        // still validates. A second redemption must fail.
        let pending = self.pending.write().remove(code);

        let pending = pending.ok_or_else(|| {
            AppError::InvalidGrant("Authorization code is unknown or already redeemed".to_string())
        })?;

        if Utc::now() - pending.created_at > self.ttl {
            debug!("Rejected expired authorization code");
            return Err(AppError::InvalidGrant(
                "Authorization code expired".to_string(),
            ));
        }

        // A credential valid at issue time may have been revoked since.
        if !self.verifier.verify_token(&pending.bearer_token).await {
            warn!("Authorization code backed by a credential that no longer validates");
            return Err(AppError::InvalidGrant(
                "Credential no longer valid".to_string(),
            ));
        }

        info!("Authorization code redeemed");
        Ok(pending.bearer_token)
    }

    /// Remove expired ephemeral records from both stores
    pub fn sweep_expired(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let mut removed = 0;

        {
            let mut pending = self.pending.write();
            let before = pending.len();
            pending.retain(|_, p| p.created_at > cutoff);
            removed += before - pending.len();
        }
        {
            let mut callbacks = self.callbacks.write();
            let before = callbacks.len();
            callbacks.retain(|_, c| c.created_at > cutoff);
            removed += before - callbacks.len();
        }

        if removed > 0 {
            debug!("Swept {} expired authorization records", removed);
        }
        removed
    }

    /// Number of not-yet-redeemed codes (for tests and health reporting)
    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    #[cfg(test)]
    fn backdate_code(&self, code: &str, by: Duration) {
        let mut pending = self.pending.write();
        if let Some(p) = pending.get_mut(code) {
            p.created_at = p.created_at - by;
        }
    }

    #[cfg(test)]
    fn backdate_callback(&self, key: &str, by: Duration) {
        let mut callbacks = self.callbacks.write();
        if let Some(c) = callbacks.get_mut(key) {
            c.created_at = c.created_at - by;
        }
    }
}

/// Extract the callback-session key from a bridged redirect URI
fn extract_session_key(redirect_uri: &str) -> Option<String> {
    let query = redirect_uri.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == "session" && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}
