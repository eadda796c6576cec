//! In-memory session registry
//!
//! Maps opaque session ids to authenticated upstream handles. Sessions are:
//! - Created only after the upstream validates the bearer credential
//! - Expired on a sliding TTL, refreshed by every successful lookup
//! - Stored in-memory only (never persisted)
//! - Removed lazily on read, by the periodic sweep, or by explicit revoke
//!
//! The registry exclusively owns each handle; callers get an `Arc` clone
//! scoped to the call that obtained it.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use cb_types::{AppError, AppResult};
use cb_upstream::{HandleFactory, UpstreamHandle};

/// One registered session
struct SessionEntry {
    handle: Arc<dyn UpstreamHandle>,
    /// Refreshed on every successful lookup (sliding expiry)
    created_at: DateTime<Utc>,
}

impl SessionEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.created_at > ttl
    }
}

/// Registry of live sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    factory: Arc<dyn HandleFactory>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn HandleFactory>, ttl_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Create a session from a bearer credential
    ///
    /// Builds a handle, validates it upstream, and registers it under a
    /// fresh random id. Fails with `AuthenticationFailed` (and stores
    /// nothing) when validation fails.
    pub async fn create(&self, bearer_token: &str) -> AppResult<String> {
        let handle = self.factory.build(bearer_token);

        if !handle.validate().await {
            warn!("Session creation rejected: credential failed upstream validation");
            return Err(AppError::AuthenticationFailed);
        }

        let session_id = cb_utils::crypto::generate_opaque_id("cbs")
            .map_err(|e| AppError::Internal(format!("Failed to generate session id: {}", e)))?;

        let entry = SessionEntry {
            handle,
            created_at: Utc::now(),
        };
        self.sessions.write().insert(session_id.clone(), entry);

        info!("Session created: {}", session_id);
        Ok(session_id)
    }

    /// Create a session under a caller-chosen id
    ///
    /// Used for bearer-token driven requests where the key derives from the
    /// verified user id. Same validation contract as `create`.
    pub async fn create_with_id(&self, session_id: &str, bearer_token: &str) -> AppResult<()> {
        let handle = self.factory.build(bearer_token);

        if !handle.validate().await {
            warn!("Session creation rejected: credential failed upstream validation");
            return Err(AppError::AuthenticationFailed);
        }

        let entry = SessionEntry {
            handle,
            created_at: Utc::now(),
        };
        self.sessions.write().insert(session_id.to_string(), entry);

        info!("Session created: {}", session_id);
        Ok(())
    }

    /// Look up a session, refreshing its sliding expiry
    ///
    /// Returns `None` for unknown or expired ids; expired entries are
    /// removed on the spot. Callers translate absence into an
    /// "authentication required" condition. A handle that would fail
    /// upstream validation is NOT detected here; the read path stays a map
    /// lookup.
    pub fn get(&self, session_id: &str) -> Option<Arc<dyn UpstreamHandle>> {
        let mut sessions = self.sessions.write();

        match sessions.get_mut(session_id) {
            Some(entry) => {
                if entry.is_expired(self.ttl) {
                    debug!("Session expired on read: {}", session_id);
                    sessions.remove(session_id);
                    None
                } else {
                    entry.created_at = Utc::now();
                    Some(entry.handle.clone())
                }
            }
            None => None,
        }
    }

    /// Remove a session. Idempotent: revoking an unknown id is a no-op.
    pub fn revoke(&self, session_id: &str) {
        if self.sessions.write().remove(session_id).is_some() {
            info!("Session revoked: {}", session_id);
        }
    }

    /// Whether a session id currently resolves
    pub fn contains(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read();
        sessions
            .get(session_id)
            .is_some_and(|e| !e.is_expired(self.ttl))
    }

    /// Remove every expired session. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Swept {} expired sessions", removed);
        }
        removed
    }

    /// Re-validate every live session against the upstream, revoking any
    /// that now fail. Administrative path, never on the request hot path.
    pub async fn revalidate_all(&self) -> Vec<(String, bool)> {
        // Snapshot outside the lock; validation is a network call.
        let snapshot: Vec<(String, Arc<dyn UpstreamHandle>)> = {
            let sessions = self.sessions.read();
            sessions
                .iter()
                .map(|(id, entry)| (id.clone(), entry.handle.clone()))
                .collect()
        };

        let mut results = Vec::with_capacity(snapshot.len());
        for (session_id, handle) in snapshot {
            let still_valid = handle.validate().await;
            if !still_valid {
                warn!("Session failed revalidation, revoking: {}", session_id);
                self.revoke(&session_id);
            }
            results.push((session_id, still_valid));
        }
        results
    }

    /// Number of live (registered) sessions
    pub fn live_count(&self) -> usize {
        self.sessions.read().len()
    }

    #[cfg(test)]
    fn backdate(&self, session_id: &str, by: Duration) {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.created_at = entry.created_at - by;
        }
    }
}
