//! Upstream API handle trait
//!
//! The session registry owns one handle per session; the dispatcher only
//! ever sees `Arc<dyn UpstreamHandle>`. Tests substitute stubs.

use async_trait::async_trait;
use cb_types::AppResult;
use serde_json::Value;
use std::sync::Arc;

/// An authenticated handle onto the upstream Craftboard API
#[async_trait]
pub trait UpstreamHandle: Send + Sync {
    /// Lightweight liveness check for the bearer credential behind this
    /// handle. Quiet: returns false on any failure, never errors.
    async fn validate(&self) -> bool;

    /// Perform a named upstream operation with JSON parameters
    async fn invoke(&self, operation: &str, params: &Value) -> AppResult<Value>;

    /// Best-effort project discovery. The upstream has no listing endpoint
    /// for this, so the result may be an incomplete set.
    async fn list_accessible_projects(&self) -> Vec<String>;
}

/// Builds handles from bearer credentials
///
/// Injected into the session registry so tests can hand out stub handles.
pub trait HandleFactory: Send + Sync {
    fn build(&self, bearer_token: &str) -> Arc<dyn UpstreamHandle>;
}
