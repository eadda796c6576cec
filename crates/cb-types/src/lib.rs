//! Shared types for craftboard-mcp

mod errors;

pub use errors::{AppError, AppResult};

use serde::{Deserialize, Serialize};

/// Verified identity returned by the upstream profile endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Upstream user id (stable across logins)
    pub user_id: String,
    /// Email the account was registered with
    pub email: String,
}
