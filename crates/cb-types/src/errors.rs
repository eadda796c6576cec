//! Error types and conversions
//!
//! One taxonomy for the whole workspace. The JSON-RPC and OAuth layers are
//! the only places allowed to translate these into wire shapes; everything
//! below them propagates `AppError` with `?`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream identity endpoint rejected an email/password pair
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Upstream profile endpoint rejected a bearer token
    #[error("Invalid token")]
    InvalidToken,

    /// Authorization code unknown, expired, already redeemed, or backed by
    /// a token that no longer validates
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    /// Token endpoint called with anything other than authorization_code
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Network or timeout failure reaching the upstream API
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream returned success but the body had no usable token field
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// tools/call named a tool outside the catalog
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments failed schema validation
    #[error("Invalid arguments: {0}")]
    Validation(String),

    /// No session header, or the session id did not resolve
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Session creation failed because the credential did not validate
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// JSON-RPC method outside the supported set
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}

impl AppError {
    /// Whether this error maps to the "authentication required" wire message
    pub fn is_auth_required(&self) -> bool {
        matches!(
            self,
            AppError::AuthenticationRequired | AppError::AuthenticationFailed
        )
    }
}
