//! Configuration management
//!
//! All configuration is environment-level: values, not behavior. Loaded once
//! at startup from `CRAFTBOARD_MCP_*` variables with baked-in defaults, then
//! shared immutably across handlers.

use cb_types::{AppError, AppResult};
use serde::Deserialize;

/// Environment variable prefix for all settings
const ENV_PREFIX: &str = "CRAFTBOARD_MCP";

/// Server configuration
///
/// Every field can be overridden via `CRAFTBOARD_MCP_<UPPER_SNAKE_NAME>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the upstream Craftboard API
    pub upstream_base_url: String,

    /// Base URL of the upstream identity service (login, profile, liveness)
    pub identity_base_url: String,

    /// Publicly reachable base URI of this gateway (used in OAuth redirects)
    pub public_base_uri: String,

    /// Port to bind the HTTP server on
    pub bind_port: u16,

    /// Session time-to-live in seconds (sliding, refreshed on every lookup)
    pub session_ttl_secs: u64,

    /// TTL for ephemeral authorization records (codes, callback sessions)
    pub ephemeral_ttl_secs: u64,

    /// Interval between session expiry sweeps
    pub session_sweep_interval_secs: u64,

    /// Interval between ephemeral-record expiry sweeps
    pub ephemeral_sweep_interval_secs: u64,

    /// Interval between administrative session revalidation passes.
    /// 0 disables the background task.
    pub revalidate_interval_secs: u64,

    /// Timeout for identity calls (login, token liveness, profile)
    pub identity_timeout_secs: u64,

    /// Timeout for upstream data calls (tool invocations)
    pub data_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upstream_base_url: "https://api.craftboard.app/v1".to_string(),
            identity_base_url: "https://id.craftboard.app".to_string(),
            public_base_uri: "http://localhost:8742".to_string(),
            bind_port: 8742,
            session_ttl_secs: 86_400,
            ephemeral_ttl_secs: 300,
            session_sweep_interval_secs: 3_600,
            ephemeral_sweep_interval_secs: 60,
            revalidate_interval_secs: 0,
            identity_timeout_secs: 10,
            data_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment, falling back to defaults
    pub fn load() -> AppResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to read environment: {}", e)))?;

        let cfg: ServerConfig = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Invalid configuration value: {}", e)))?;

        tracing::debug!(
            "Configuration loaded: upstream={}, identity={}, port={}",
            cfg.upstream_base_url,
            cfg.identity_base_url,
            cfg.bind_port
        );

        Ok(cfg)
    }

    /// Redirect URI this gateway registers for its own callback bridge
    pub fn callback_uri(&self) -> String {
        format!("{}/callback", self.public_base_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_port, 8742);
        assert_eq!(cfg.session_ttl_secs, 86_400);
        assert_eq!(cfg.ephemeral_ttl_secs, 300);
        assert_eq!(cfg.identity_timeout_secs, 10);
        assert_eq!(cfg.data_timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("CRAFTBOARD_MCP_BIND_PORT", "9000");
        std::env::set_var("CRAFTBOARD_MCP_SESSION_TTL_SECS", "120");

        let cfg = ServerConfig::load().unwrap();
        assert_eq!(cfg.bind_port, 9000);
        assert_eq!(cfg.session_ttl_secs, 120);
        // Untouched fields keep their defaults
        assert_eq!(cfg.ephemeral_ttl_secs, 300);

        std::env::remove_var("CRAFTBOARD_MCP_BIND_PORT");
        std::env::remove_var("CRAFTBOARD_MCP_SESSION_TTL_SECS");
    }

    #[test]
    #[serial]
    fn test_callback_uri() {
        let cfg = ServerConfig {
            public_base_uri: "https://mcp.example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.callback_uri(), "https://mcp.example.com/callback");
    }
}
