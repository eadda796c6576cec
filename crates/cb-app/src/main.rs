//! craftboard-mcp entry point
//!
//! Wires configuration, the upstream clients, the session registry, the
//! authorization-code broker, and the protocol dispatcher into one axum
//! server, then runs the periodic expiry sweeps alongside it.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cb_config::ServerConfig;
use cb_mcp::{Dispatcher, ToolCatalog};
use cb_oauth::AuthCodeBroker;
use cb_server::{build_router, AppState};
use cb_sessions::SessionRegistry;
use cb_upstream::{CraftboardHandleFactory, CredentialVerifier, IdentityVerifier};

#[derive(Debug, Parser)]
#[command(name = "craftboard-mcp", version, about = "MCP gateway for Craftboard")]
struct Cli {
    /// Override the configured bind port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "craftboard_mcp=info,cb_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::load()?;
    if let Some(port) = cli.port {
        config.bind_port = port;
    }
    let config = Arc::new(config);

    info!(
        "Starting craftboard-mcp: upstream={}, identity={}",
        config.upstream_base_url, config.identity_base_url
    );

    let verifier: Arc<dyn IdentityVerifier> = Arc::new(CredentialVerifier::new(
        &config.identity_base_url,
        Duration::from_secs(config.identity_timeout_secs),
    ));
    let factory = Arc::new(CraftboardHandleFactory::new(
        &config.upstream_base_url,
        Duration::from_secs(config.data_timeout_secs),
    ));

    let registry = Arc::new(SessionRegistry::new(factory, config.session_ttl_secs));
    let broker = Arc::new(AuthCodeBroker::new(
        verifier.clone(),
        &format!("{}/login", config.identity_base_url),
        &config.callback_uri(),
        config.ephemeral_ttl_secs,
    ));
    let catalog = Arc::new(ToolCatalog::builtin()?);
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), catalog, verifier));

    spawn_sweepers(&config, registry.clone(), broker.clone());

    let state = AppState::new(config.clone(), registry, broker, dispatcher);
    let router = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.bind_port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Background expiry sweeps: sessions on a slow cadence, ephemeral
/// authorization records on a fast one, and (when enabled) periodic
/// revalidation of every live session against the upstream.
fn spawn_sweepers(config: &ServerConfig, registry: Arc<SessionRegistry>, broker: Arc<AuthCodeBroker>) {
    let session_interval = config.session_sweep_interval_secs;
    let registry_sweep = registry.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(session_interval));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = registry_sweep.sweep_expired();
            if removed > 0 {
                info!("Session sweep removed {} expired sessions", removed);
            }
        }
    });

    let ephemeral_interval = config.ephemeral_sweep_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(ephemeral_interval));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            broker.sweep_expired();
        }
    });

    let revalidate_interval = config.revalidate_interval_secs;
    if revalidate_interval > 0 {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(revalidate_interval));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let results = registry.revalidate_all().await;
                let revoked = results.iter().filter(|(_, ok)| !ok).count();
                if revoked > 0 {
                    error!("Revalidation revoked {} sessions", revoked);
                }
            }
        });
    }
}
