//! HTTP server for craftboard-mcp
//!
//! Route assembly and the shared [`AppState`]. The binary crate builds the
//! state from configuration and hands it to [`build_router`].

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod routes;
pub mod state;

pub use state::{AppState, SseConnectionManager};

/// Assemble the full route tree
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // MCP transports
        .route(
            "/mcp",
            get(routes::mcp::mcp_sse_handler).post(routes::mcp::mcp_post_handler),
        )
        .route("/mcp/message", post(routes::mcp::mcp_message_handler))
        // OAuth surface (these ARE the auth endpoints, no auth layer)
        .route("/authorize", get(routes::oauth::authorize_handler))
        .route("/authenticate", post(routes::oauth::authenticate_handler))
        .route("/callback", get(routes::oauth::callback_handler))
        .route("/token", post(routes::oauth::token_handler))
        // Direct bearer-token session management
        .route("/session", post(routes::session::create_session_handler))
        .route(
            "/session/{id}",
            get(routes::session::session_status_handler)
                .delete(routes::session::delete_session_handler),
        )
        .route("/health", get(routes::session::health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
