//! Direct bearer-token session endpoints and health
//!
//! IDE integrations that already hold a Craftboard bearer token can open a
//! session without going through the OAuth flow.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use cb_types::AppError;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// POST /session — open a session from a pre-existing bearer token
pub async fn create_session_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Response {
    match state.registry.create(&request.token).await {
        Ok(session_id) => Json(CreateSessionResponse { session_id }).into_response(),
        Err(AppError::AuthenticationFailed) => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Token failed upstream validation".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Session creation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /session/{id} — liveness check, refreshes the sliding expiry
pub async fn session_status_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let active = state.registry.get(&session_id).is_some();
    let status = if active {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(SessionStatusResponse { session_id, active })).into_response()
}

/// DELETE /session/{id} — revoke. Idempotent: unknown ids still get 204.
pub async fn delete_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    state.registry.revoke(&session_id);
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub live_sessions: usize,
    pub pending_codes: usize,
    pub sse_connections: usize,
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        live_sessions: state.registry.live_count(),
        pending_codes: state.broker.pending_count(),
        sse_connections: state.sse_manager.active_count(),
    })
}
