//! MCP transport routes
//!
//! Two transports share one dispatcher:
//! - `POST /mcp` carries one JSON-RPC request and returns one response.
//! - `GET /mcp` opens an SSE stream; requests for it arrive on
//!   `POST /mcp/message?session=<token>` and responses are routed back to
//!   the stream by the connection manager.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde::Deserialize;
use std::convert::Infallible;

use cb_mcp::protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use cb_mcp::{Dispatcher, RequestAuth};

use crate::state::{AppState, SseConnectionManager};

/// Header carrying an explicit session id
pub const SESSION_HEADER: &str = "x-session-id";

/// Pull session material out of the request headers.
///
/// An explicit session id wins over a bearer token when both are present.
fn extract_auth(headers: &HeaderMap) -> RequestAuth {
    if let Some(session_id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        if !session_id.is_empty() {
            return RequestAuth::SessionId(session_id.to_string());
        }
    }

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match bearer {
        Some(token) if !token.is_empty() => RequestAuth::Bearer(token.to_string()),
        _ => RequestAuth::None,
    }
}

/// Parse a JSON-RPC envelope, mapping failure to a -32700 response
fn parse_request(body: &str) -> Result<JsonRpcRequest, Box<JsonRpcResponse>> {
    serde_json::from_str::<JsonRpcRequest>(body).map_err(|e| {
        tracing::debug!("Rejected malformed JSON-RPC envelope: {}", e);
        Box::new(JsonRpcResponse::error(
            serde_json::Value::Null,
            JsonRpcError::parse_error(format!("Invalid JSON-RPC request: {}", e)),
        ))
    })
}

/// POST /mcp — discrete request/response transport
pub async fn mcp_post_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return (StatusCode::OK, Json(*response)).into_response(),
    };

    // Notifications get acknowledged, never answered
    if request.id.is_none() {
        tracing::debug!("Acknowledged notification: {}", request.method);
        return StatusCode::ACCEPTED.into_response();
    }

    let auth = extract_auth(&headers);
    let response = state.dispatcher.handle_request(auth, request).await;
    Json(response).into_response()
}

/// GET /mcp — SSE stream transport, with content negotiation
///
/// Returns an SSE stream when the Accept header asks for one, API info text
/// otherwise. SSE mode mints a per-connection token, registers with the
/// connection manager, and emits: an `endpoint` event naming the paired
/// message channel, a metadata notification, then every response routed to
/// this connection in arrival order. A closed connection stops emission for
/// that connection only.
pub async fn mcp_sse_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let accepts_sse = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);

    if !accepts_sse {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            "craftboard-mcp gateway\n\
             \n\
             GET  /mcp (Accept: text/event-stream) - SSE stream\n\
             POST /mcp - JSON-RPC requests\n\
             POST /mcp/message?session=<token> - message channel for the SSE stream\n\
             \n\
             Authenticate with the 'authenticate' tool, an 'X-Session-Id' header,\n\
             or an 'Authorization: Bearer <token>' header.\n",
        )
            .into_response();
    }

    let token = match cb_utils::crypto::generate_opaque_id("cbt") {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to generate SSE connection token: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut rx = state.sse_manager.register(&token);
    let sse_manager = state.sse_manager.clone();

    let stream = async_stream::stream! {
        tracing::info!("SSE stream started: {}", token);
        let endpoint = format!("/mcp/message?session={}", token);
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));

        let metadata = JsonRpcNotification::new(
            "notifications/metadata",
            Some(Dispatcher::initialize_metadata()),
        );
        if let Ok(json) = serde_json::to_string(&metadata) {
            yield Ok::<_, Infallible>(Event::default().event("message").data(json));
        }

        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    yield Ok::<_, Infallible>(Event::default().event("message").data(json));
                }
                Err(e) => {
                    tracing::error!("Failed to serialize SSE message for {}: {}", token, e);
                }
            }
        }

        sse_manager.unregister(&token);
        tracing::debug!("SSE stream ended: {}", token);
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub session: String,
}

/// Send a response over the paired SSE stream when one is live, otherwise
/// fall back to the HTTP body. SSE clients expect 202 + stream delivery.
fn send_response(
    sse_manager: &SseConnectionManager,
    token: &str,
    response: JsonRpcResponse,
) -> Response {
    if sse_manager.send_response(token, response.clone()) {
        tracing::debug!("Response delivered via SSE connection {}", token);
        StatusCode::ACCEPTED.into_response()
    } else {
        tracing::warn!(
            "No SSE connection {}, returning response in HTTP body",
            token
        );
        Json(response).into_response()
    }
}

/// POST /mcp/message?session=<token> — message channel paired with the SSE
/// stream
pub async fn mcp_message_handler(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return send_response(&state.sse_manager, &query.session, *response),
    };

    if request.id.is_none() {
        tracing::debug!("Acknowledged notification: {}", request.method);
        return StatusCode::ACCEPTED.into_response();
    }

    let auth = extract_auth(&headers);
    let response = state.dispatcher.handle_request(auth, request).await;
    send_response(&state.sse_manager, &query.session, response)
}
