//! OAuth 2.0 authorization-code endpoints
//!
//! This gateway acts as the authorization server: `GET /authorize` starts a
//! flow, `POST /authenticate` takes the credential form, `GET /callback`
//! bridges provider redirects back through the login form, and `POST /token`
//! redeems a single-use code. Errors on `/token` use the standard OAuth
//! error body. Reference: https://datatracker.ietf.org/doc/html/rfc6749

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};

use cb_oauth::{pages, AuthorizeAction, SubmitOutcome};
use cb_types::AppError;

use crate::state::AppState;

/// Query parameters of GET /authorize
#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub state: String,
}

/// Form body of POST /authenticate
#[derive(Debug, Deserialize)]
pub struct AuthenticateForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub redirect_uri: String,
}

/// Query parameters of GET /callback
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub session: String,
}

/// Form body of POST /token
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub client_id: String,
}

/// OAuth 2.0 token response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub scope: String,
}

/// OAuth 2.0 error response
#[derive(Debug, Serialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    fn new(error: &str, description: String) -> Self {
        Self {
            error: error.to_string(),
            error_description: Some(description),
        }
    }
}

/// GET /authorize — login form or redirect to the identity provider
pub async fn authorize_handler(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    if !query.response_type.is_empty() && query.response_type != "code" {
        return (
            StatusCode::BAD_REQUEST,
            Json(TokenErrorResponse::new(
                "unsupported_response_type",
                format!("Unsupported response_type: {}", query.response_type),
            )),
        )
            .into_response();
    }

    match state
        .broker
        .begin_authorization(&query.state, &query.redirect_uri, &query.client_id)
    {
        Ok(AuthorizeAction::ShowForm {
            state: form_state,
            redirect_uri,
        }) => Html(pages::login_form(&form_state, &redirect_uri, None)).into_response(),
        Ok(AuthorizeAction::RedirectToProvider { location }) => {
            Redirect::to(&location).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to start authorization: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TokenErrorResponse::new("server_error", e.to_string())),
            )
                .into_response()
        }
    }
}

/// POST /authenticate — credential form submission
///
/// Failure re-renders the form with the error and the original hidden
/// fields, so the user can retry without restarting the flow. Bad
/// credentials never produce a redirect.
pub async fn authenticate_handler(
    State(state): State<AppState>,
    Form(form): Form<AuthenticateForm>,
) -> Response {
    match state
        .broker
        .submit_credentials(&form.email, &form.password, &form.state, &form.redirect_uri)
        .await
    {
        Ok(SubmitOutcome::Redirect { location }) => Redirect::to(&location).into_response(),
        Ok(SubmitOutcome::SuccessPage { code }) => Html(pages::success_page(&code)).into_response(),
        Err(e) => {
            tracing::warn!("Credential submission failed: {}", e);
            let status = match e {
                AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AppError::InvalidGrant(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Html(pages::login_form(
                    &form.state,
                    &form.redirect_uri,
                    Some(&e.to_string()),
                )),
            )
                .into_response()
        }
    }
}

/// GET /callback — provider redirect bridge
///
/// The identity provider sends the browser here with the callback-session
/// key. The credential form rendered carries the bridged redirect URI, so
/// submission can recover the caller's original target.
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let bridged = format!("{}?session={}", state.config.callback_uri(), query.session);
    Html(pages::login_form("", &bridged, None)).into_response()
}

/// POST /token — redeem an authorization code for an access token
pub async fn token_handler(
    State(state): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Response {
    match state
        .broker
        .redeem_code(&request.code, &request.grant_type)
        .await
    {
        Ok(access_token) => {
            tracing::info!("Issued access token via authorization code");
            Json(TokenResponse {
                access_token,
                token_type: "Bearer".to_string(),
                expires_in: state.config.session_ttl_secs,
                scope: "mcp".to_string(),
            })
            .into_response()
        }
        Err(AppError::UnsupportedGrantType(grant_type)) => (
            StatusCode::BAD_REQUEST,
            Json(TokenErrorResponse::new(
                "unsupported_grant_type",
                format!(
                    "Unsupported grant_type: {} (only authorization_code)",
                    grant_type
                ),
            )),
        )
            .into_response(),
        Err(AppError::InvalidGrant(description)) => (
            StatusCode::BAD_REQUEST,
            Json(TokenErrorResponse::new("invalid_grant", description)),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Token redemption failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TokenErrorResponse::new("server_error", e.to_string())),
            )
                .into_response()
        }
    }
}
