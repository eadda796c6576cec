//! Reqwest-backed Craftboard API client

use async_trait::async_trait;
use cb_types::{AppError, AppResult};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::handle::{HandleFactory, UpstreamHandle};

/// Project ids probed by `list_accessible_projects`.
///
/// The upstream exposes no "list my projects" endpoint, so discovery probes
/// a small well-known set and keeps whatever answers. Callers must treat the
/// result as potentially incomplete.
const PROBE_PROJECT_IDS: &[&str] = &["default", "sandbox", "main"];

/// Authenticated client for one Craftboard account
pub struct CraftboardClient {
    client: Client,
    base_url: String,
    bearer_token: String,
    data_timeout: Duration,
}

impl CraftboardClient {
    pub fn new(base_url: &str, bearer_token: &str, data_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.to_string(),
            data_timeout,
        }
    }

    /// Map an operation name to method and path, substituting path
    /// parameters from `params`.
    fn route(operation: &str, params: &Value) -> AppResult<(Method, String)> {
        let str_param = |key: &str| -> AppResult<String> {
            params
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .ok_or_else(|| AppError::Validation(format!("Missing parameter: {}", key)))
        };

        let route = match operation {
            "current_user" => (Method::GET, "/me".to_string()),
            "list_projects" => (Method::GET, "/projects".to_string()),
            "get_project" => (
                Method::GET,
                format!("/projects/{}", str_param("project_id")?),
            ),
            "list_personas" => (
                Method::GET,
                format!("/projects/{}/personas", str_param("project_id")?),
            ),
            "get_persona" => (
                Method::GET,
                format!("/personas/{}", str_param("persona_id")?),
            ),
            "list_requirements" => (
                Method::GET,
                format!("/projects/{}/requirements", str_param("project_id")?),
            ),
            "get_requirement" => (
                Method::GET,
                format!("/requirements/{}", str_param("requirement_id")?),
            ),
            "search_requirements" => (
                Method::GET,
                format!(
                    "/search/requirements?q={}",
                    urlencoding::encode(&str_param("query")?)
                ),
            ),
            other => return Err(AppError::UnknownTool(other.to_string())),
        };

        Ok(route)
    }

    /// Append pagination query parameters when present
    fn with_pagination(path: String, params: &Value) -> String {
        let mut path = path;
        let sep = |p: &str| if p.contains('?') { '&' } else { '?' };
        if let Some(limit) = params.get("limit").and_then(|v| v.as_i64()) {
            path = format!("{}{}limit={}", path, sep(&path), limit);
        }
        if let Some(offset) = params.get("offset").and_then(|v| v.as_i64()) {
            path = format!("{}{}offset={}", path, sep(&path), offset);
        }
        path
    }

    async fn send(&self, method: Method, path: &str) -> AppResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .request(method, &url)
            .bearer_auth(&self.bearer_token)
            .timeout(self.data_timeout)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::InvalidToken);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Upstream returned {}: {}",
                status, body
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AppError::MalformedUpstreamResponse(e.to_string()))
    }

    /// Fetch a project and enrich it with its persona list.
    ///
    /// Enrichment is non-critical: a failure fetching personas demotes to
    /// the bare project, it never fails the primary result.
    async fn get_project_enriched(&self, params: &Value) -> AppResult<Value> {
        let (method, path) = Self::route("get_project", params)?;
        let mut project = self.send(method, &path).await?;

        let (method, path) = Self::route("list_personas", params)?;
        match self.send(method, &path).await {
            Ok(personas) => {
                if let Some(obj) = project.as_object_mut() {
                    obj.insert("personas".to_string(), personas);
                }
            }
            Err(e) => {
                warn!("Persona enrichment failed, returning bare project: {}", e);
            }
        }

        Ok(project)
    }
}

#[async_trait]
impl UpstreamHandle for CraftboardClient {
    async fn validate(&self) -> bool {
        match self.send(Method::GET, "/me").await {
            Ok(_) => true,
            Err(e) => {
                debug!("Handle validation failed: {}", e);
                false
            }
        }
    }

    async fn invoke(&self, operation: &str, params: &Value) -> AppResult<Value> {
        debug!("Invoking upstream operation: {}", operation);

        if operation == "get_project" {
            return self.get_project_enriched(params).await;
        }

        let (method, path) = Self::route(operation, params)?;
        let path = Self::with_pagination(path, params);
        self.send(method, &path).await
    }

    async fn list_accessible_projects(&self) -> Vec<String> {
        let mut accessible = Vec::new();
        for id in PROBE_PROJECT_IDS {
            let params = json!({ "project_id": id });
            if let Ok((method, path)) = Self::route("get_project", &params) {
                if self.send(method, &path).await.is_ok() {
                    accessible.push((*id).to_string());
                }
            }
        }
        accessible
    }
}

/// Factory producing `CraftboardClient` handles for the session registry
pub struct CraftboardHandleFactory {
    base_url: String,
    data_timeout: Duration,
}

impl CraftboardHandleFactory {
    pub fn new(base_url: &str, data_timeout: Duration) -> Self {
        Self {
            base_url: base_url.to_string(),
            data_timeout,
        }
    }
}

impl HandleFactory for CraftboardHandleFactory {
    fn build(&self, bearer_token: &str) -> Arc<dyn UpstreamHandle> {
        Arc::new(CraftboardClient::new(
            &self.base_url,
            bearer_token,
            self.data_timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_simple() {
        let (method, path) = CraftboardClient::route("list_projects", &json!({})).unwrap();
        assert_eq!(method, Method::GET);
        assert_eq!(path, "/projects");
    }

    #[test]
    fn test_route_path_params() {
        let params = json!({ "project_id": "p-42" });
        let (_, path) = CraftboardClient::route("list_requirements", &params).unwrap();
        assert_eq!(path, "/projects/p-42/requirements");
    }

    #[test]
    fn test_route_missing_param() {
        let err = CraftboardClient::route("get_persona", &json!({})).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_route_unknown_operation() {
        let err = CraftboardClient::route("drop_tables", &json!({})).unwrap_err();
        assert!(matches!(err, AppError::UnknownTool(_)));
    }

    #[test]
    fn test_search_query_is_encoded() {
        let params = json!({ "query": "login & signup" });
        let (_, path) = CraftboardClient::route("search_requirements", &params).unwrap();
        assert_eq!(path, "/search/requirements?q=login%20%26%20signup");
    }

    #[test]
    fn test_pagination_appended() {
        let path = CraftboardClient::with_pagination(
            "/projects".to_string(),
            &json!({ "limit": 10, "offset": 20 }),
        );
        assert_eq!(path, "/projects?limit=10&offset=20");

        let path = CraftboardClient::with_pagination(
            "/search/requirements?q=x".to_string(),
            &json!({ "limit": 5 }),
        );
        assert_eq!(path, "/search/requirements?q=x&limit=5");
    }
}
