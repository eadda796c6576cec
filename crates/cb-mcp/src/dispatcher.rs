//! Transport-agnostic JSON-RPC method router
//!
//! Both transports feed parsed envelopes into [`Dispatcher::handle_request`]
//! and get a complete response back; nothing here ever panics or errors past
//! the boundary. Methods and tool names are closed enums so an addition is a
//! compile-time-checked change, not a string fallthrough.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cb_sessions::SessionRegistry;
use cb_types::{AppError, AppResult};
use cb_upstream::{IdentityVerifier, UpstreamHandle};

use crate::catalog::{ToolCatalog, AUTH_TOOL};
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::validate::validate_arguments;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "craftboard-mcp";

/// How the inbound request authenticated itself
#[derive(Debug, Clone)]
pub enum RequestAuth {
    /// No session material on the request
    None,
    /// Explicit session id from the session header
    SessionId(String),
    /// Bearer token from the Authorization header; a session is lazily
    /// (re)established per request, keyed by the verified user id
    Bearer(String),
}

/// Supported JSON-RPC methods, closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatewayMethod {
    Initialize,
    ToolsList,
    ToolsCall,
}

impl GatewayMethod {
    fn from_wire(method: &str) -> Option<Self> {
        match method {
            "initialize" => Some(Self::Initialize),
            "tools/list" => Some(Self::ToolsList),
            "tools/call" => Some(Self::ToolsCall),
            _ => None,
        }
    }
}

/// Supported tool names, closed set mirroring the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolName {
    Authenticate,
    CurrentUser,
    ListProjects,
    GetProject,
    ListPersonas,
    GetPersona,
    ListRequirements,
    GetRequirement,
    SearchRequirements,
}

impl ToolName {
    fn from_wire(name: &str) -> Option<Self> {
        match name {
            "authenticate" => Some(Self::Authenticate),
            "current_user" => Some(Self::CurrentUser),
            "list_projects" => Some(Self::ListProjects),
            "get_project" => Some(Self::GetProject),
            "list_personas" => Some(Self::ListPersonas),
            "get_persona" => Some(Self::GetPersona),
            "list_requirements" => Some(Self::ListRequirements),
            "get_requirement" => Some(Self::GetRequirement),
            "search_requirements" => Some(Self::SearchRequirements),
            _ => None,
        }
    }

    /// Upstream operation this tool maps onto
    fn operation(self) -> &'static str {
        match self {
            Self::Authenticate => AUTH_TOOL,
            Self::CurrentUser => "current_user",
            Self::ListProjects => "list_projects",
            Self::GetProject => "get_project",
            Self::ListPersonas => "list_personas",
            Self::GetPersona => "get_persona",
            Self::ListRequirements => "list_requirements",
            Self::GetRequirement => "get_requirement",
            Self::SearchRequirements => "search_requirements",
        }
    }
}

/// The protocol dispatcher
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    catalog: Arc<ToolCatalog>,
    verifier: Arc<dyn IdentityVerifier>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        catalog: Arc<ToolCatalog>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            registry,
            catalog,
            verifier,
        }
    }

    /// Static protocol/capability/server metadata, also pushed on SSE connect
    pub fn initialize_metadata() -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    /// Handle one JSON-RPC request, producing a complete response
    pub async fn handle_request(
        &self,
        auth: RequestAuth,
        request: JsonRpcRequest,
    ) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);
        let method = request.method.clone();

        debug!("Dispatching method={}", method);

        let result = match GatewayMethod::from_wire(&method) {
            Some(GatewayMethod::Initialize) => Ok(Self::initialize_metadata()),
            Some(GatewayMethod::ToolsList) => Ok(self.tools_list()),
            Some(GatewayMethod::ToolsCall) => self.tools_call(auth, request.params).await,
            None => Err(AppError::MethodNotFound(method.clone())),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => {
                warn!("Request failed: method={}, error={}", method, err);
                JsonRpcResponse::error(id, to_rpc_error(&err))
            }
        }
    }

    /// Catalog minus the authentication tool (auth is handled out-of-band)
    fn tools_list(&self) -> Value {
        json!({ "tools": self.catalog.list_public() })
    }

    async fn tools_call(&self, auth: RequestAuth, params: Option<Value>) -> AppResult<Value> {
        let params =
            params.ok_or_else(|| AppError::Validation("Missing params for tools/call".to_string()))?;
        let name = params
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| AppError::Validation("Missing tool name".to_string()))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let tool_name =
            ToolName::from_wire(name).ok_or_else(|| AppError::UnknownTool(name.to_string()))?;

        // Validation always precedes any network call.
        let descriptor = self
            .catalog
            .lookup(name)
            .ok_or_else(|| AppError::UnknownTool(name.to_string()))?;
        validate_arguments(&descriptor.input_schema, &arguments)?;

        match tool_name {
            ToolName::Authenticate => self.call_authenticate(&arguments).await,
            _ => {
                let handle = self.resolve_session(auth).await?;
                let result = handle.invoke(tool_name.operation(), &arguments).await?;
                Ok(wrap_text_content(&result))
            }
        }
    }

    /// The one tool callable without a session: verifies credentials and
    /// opens a session whose id the caller sends on subsequent requests.
    async fn call_authenticate(&self, arguments: &Value) -> AppResult<Value> {
        let email = arguments
            .get("email")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::Validation("Missing required argument: email".to_string()))?;
        let password = arguments
            .get("password")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::Validation("Missing required argument: password".to_string())
            })?;

        let bearer_token = self.verifier.verify_credentials(email, password).await?;
        let session_id = self.registry.create(&bearer_token).await?;

        info!("Session established via authenticate tool");
        Ok(wrap_text_content(&json!({
            "session_id": session_id,
            "note": "Send this value in the X-Session-Id header on subsequent requests.",
        })))
    }

    /// Resolve the caller's upstream handle from the request's auth material
    async fn resolve_session(&self, auth: RequestAuth) -> AppResult<Arc<dyn UpstreamHandle>> {
        match auth {
            RequestAuth::None => Err(AppError::AuthenticationRequired),
            RequestAuth::SessionId(session_id) => self
                .registry
                .get(&session_id)
                .ok_or(AppError::AuthenticationRequired),
            RequestAuth::Bearer(token) => {
                let identity = self
                    .verifier
                    .resolve_identity(&token)
                    .await
                    .map_err(|_| AppError::AuthenticationRequired)?;

                // The key always incorporates the verified user id, never
                // request metadata alone, so two users can never collide.
                let session_key = format!("mcp-{}-{}", identity.user_id, Uuid::new_v4());
                self.registry.create_with_id(&session_key, &token).await?;
                self.registry
                    .get(&session_key)
                    .ok_or(AppError::AuthenticationRequired)
            }
        }
    }
}

/// Map internal errors onto the fixed wire-level codes.
///
/// Everything except an unknown method collapses to -32603; the message
/// keeps the specific failure readable.
fn to_rpc_error(err: &AppError) -> JsonRpcError {
    match err {
        AppError::MethodNotFound(method) => JsonRpcError::method_not_found(method),
        other => JsonRpcError::internal(other.to_string()),
    }
}

/// Wrap an upstream result as opaque MCP text content
fn wrap_text_content(result: &Value) -> Value {
    let text = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
    json!({ "content": [{ "type": "text", "text": text }] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cb_types::Identity;
    use cb_upstream::HandleFactory;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Handle stub tagged with the credential it was built from; records
    /// every invocation so tests can assert isolation and call counts.
    struct TaggedHandle {
        tag: String,
        invocations: Arc<Mutex<Vec<(String, String)>>>,
        invoke_count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl UpstreamHandle for TaggedHandle {
        async fn validate(&self) -> bool {
            !self.tag.contains("invalid")
        }

        async fn invoke(&self, operation: &str, _params: &Value) -> AppResult<Value> {
            self.invoke_count.fetch_add(1, Ordering::SeqCst);
            self.invocations
                .lock()
                .push((self.tag.clone(), operation.to_string()));
            Ok(json!({ "served_by": self.tag, "operation": operation }))
        }

        async fn list_accessible_projects(&self) -> Vec<String> {
            vec![]
        }
    }

    struct TaggedFactory {
        invocations: Arc<Mutex<Vec<(String, String)>>>,
        invoke_count: Arc<AtomicUsize>,
    }

    impl TaggedFactory {
        fn new() -> (Self, Arc<Mutex<Vec<(String, String)>>>, Arc<AtomicUsize>) {
            let invocations = Arc::new(Mutex::new(Vec::new()));
            let count = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    invocations: invocations.clone(),
                    invoke_count: count.clone(),
                },
                invocations,
                count,
            )
        }
    }

    impl HandleFactory for TaggedFactory {
        fn build(&self, bearer_token: &str) -> Arc<dyn UpstreamHandle> {
            Arc::new(TaggedHandle {
                tag: bearer_token.to_string(),
                invocations: self.invocations.clone(),
                invoke_count: self.invoke_count.clone(),
            })
        }
    }

    struct StubVerifier;

    #[async_trait]
    impl IdentityVerifier for StubVerifier {
        async fn verify_credentials(&self, email: &str, password: &str) -> AppResult<String> {
            if password == "correct" {
                Ok(format!("tok-{}", email))
            } else {
                Err(AppError::InvalidCredentials)
            }
        }

        async fn verify_token(&self, bearer_token: &str) -> bool {
            !bearer_token.contains("invalid")
        }

        async fn resolve_identity(&self, bearer_token: &str) -> AppResult<Identity> {
            if bearer_token.contains("invalid") {
                return Err(AppError::InvalidToken);
            }
            Ok(Identity {
                user_id: format!("u-{}", bearer_token),
                email: "user@example.com".to_string(),
            })
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        registry: Arc<SessionRegistry>,
        invocations: Arc<Mutex<Vec<(String, String)>>>,
        invoke_count: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let (factory, invocations, invoke_count) = TaggedFactory::new();
        let registry = Arc::new(SessionRegistry::new(Arc::new(factory), 3600));
        let catalog = Arc::new(ToolCatalog::builtin().unwrap());
        let dispatcher = Dispatcher::new(registry.clone(), catalog, Arc::new(StubVerifier));
        Fixture {
            dispatcher,
            registry,
            invocations,
            invoke_count,
        }
    }

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(json!(1), method, params)
    }

    fn call_params(name: &str, arguments: Value) -> Option<Value> {
        Some(json!({ "name": name, "arguments": arguments }))
    }

    #[tokio::test]
    async fn test_initialize_returns_metadata() {
        let f = fixture();
        let resp = f
            .dispatcher
            .handle_request(RequestAuth::None, request("initialize", None))
            .await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
    }

    #[tokio::test]
    async fn test_unknown_method_is_32601() {
        let f = fixture();
        let resp = f
            .dispatcher
            .handle_request(RequestAuth::None, request("resources/list", None))
            .await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, -32601);
    }

    #[tokio::test]
    async fn test_tools_list_excludes_auth_tool() {
        // End-to-end scenario: full catalog minus the authentication tool
        let f = fixture();
        let catalog_size = ToolCatalog::builtin().unwrap().len();

        let resp = f
            .dispatcher
            .handle_request(RequestAuth::None, request("tools/list", None))
            .await;
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), catalog_size - 1);
        assert!(tools.iter().all(|t| t["name"] != "authenticate"));
    }

    #[tokio::test]
    async fn test_unregistered_session_is_auth_required() {
        // End-to-end scenario: -32603 with a message naming authentication
        let f = fixture();
        let resp = f
            .dispatcher
            .handle_request(
                RequestAuth::SessionId("cbs-never-registered".to_string()),
                request("tools/call", call_params("list_projects", json!({}))),
            )
            .await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, -32603);
        assert!(error.message.contains("Authentication required"));
    }

    #[tokio::test]
    async fn test_no_auth_material_is_auth_required() {
        let f = fixture();
        let resp = f
            .dispatcher
            .handle_request(
                RequestAuth::None,
                request("tools/call", call_params("current_user", json!({}))),
            )
            .await;
        assert_eq!(resp.error.unwrap().code, -32603);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_32603() {
        let f = fixture();
        let resp = f
            .dispatcher
            .handle_request(
                RequestAuth::None,
                request("tools/call", call_params("drop_tables", json!({}))),
            )
            .await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, -32603);
        assert!(error.message.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_validation_precedes_invocation() {
        // get_project requires project_id; omitting it must never reach
        // the upstream handle.
        let f = fixture();
        let session_id = f.registry.create("tok-a").await.unwrap();

        let resp = f
            .dispatcher
            .handle_request(
                RequestAuth::SessionId(session_id),
                request("tools/call", call_params("get_project", json!({}))),
            )
            .await;

        let error = resp.error.unwrap();
        assert_eq!(error.code, -32603);
        assert!(error.message.contains("project_id"));
        assert_eq!(f.invoke_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bounds_violation_aborts_before_upstream() {
        let f = fixture();
        let session_id = f.registry.create("tok-a").await.unwrap();

        let resp = f
            .dispatcher
            .handle_request(
                RequestAuth::SessionId(session_id),
                request(
                    "tools/call",
                    call_params("list_projects", json!({ "limit": 1000 })),
                ),
            )
            .await;

        assert!(resp.error.is_some());
        assert_eq!(f.invoke_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_call_wraps_text_content() {
        let f = fixture();
        let session_id = f.registry.create("tok-a").await.unwrap();

        let resp = f
            .dispatcher
            .handle_request(
                RequestAuth::SessionId(session_id),
                request(
                    "tools/call",
                    call_params("get_project", json!({ "project_id": "p-1" })),
                ),
            )
            .await;

        let result = resp.result.unwrap();
        let content = result["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert!(content[0]["text"].as_str().unwrap().contains("tok-a"));
    }

    #[tokio::test]
    async fn test_session_isolation() {
        // Two sessions backed by differently-tagged handles; each call must
        // reach only its own tag.
        let f = fixture();
        let session_a = f.registry.create("tok-alice").await.unwrap();
        let session_b = f.registry.create("tok-bob").await.unwrap();

        let call = request(
            "tools/call",
            call_params("list_projects", json!({})),
        );
        let (resp_a, resp_b) = tokio::join!(
            f.dispatcher
                .handle_request(RequestAuth::SessionId(session_a), call.clone()),
            f.dispatcher
                .handle_request(RequestAuth::SessionId(session_b), call),
        );

        assert!(resp_a.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("tok-alice"));
        assert!(resp_b.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("tok-bob"));

        let invocations = f.invocations.lock();
        assert_eq!(invocations.len(), 2);
        assert!(invocations.iter().any(|(tag, _)| tag == "tok-alice"));
        assert!(invocations.iter().any(|(tag, _)| tag == "tok-bob"));
    }

    #[tokio::test]
    async fn test_authenticate_tool_opens_session() {
        let f = fixture();
        let resp = f
            .dispatcher
            .handle_request(
                RequestAuth::None,
                request(
                    "tools/call",
                    call_params(
                        "authenticate",
                        json!({ "email": "a@b.c", "password": "correct" }),
                    ),
                ),
            )
            .await;

        let text = resp.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        let payload: Value = serde_json::from_str(&text).unwrap();
        let session_id = payload["session_id"].as_str().unwrap().to_string();
        assert!(session_id.starts_with("cbs-"));

        // The returned id resolves to a live session
        assert!(f.registry.get(&session_id).is_some());
    }

    #[tokio::test]
    async fn test_authenticate_tool_rejects_bad_password() {
        let f = fixture();
        let resp = f
            .dispatcher
            .handle_request(
                RequestAuth::None,
                request(
                    "tools/call",
                    call_params(
                        "authenticate",
                        json!({ "email": "a@b.c", "password": "wrong" }),
                    ),
                ),
            )
            .await;

        let error = resp.error.unwrap();
        assert_eq!(error.code, -32603);
        assert!(error.message.contains("Invalid credentials"));
        assert_eq!(f.registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_bearer_auth_lazily_creates_session() {
        let f = fixture();
        assert_eq!(f.registry.live_count(), 0);

        let resp = f
            .dispatcher
            .handle_request(
                RequestAuth::Bearer("tok-carol".to_string()),
                request("tools/call", call_params("current_user", json!({}))),
            )
            .await;

        assert!(resp.result.is_some());
        assert_eq!(f.registry.live_count(), 1);

        let invocations = f.invocations.lock();
        assert_eq!(invocations[0].0, "tok-carol");
    }

    #[tokio::test]
    async fn test_bearer_auth_invalid_token() {
        let f = fixture();
        let resp = f
            .dispatcher
            .handle_request(
                RequestAuth::Bearer("tok-invalid".to_string()),
                request("tools/call", call_params("current_user", json!({}))),
            )
            .await;

        let error = resp.error.unwrap();
        assert_eq!(error.code, -32603);
        assert!(error.message.contains("Authentication required"));
        assert_eq!(f.registry.live_count(), 0);
    }
}
