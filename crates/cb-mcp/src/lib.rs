//! MCP protocol layer for craftboard-mcp
//!
//! JSON-RPC envelope types, the static tool catalog, argument validation,
//! and the transport-agnostic dispatcher. Both transports (SSE stream and
//! discrete POST) call into the same [`Dispatcher::handle_request`], so the
//! behavior is identical by construction.

pub mod catalog;
pub mod dispatcher;
pub mod protocol;
pub mod validate;

pub use catalog::{ToolCatalog, ToolDescriptor};
pub use dispatcher::{Dispatcher, RequestAuth};
