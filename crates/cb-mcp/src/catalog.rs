//! Static tool catalog
//!
//! The catalog is data compiled into the binary, loaded once at startup and
//! never mutated. Each descriptor pairs a tool name with the JSON schema its
//! arguments are validated against before dispatch.

use cb_types::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The tool whose execution is itself an authentication action. Filtered
/// from `tools/list`; callable without a session.
pub const AUTH_TOOL: &str = "authenticate";

const BUILTIN_TOOLS: &str = include_str!("tools.json");

/// One catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Immutable name-to-descriptor mapping
#[derive(Debug)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Load the compiled-in catalog
    pub fn builtin() -> AppResult<Self> {
        let tools: Vec<ToolDescriptor> = serde_json::from_str(BUILTIN_TOOLS)?;
        Self::from_tools(tools)
    }

    /// Build a catalog from descriptors (tests use this for small catalogs)
    pub fn from_tools(tools: Vec<ToolDescriptor>) -> AppResult<Self> {
        let mut index = HashMap::new();
        for (position, tool) in tools.iter().enumerate() {
            if index.insert(tool.name.clone(), position).is_some() {
                return Err(AppError::Config(format!(
                    "Duplicate tool in catalog: {}",
                    tool.name
                )));
            }
        }
        Ok(Self { tools, index })
    }

    /// Look a tool up by name
    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&position| &self.tools[position])
    }

    /// Every tool, in catalog order
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Every tool except the authentication tool
    pub fn list_public(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().filter(|t| t.name != AUTH_TOOL).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
