//! Tool registry.
//!
//! The tool set is closed: every tool is a [`BuiltinTool`] variant and the
//! registry only maps names onto variants and holds their descriptors.
//!
//! - `fetch` - argument coercion and the `fetch` / `fetch_json` handlers

pub mod fetch;

use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::fetch::types::DEFAULT_TIMEOUT_SECS;
use crate::fetch::{FetchExecutor, FetchResult};
use crate::mcp::protocol::Tool;

/// The built-in tools, in listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    Fetch,
    FetchJson,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 2] = [BuiltinTool::Fetch, BuiltinTool::FetchJson];

    pub fn name(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::FetchJson => "fetch_json",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Fetch => {
                "Fetch the content of any URL with a configurable HTTP method, headers, body and timeout. Returns status, headers and the body as text."
            }
            Self::FetchJson => {
                "Fetch a URL and parse the response body as JSON. Fails with InvalidResponseBody when the content is not valid JSON."
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }
}

/// Immutable description of a tool, as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub tool: BuiltinTool,
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Registry of the built-in tools.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    descriptors: Vec<ToolDescriptor>,
    default_timeout_secs: u64,
}

impl ToolRegistry {
    /// Build the registry; calls without `timeoutSeconds` use `default_timeout_secs`.
    pub fn new(default_timeout_secs: u64) -> Self {
        let default_timeout_secs = default_timeout_secs.max(1);
        let descriptors = BuiltinTool::ALL
            .into_iter()
            .map(|tool| ToolDescriptor {
                tool,
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: fetch::fetch_schema(default_timeout_secs),
            })
            .collect();

        Self {
            descriptors,
            default_timeout_secs,
        }
    }

    /// All descriptors, in stable order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// Descriptors in wire form.
    pub fn list_tools(&self) -> Vec<Tool> {
        self.descriptors.iter().map(ToolDescriptor::to_tool).collect()
    }

    /// Look a tool up by name.
    pub fn resolve(&self, name: &str) -> Result<BuiltinTool> {
        BuiltinTool::from_name(name).ok_or_else(|| Error::ToolNotFound(name.to_string()))
    }

    /// Get the number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Run a resolved tool.
    pub async fn invoke(
        &self,
        tool: BuiltinTool,
        executor: &FetchExecutor,
        arguments: &HashMap<String, Value>,
    ) -> Result<FetchResult> {
        match tool {
            BuiltinTool::Fetch => fetch::fetch(executor, arguments, self.default_timeout_secs).await,
            BuiltinTool::FetchJson => {
                fetch::fetch_json(executor, arguments, self.default_timeout_secs).await
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS)
    }
}
