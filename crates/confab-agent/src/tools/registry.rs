//! Tool Registry — in-process tool server.
//!
//! Holds [`LocalTool`]s keyed by name and serves them to every session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use confab_core::types::{Arguments, Session, Tool};

use super::base::{LocalTool, ToolServer};

/// Stores tools keyed by name and dispatches calls.
///
/// Owns `Arc<dyn LocalTool>` so tools can be shared across threads.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn LocalTool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn LocalTool>) {
        info!(tool = tool.name(), "registered tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Unregister a tool by name. Returns the removed tool, if any.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn LocalTool>> {
        let removed = self.tools.remove(name);
        if removed.is_some() {
            info!(tool = name, "unregistered tool");
        }
        removed
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions for all registered tools, sorted by name for determinism.
    pub fn definitions(&self) -> Vec<Tool> {
        let mut defs: Vec<Tool> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolServer for ToolRegistry {
    async fn list_tools(&self, _session: &Session) -> anyhow::Result<Vec<Tool>> {
        Ok(self.definitions())
    }

    async fn execute_tool(
        &self,
        _session: &Session,
        name: &str,
        arguments: &Arguments,
    ) -> anyhow::Result<String> {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "tool not found");
            anyhow::bail!("Tool '{name}' not found");
        };
        tool.execute(arguments).await
    }
}
