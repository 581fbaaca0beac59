//! Analysis tools
//!
//! [`ToolRunner`] is the collaborator contract the phase executor consumes. The
//! [`ToolRegistry`] implements it over named [`AnalysisTool`]s; the built-in set works
//! on a local checkout and needs no network.

pub mod builtin;
pub mod walker;

use crate::error::ToolError;
use crate::types::RepositoryHandle;
use serde_json::Value;
use std::collections::BTreeMap;

/// Run one named analysis tool against a repository.
pub trait ToolRunner {
    fn run_tool(&self, tool_name: &str, repo: &RepositoryHandle) -> Result<Value, ToolError>;
}

/// A single analysis tool.
pub trait AnalysisTool: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, repo: &RepositoryHandle) -> Result<Value, ToolError>;
}

/// Name-indexed set of analysis tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn AnalysisTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(builtin::FileInventory));
        registry.register(Box::new(builtin::ManifestScan));
        registry.register(Box::new(builtin::SourceOutline));
        registry.register(Box::new(builtin::DocsProbe));
        registry.register(Box::new(builtin::TestInventory));
        registry
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Box<dyn AnalysisTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRunner for ToolRegistry {
    fn run_tool(&self, tool_name: &str, repo: &RepositoryHandle) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;
        tool.run(repo)
    }
}
