//! Tools and the registry that resolves them by name
//!
//! A tool is an executable unit `(state, params) -> partial state update`.
//! The returned map is shallow-merged into the run state by the node
//! executor; tools never mutate state directly.
//!
//! ```text
//! Node { type: tool, tool_name: "double", params }
//!          │
//!          ▼
//! ToolRegistry::get("double") ──► Arc<dyn Tool>
//!          │
//!          ▼
//! tool.execute(&state, &params) ──► Ok({"x": 6}) | Err(ToolError)
//! ```
//!
//! Registries are explicitly constructed and handed to the engine, so two
//! engines in one process never share tools by accident.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ToolError;
use crate::state::State;

/// Result of a tool invocation: the partial state update
pub type ToolResult = std::result::Result<State, ToolError>;

/// An executable unit invoked by `tool` nodes
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the tool is registered under
    fn name(&self) -> &str;

    /// Human-readable summary
    fn description(&self) -> &str {
        ""
    }

    /// Compute a partial state update from a read-only view of state and
    /// the node's params
    async fn execute(&self, state: &State, params: &Map<String, Value>) -> ToolResult;
}

type ToolFn = dyn Fn(&State, &Map<String, Value>) -> ToolResult + Send + Sync;

/// Adapts a synchronous closure into a [`Tool`]
pub struct FnTool {
    name: String,
    description: String,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&State, &Map<String, Value>) -> ToolResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            func: Box::new(func),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, state: &State, params: &Map<String, Value>) -> ToolResult {
        (self.func)(state, params)
    }
}

/// Name-to-tool map shared by every run of an engine
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` under its own name. A tool already registered under
    /// that name is replaced.
    pub fn register(&self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let previous = self.tools.write().insert(name.clone(), tool);
        if previous.is_some() {
            warn!(tool = %name, "Tool already registered, overwriting");
        } else {
            info!(tool = %name, "Registered tool");
        }
    }

    /// Register a synchronous closure as a tool
    pub fn register_fn<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(&State, &Map<String, Value>) -> ToolResult + Send + Sync + 'static,
    {
        self.register(FnTool::new(name, func));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Remove a tool, returning it if it was registered
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let removed = self.tools.write().remove(name);
        if removed.is_some() {
            info!(tool = %name, "Unregistered tool");
        }
        removed
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, description)` pairs, sorted by name
    pub fn describe(&self) -> Vec<(String, String)> {
        let tools = self.tools.read();
        let mut entries: Vec<(String, String)> = tools
            .values()
            .map(|tool| (tool.name().to_string(), tool.description().to_string()))
            .collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::from_value;
    use serde_json::json;

    fn double(state: &State, _params: &Map<String, Value>) -> ToolResult {
        let x = state
            .get("x")
            .and_then(Value::as_i64)
            .ok_or_else(|| ToolError::failed("double", "x must be an integer"))?;
        Ok(from_value(json!({"x": x * 2})))
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let registry = ToolRegistry::new();
        registry.register_fn("double", double);

        let tool = registry.get("double").unwrap();
        let update = tool
            .execute(&from_value(json!({"x": 3})), &Map::new())
            .await
            .unwrap();
        assert_eq!(update["x"], json!(6));
    }

    #[tokio::test]
    async fn test_tool_error_is_returned() {
        let registry = ToolRegistry::new();
        registry.register_fn("double", double);

        let err = registry
            .get("double")
            .unwrap()
            .execute(&State::new(), &Map::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::failed("double", "x must be an integer"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_overwrites() {
        let registry = ToolRegistry::new();
        registry.register_fn("t", |_, _| Ok(from_value(json!({"v": 1}))));
        registry.register_fn("t", |_, _| Ok(from_value(json!({"v": 2}))));

        assert_eq!(registry.len(), 1);
        let update = registry
            .get("t")
            .unwrap()
            .execute(&State::new(), &Map::new())
            .await
            .unwrap();
        assert_eq!(update["v"], json!(2));
    }

    #[test]
    fn test_names_sorted_and_unregister() {
        let registry = ToolRegistry::new();
        registry.register_fn("zeta", |_, _| Ok(State::new()));
        registry.register(FnTool::new("alpha", |_, _| Ok(State::new())).with_description("first"));

        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert_eq!(registry.describe()[0], ("alpha".to_string(), "first".to_string()));
        assert!(registry.unregister("zeta").is_some());
        assert!(registry.unregister("zeta").is_none());
        assert!(!registry.contains("zeta"));
        assert!(registry.get("missing").is_none());
    }
}
