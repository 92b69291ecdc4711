//! Node dispatch
//!
//! Executes the run's current node, merges tool output into the run state
//! and appends exactly one step record per invocation. Every failure in this
//! layer is fatal to the run: the record is marked failed, the run moves to
//! `failed`, and `current_node_id` stays on the failing node.

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ToolError};
use crate::graph::{Graph, Node, NodeKind};
use crate::run::{Run, RunStatus, StepRecord, StepStatus};
use crate::state::{merge, State};
use crate::tool::ToolRegistry;

pub struct NodeExecutor<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> NodeExecutor<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Execute `run.current_node_id` against `graph`.
    ///
    /// Returns the number of records appended (zero only when the run has no
    /// current node). Errors only on an illegal status transition, which
    /// means the run was not `running`.
    pub async fn execute(&self, run: &mut Run, graph: &Graph) -> Result<usize> {
        let Some(node_id) = run.current_node_id.clone() else {
            warn!(run_id = %run.run_id, "No current node to execute");
            return Ok(0);
        };

        let started_at = Utc::now();
        let input_state = run.state.clone();

        let Some(node) = graph.node(&node_id) else {
            let message = format!("Node '{}' not found in graph", node_id);
            error!(run_id = %run.run_id, node = %node_id, "{}", message);
            let record = StepRecord {
                node_id,
                node_type: None,
                started_at,
                finished_at: Utc::now(),
                output_state: input_state.clone(),
                input_state,
                status: StepStatus::Failed,
                error: Some(message),
                tool_name: None,
                tool_params: None,
                limit_exceeded: None,
            };
            return self.finish(run, record).map(|_| 1);
        };

        debug!(run_id = %run.run_id, node = %node_id, kind = %node.kind, "Executing node");

        let outcome = match node.kind {
            NodeKind::Tool => self.run_tool(node, &run.state).await.map(Some),
            // Pass-through: routing happens afterwards on the existing state
            NodeKind::Router | NodeKind::Loop => Ok(None),
        };

        let (status, error) = match outcome {
            Ok(Some(update)) => {
                merge(&mut run.state, update);
                (StepStatus::Completed, None)
            }
            Ok(None) => (StepStatus::Completed, None),
            Err(message) => {
                error!(run_id = %run.run_id, node = %node_id, error = %message, "Node execution failed");
                (StepStatus::Failed, Some(message))
            }
        };

        let (tool_name, tool_params) = match node.kind {
            NodeKind::Tool => (node.tool_name.clone(), Some(node.params.clone())),
            _ => (None, None),
        };

        let record = StepRecord {
            node_id,
            node_type: Some(node.kind),
            started_at,
            finished_at: Utc::now(),
            input_state,
            output_state: run.state.clone(),
            status,
            error,
            tool_name,
            tool_params,
            limit_exceeded: None,
        };

        if status == StepStatus::Completed {
            info!(run_id = %run.run_id, node = %record.node_id, kind = %node.kind, "Node completed");
        }

        self.finish(run, record).map(|_| 1)
    }

    fn finish(&self, run: &mut Run, record: StepRecord) -> Result<()> {
        let failed = record.is_failed();
        run.log.push(record);
        if failed {
            run.transition(RunStatus::Failed)?;
        }
        Ok(())
    }

    async fn run_tool(&self, node: &Node, state: &State) -> std::result::Result<State, String> {
        let tool_name = node
            .tool_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| format!("Tool node {} has no tool_name specified", node.id))?;

        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| format!("Tool '{}' not found in registry", tool_name))?;

        debug!(node = %node.id, tool = %tool_name, "Invoking tool");

        match AssertUnwindSafe(tool.execute(state, &node.params))
            .catch_unwind()
            .await
        {
            Ok(Ok(update)) => Ok(update),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(ToolError::Panicked {
                tool: tool_name.to_string(),
                message: panic_message(panic.as_ref()),
            }
            .to_string()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, GraphDefinition};
    use crate::state::from_value;
    use serde_json::{json, Map, Value};

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register_fn("double", |state: &State, _: &Map<String, Value>| {
            let x = state.get("x").and_then(Value::as_i64).unwrap_or(0);
            Ok(from_value(json!({"x": x * 2, "doubled": true})))
        });
        registry.register_fn("fail", |_: &State, _: &Map<String, Value>| {
            Err(ToolError::failed("fail", "boom"))
        });
        registry.register_fn("panic", |_: &State, _: &Map<String, Value>| -> crate::tool::ToolResult {
            panic!("tool exploded")
        });
        registry
    }

    fn graph(node: Node) -> Graph {
        let start = node.id.clone();
        let def = GraphDefinition::new(start.clone())
            .with_node(node)
            .with_node(Node::router("end"))
            .with_edge(Edge::new(start, "end"));
        Graph::from_definition("g", def).unwrap()
    }

    fn running(graph: &Graph, state: Value) -> Run {
        let mut run = Run::new("r1", graph, from_value(state));
        run.transition(RunStatus::Running).unwrap();
        run
    }

    #[tokio::test]
    async fn test_tool_node_merges_update() {
        let registry = registry();
        let g = graph(Node::tool("a", "double").with_param("factor", json!(2)));
        let mut run = running(&g, json!({"x": 3, "keep": 1}));

        let appended = NodeExecutor::new(&registry).execute(&mut run, &g).await.unwrap();

        assert_eq!(appended, 1);
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(Value::Object(run.state.clone()), json!({"x": 6, "keep": 1, "doubled": true}));
        let step = &run.log[0];
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.node_type, Some(NodeKind::Tool));
        assert_eq!(step.input_state["x"], json!(3));
        assert_eq!(step.output_state["x"], json!(6));
        assert_eq!(step.tool_name.as_deref(), Some("double"));
        assert_eq!(step.tool_params.as_ref().unwrap()["factor"], json!(2));
    }

    #[tokio::test]
    async fn test_router_and_loop_do_not_mutate() {
        let registry = registry();
        for node in [Node::router("a"), Node::loop_marker("a")] {
            let g = graph(node);
            let mut run = running(&g, json!({"x": 1}));
            NodeExecutor::new(&registry).execute(&mut run, &g).await.unwrap();

            assert_eq!(run.log.len(), 1);
            assert_eq!(run.log[0].input_state, run.log[0].output_state);
            assert!(run.log[0].tool_name.is_none());
            assert_eq!(run.status, RunStatus::Running);
        }
    }

    #[tokio::test]
    async fn test_missing_tool_is_fatal() {
        let registry = registry();
        let g = graph(Node::tool("a", "nonexistent"));
        let mut run = running(&g, json!({}));

        NodeExecutor::new(&registry).execute(&mut run, &g).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.current_node_id.as_deref(), Some("a"));
        assert_eq!(
            run.log[0].error.as_deref(),
            Some("Tool 'nonexistent' not found in registry")
        );
    }

    #[tokio::test]
    async fn test_missing_tool_name_is_fatal() {
        let registry = registry();
        let mut node = Node::tool("a", "double");
        node.tool_name = None;
        let g = graph(node);
        let mut run = running(&g, json!({}));

        NodeExecutor::new(&registry).execute(&mut run, &g).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(
            run.log[0].error.as_deref(),
            Some("Tool node a has no tool_name specified")
        );
    }

    #[tokio::test]
    async fn test_tool_error_and_panic_are_contained() {
        let registry = registry();

        let g = graph(Node::tool("a", "fail"));
        let mut run = running(&g, json!({"x": 1}));
        NodeExecutor::new(&registry).execute(&mut run, &g).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.log[0].error.as_deref(), Some("Tool 'fail' failed: boom"));
        assert_eq!(run.log[0].output_state, run.log[0].input_state);

        let g = graph(Node::tool("a", "panic"));
        let mut run = running(&g, json!({}));
        NodeExecutor::new(&registry).execute(&mut run, &g).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.log[0].error.as_deref().unwrap().contains("tool exploded"));
    }

    #[tokio::test]
    async fn test_unknown_node_records_failed_step() {
        let registry = registry();
        let g = graph(Node::router("a"));
        let mut run = running(&g, json!({}));
        run.current_node_id = Some("ghost".into());

        NodeExecutor::new(&registry).execute(&mut run, &g).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.current_node_id.as_deref(), Some("ghost"));
        assert_eq!(run.log[0].node_type, None);
        assert_eq!(run.log[0].error.as_deref(), Some("Node 'ghost' not found in graph"));
    }

    #[tokio::test]
    async fn test_no_current_node_appends_nothing() {
        let registry = registry();
        let g = graph(Node::router("a"));
        let mut run = running(&g, json!({}));
        run.current_node_id = None;

        let appended = NodeExecutor::new(&registry).execute(&mut run, &g).await.unwrap();
        assert_eq!(appended, 0);
        assert!(run.log.is_empty());
    }
}
