//! Execution engine for conditional workflow graphs
//!
//! A graph is a set of typed nodes (`tool`, `router`, `loop`) joined by
//! optionally conditional edges. A run walks the graph from its start node,
//! merging tool output into a key-value state, until it reaches a node with
//! no viable outgoing edge, a step fails, or the iteration ceiling is hit.
//!
//! ```text
//! GraphDefinition ──validate──► Graph ──► GraphStore
//!                                 │
//!       initial State ──► Run ────┤
//!                                 ▼
//!                 ┌──────────── RunDriver ────────────┐
//!                 │  NodeExecutor ──► ToolRegistry     │
//!                 │  RoutingResolver ──► Condition     │
//!                 │  RunStore::put_run after each step │
//!                 └──────────────┬────────────────────┘
//!                                ▼
//!                          StepObserver
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use workflow_core::{Edge, GraphDefinition, Node, ToolRegistry, WorkflowEngine};
//!
//! # async fn example() -> workflow_core::Result<()> {
//! let tools = Arc::new(ToolRegistry::new());
//! tools.register_fn("double", |state, _params| {
//!     let x = state.get("x").and_then(|v| v.as_i64()).unwrap_or(0);
//!     Ok(workflow_core::state::from_value(json!({ "x": x * 2 })))
//! });
//!
//! let engine = WorkflowEngine::new(tools);
//! let graph = engine
//!     .create_graph(
//!         GraphDefinition::new("a")
//!             .with_node(Node::tool("a", "double"))
//!             .with_node(Node::router("b"))
//!             .with_edge(Edge::new("a", "b")),
//!     )
//!     .await?;
//!
//! let run = engine
//!     .run_to_completion(&graph.id, workflow_core::state::from_value(json!({ "x": 3 })))
//!     .await?;
//! assert_eq!(run.state["x"], json!(6));
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod driver;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod observer;
pub mod routing;
pub mod run;
pub mod state;
pub mod store;
pub mod tool;

pub use condition::{ConditionError, ConditionEvaluator};
pub use engine::{EngineConfig, WorkflowEngine, DEFAULT_MAX_ITERATIONS};
pub use error::{EngineError, GraphError, Result, StoreError, ToolError};
pub use graph::{Edge, Graph, GraphDefinition, Node, NodeKind};
pub use observer::{BroadcastObserver, NoopObserver, StepEvent, StepObserver};
pub use routing::{Route, RouteReason, RoutingMode, RoutingResolver};
pub use run::{Run, RunStatus, StepRecord, StepStatus};
pub use state::State;
pub use store::{GraphStore, InMemoryStore, RunStore};
pub use tool::{FnTool, Tool, ToolRegistry, ToolResult};
