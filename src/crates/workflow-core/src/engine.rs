//! Engine facade
//!
//! Owns the collaborators (stores, tool registry, predicate evaluator,
//! observer) and exposes the two run entry points: drive a run inline to
//! completion, or submit it and let it advance in the background.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::condition::{compile, ConditionEvaluator};
use crate::driver::RunDriver;
use crate::error::{EngineError, Result};
use crate::graph::{Graph, GraphDefinition, NodeKind};
use crate::observer::{NoopObserver, StepObserver};
use crate::routing::RoutingMode;
use crate::run::Run;
use crate::state::State;
use crate::store::{GraphStore, InMemoryStore, RunStore};
use crate::tool::ToolRegistry;

/// Default iteration ceiling per run
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum node executions per run
    pub max_iterations: usize,
    pub routing: RoutingMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            routing: RoutingMode::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_routing(mut self, routing: RoutingMode) -> Self {
        self.routing = routing;
        self
    }
}

/// Workflow graph execution engine
///
/// Cheap to clone; clones share stores, tools and the predicate cache.
#[derive(Clone)]
pub struct WorkflowEngine {
    graphs: Arc<dyn GraphStore>,
    runs: Arc<dyn RunStore>,
    tools: Arc<ToolRegistry>,
    evaluator: Arc<ConditionEvaluator>,
    observer: Arc<dyn StepObserver>,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Engine backed by a fresh in-memory store
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        let store = InMemoryStore::new();
        Self {
            graphs: Arc::new(store.clone()),
            runs: Arc::new(store),
            tools,
            evaluator: Arc::new(ConditionEvaluator::new()),
            observer: Arc::new(NoopObserver),
            config: EngineConfig::default(),
        }
    }

    pub fn with_stores(mut self, graphs: Arc<dyn GraphStore>, runs: Arc<dyn RunStore>) -> Self {
        self.graphs = graphs;
        self.runs = runs;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate a definition and store it under a generated id
    pub async fn create_graph(&self, definition: GraphDefinition) -> Result<Graph> {
        let graph = Graph::from_definition(Uuid::new_v4().to_string(), definition)?;
        self.lint(&graph);
        self.graphs.put_graph(graph.clone()).await?;
        info!(
            graph_id = %graph.id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Graph created"
        );
        Ok(graph)
    }

    /// Warn about problems that only surface at run time
    fn lint(&self, graph: &Graph) {
        for predicate in graph.conditions() {
            if let Err(e) = compile(predicate) {
                warn!(graph_id = %graph.id, predicate = %predicate, error = %e, "Edge condition does not compile and will evaluate to false");
            }
        }
        for node in graph.nodes.values().filter(|n| n.kind == NodeKind::Tool) {
            match node.tool_name.as_deref() {
                Some(name) if self.tools.contains(name) => {}
                Some(name) => warn!(graph_id = %graph.id, node = %node.id, tool = %name, "Tool is not registered"),
                None => warn!(graph_id = %graph.id, node = %node.id, "Tool node has no tool_name"),
            }
        }
    }

    pub async fn get_graph(&self, graph_id: &str) -> Result<Graph> {
        self.graphs
            .get_graph(graph_id)
            .await?
            .ok_or_else(|| EngineError::GraphNotFound(graph_id.to_string()))
    }

    pub async fn list_graphs(&self) -> Result<Vec<Graph>> {
        Ok(self.graphs.list_graphs().await?)
    }

    /// Remove a graph. Runs of the graph are kept.
    pub async fn delete_graph(&self, graph_id: &str) -> Result<()> {
        if self.graphs.delete_graph(graph_id).await? {
            info!(graph_id = %graph_id, "Graph deleted");
            Ok(())
        } else {
            Err(EngineError::GraphNotFound(graph_id.to_string()))
        }
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Run> {
        self.runs
            .get_run(run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))
    }

    pub async fn list_runs(&self, graph_id: Option<&str>) -> Result<Vec<Run>> {
        Ok(self.runs.list_runs(graph_id).await?)
    }

    /// Run a graph inline and return the terminal run
    pub async fn run_to_completion(&self, graph_id: &str, initial_state: State) -> Result<Run> {
        let graph = self.get_graph(graph_id).await?;
        let run = Run::new(Uuid::new_v4().to_string(), &graph, initial_state);
        self.drive(&graph, run).await
    }

    /// Store a pending run and advance it on a background task.
    ///
    /// Returns the pending snapshot; progress is observable only through
    /// [`WorkflowEngine::get_run`] and the observer.
    pub async fn spawn(&self, graph_id: &str, initial_state: State) -> Result<Run> {
        let graph = self.get_graph(graph_id).await?;
        let mut run = Run::new(Uuid::new_v4().to_string(), &graph, initial_state);
        self.runs.put_run(&mut run).await?;

        let engine = self.clone();
        let pending = run.clone();
        tokio::spawn(async move {
            let run_id = run.run_id.clone();
            if let Err(e) = engine.drive(&graph, run).await {
                error!(run_id = %run_id, error = %e, "Background run aborted");
            }
        });

        info!(run_id = %pending.run_id, graph_id = %graph_id, "Run scheduled in background");
        Ok(pending)
    }

    async fn drive(&self, graph: &Graph, run: Run) -> Result<Run> {
        let driver = RunDriver {
            tools: &self.tools,
            evaluator: &self.evaluator,
            runs: self.runs.as_ref(),
            observer: self.observer.as_ref(),
            config: &self.config,
        };
        driver.drive(graph, run).await
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::graph::{Edge, Node};
    use crate::run::RunStatus;

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(Arc::new(ToolRegistry::new()))
    }

    #[tokio::test]
    async fn test_create_graph_rejects_bad_definition() {
        let engine = engine();
        let def = GraphDefinition::new("missing").with_node(Node::router("a"));

        let err = engine.create_graph(def).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidGraph(GraphError::UnknownStartNode(ref s)) if s == "missing"
        ));
        assert!(engine.list_graphs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_graph_lifecycle() {
        let engine = engine();
        let def = GraphDefinition::new("a")
            .with_node(Node::router("a"))
            .with_node(Node::router("b"))
            .with_edge(Edge::when("a", "b", "this is not a predicate"));
        let graph = engine.create_graph(def).await.unwrap();

        assert_eq!(engine.get_graph(&graph.id).await.unwrap(), graph);
        engine.delete_graph(&graph.id).await.unwrap();
        assert!(matches!(
            engine.get_graph(&graph.id).await,
            Err(EngineError::GraphNotFound(_))
        ));
        assert!(engine.delete_graph(&graph.id).await.is_err());
    }

    #[tokio::test]
    async fn test_deeply_nested_conditions_are_accepted_and_false() {
        let engine = engine();
        let nots = format!("{}x", "not ".repeat(20_000));
        let parens = format!("{}1{}", "(".repeat(1_000), ")".repeat(1_000));
        let def = GraphDefinition::new("a")
            .with_node(Node::router("a"))
            .with_node(Node::router("b"))
            .with_node(Node::router("c"))
            .with_edge(Edge::when("a", "b", nots))
            .with_edge(Edge::when("a", "b", parens))
            .with_edge(Edge::new("a", "c"));
        let graph = engine.create_graph(def).await.unwrap();

        let run = engine.run_to_completion(&graph.id, State::new()).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        let visited: Vec<&str> = run.log.iter().map(|s| s.node_id.as_str()).collect();
        assert_eq!(visited, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_unknown_graph_and_run() {
        let engine = engine();
        assert!(matches!(
            engine.run_to_completion("nope", State::new()).await,
            Err(EngineError::GraphNotFound(_))
        ));
        assert!(matches!(
            engine.spawn("nope", State::new()).await,
            Err(EngineError::GraphNotFound(_))
        ));
        assert!(matches!(
            engine.get_run("nope").await,
            Err(EngineError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_returns_pending_snapshot() {
        let engine = engine();
        let graph = engine
            .create_graph(GraphDefinition::new("a").with_node(Node::router("a")))
            .await
            .unwrap();

        let pending = engine.spawn(&graph.id, State::new()).await.unwrap();
        assert_eq!(pending.status, RunStatus::Pending);
        assert!(pending.log.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::default()
            .with_max_iterations(5)
            .with_routing(RoutingMode::Strict);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.routing, RoutingMode::Strict);
        assert_eq!(EngineConfig::default().max_iterations, DEFAULT_MAX_ITERATIONS);
    }
}
