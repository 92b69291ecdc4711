//! Run driver: the per-run control loop
//!
//! ```text
//!            ┌──────────┐  pickup   ┌──────────┐
//!            │ pending  │ ────────► │ running  │ ◄─┐ step ok, next node,
//!            └──────────┘           └────┬─────┘ ──┘ under the ceiling
//!                                        │
//!                   no next node ────────┼──────── step failed / ceiling
//!                         ▼                               ▼
//!                   ┌───────────┐                   ┌──────────┐
//!                   │ completed │                   │  failed  │
//!                   └───────────┘                   └──────────┘
//! ```
//!
//! The run is persisted after every step, and each new step record is handed
//! to the observer only after that snapshot is stored. When the iteration
//! ceiling stops a run, the final record carries `limit_exceeded` so the
//! log length equals the ceiling.

use tracing::{info, warn};

use crate::condition::ConditionEvaluator;
use crate::engine::EngineConfig;
use crate::error::Result;
use crate::executor::NodeExecutor;
use crate::graph::Graph;
use crate::observer::StepObserver;
use crate::routing::RoutingResolver;
use crate::run::{Run, RunStatus};
use crate::store::RunStore;
use crate::tool::ToolRegistry;

pub struct RunDriver<'a> {
    pub tools: &'a ToolRegistry,
    pub evaluator: &'a ConditionEvaluator,
    pub runs: &'a dyn RunStore,
    pub observer: &'a dyn StepObserver,
    pub config: &'a EngineConfig,
}

impl<'a> RunDriver<'a> {
    /// Drive `run` to a terminal status and return the final snapshot
    pub async fn drive(&self, graph: &Graph, mut run: Run) -> Result<Run> {
        if run.status == RunStatus::Pending {
            run.transition(RunStatus::Running)?;
            self.runs.put_run(&mut run).await?;
        }

        info!(
            run_id = %run.run_id,
            graph_id = %graph.id,
            start = ?run.current_node_id,
            "Run started"
        );

        let executor = NodeExecutor::new(self.tools);
        let resolver = RoutingResolver::new(self.evaluator, self.config.routing);
        let ceiling = self.config.max_iterations;
        let mut iterations = 0usize;

        while run.current_node_id.is_some() && run.status == RunStatus::Running && iterations < ceiling {
            iterations += 1;
            let appended = executor.execute(&mut run, graph).await?;

            if !run.is_terminal() {
                let current = run.current_node_id.take().unwrap_or_default();
                run.current_node_id = resolver.next_node(graph, &run.state, &current);

                if run.current_node_id.is_none() {
                    run.transition(RunStatus::Completed)?;
                } else if iterations >= ceiling {
                    self.exceed_ceiling(&mut run)?;
                }
            }

            self.runs.put_run(&mut run).await?;
            if appended > 0 {
                if let Some(step) = run.log.last() {
                    self.observer.on_step(&run.run_id, step);
                }
            }
        }

        // Loop exits while still running only if the ceiling allowed no steps
        // or there was never a current node
        if run.status == RunStatus::Running {
            if run.current_node_id.is_none() {
                run.transition(RunStatus::Completed)?;
            } else {
                self.exceed_ceiling(&mut run)?;
            }
            self.runs.put_run(&mut run).await?;
        }

        match run.status {
            RunStatus::Completed => info!(
                run_id = %run.run_id,
                steps = run.log.len(),
                "Run completed"
            ),
            _ => warn!(
                run_id = %run.run_id,
                steps = run.log.len(),
                node = ?run.current_node_id,
                error = ?run.last_step().and_then(|s| s.error.as_deref()),
                "Run failed"
            ),
        }

        self.observer.on_finished(&run);
        Ok(run)
    }

    fn exceed_ceiling(&self, run: &mut Run) -> Result<()> {
        let ceiling = self.config.max_iterations;
        warn!(run_id = %run.run_id, ceiling, "Max iterations reached");
        if let Some(last) = run.log.last_mut() {
            last.limit_exceeded = Some(ceiling);
        }
        run.transition(RunStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, GraphDefinition, Node};
    use crate::observer::NoopObserver;
    use crate::routing::RoutingMode;
    use crate::run::StepRecord;
    use crate::state::{from_value, State};
    use crate::store::InMemoryStore;
    use parking_lot::Mutex;
    use serde_json::{json, Map, Value};

    #[derive(Default)]
    struct Recorder {
        steps: Mutex<Vec<(usize, Option<usize>)>>,
        finished: Mutex<Vec<RunStatus>>,
    }

    impl StepObserver for Recorder {
        fn on_step(&self, _run_id: &str, step: &StepRecord) {
            let mut steps = self.steps.lock();
            let n = steps.len() + 1;
            steps.push((n, step.limit_exceeded));
        }

        fn on_finished(&self, run: &Run) {
            self.finished.lock().push(run.status);
        }
    }

    fn tools() -> ToolRegistry {
        let tools = ToolRegistry::new();
        tools.register_fn("inc", |state: &State, _: &Map<String, Value>| {
            let n = state.get("n").and_then(Value::as_i64).unwrap_or(0);
            Ok(from_value(json!({"n": n + 1})))
        });
        tools
    }

    async fn drive(graph: &Graph, config: EngineConfig, observer: &dyn StepObserver) -> (Run, InMemoryStore) {
        let tools = tools();
        let evaluator = ConditionEvaluator::new();
        let store = InMemoryStore::new();
        let driver = RunDriver {
            tools: &tools,
            evaluator: &evaluator,
            runs: &store,
            observer,
            config: &config,
        };
        let run = Run::new("r1", graph, State::new());
        let run = driver.drive(graph, run).await.unwrap();
        (run, store)
    }

    fn cycle() -> Graph {
        let def = GraphDefinition::new("a")
            .with_node(Node::tool("a", "inc"))
            .with_node(Node::loop_marker("b"))
            .with_edge(Edge::new("a", "b"))
            .with_edge(Edge::new("b", "a"));
        Graph::from_definition("g", def).unwrap()
    }

    #[tokio::test]
    async fn test_linear_graph_completes() {
        let def = GraphDefinition::new("a")
            .with_node(Node::tool("a", "inc"))
            .with_node(Node::tool("b", "inc"))
            .with_node(Node::router("c"))
            .with_edge(Edge::new("a", "b"))
            .with_edge(Edge::new("b", "c"));
        let graph = Graph::from_definition("g", def).unwrap();

        let (run, store) = drive(&graph, EngineConfig::default(), &NoopObserver).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.log.len(), 3);
        assert_eq!(run.state["n"], json!(2));
        assert!(run.current_node_id.is_none());
        assert_eq!(store.get_run("r1").await.unwrap().unwrap(), run);
    }

    #[tokio::test]
    async fn test_cycle_hits_ceiling() {
        let recorder = Recorder::default();
        let (run, _) = drive(&cycle(), EngineConfig::default(), &recorder).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.log.len(), 100);
        assert_eq!(run.log.last().unwrap().limit_exceeded, Some(100));
        assert!(run.log[..99].iter().all(|s| s.limit_exceeded.is_none()));
        assert_eq!(run.state["n"], json!(50));

        // Observer saw the annotated record, after it was stored
        let steps = recorder.steps.lock();
        assert_eq!(steps.len(), 100);
        assert_eq!(steps.last().unwrap(), &(100, Some(100)));
        assert_eq!(*recorder.finished.lock(), vec![RunStatus::Failed]);
    }

    #[tokio::test]
    async fn test_custom_ceiling() {
        let config = EngineConfig {
            max_iterations: 7,
            routing: RoutingMode::Lenient,
        };
        let (run, _) = drive(&cycle(), config, &NoopObserver).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.log.len(), 7);
        assert_eq!(run.current_node_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_completion_on_final_allowed_step_is_not_failure() {
        let def = GraphDefinition::new("a")
            .with_node(Node::tool("a", "inc"))
            .with_node(Node::router("b"))
            .with_edge(Edge::new("a", "b"));
        let graph = Graph::from_definition("g", def).unwrap();
        let config = EngineConfig {
            max_iterations: 2,
            routing: RoutingMode::Lenient,
        };

        let (run, _) = drive(&graph, config, &NoopObserver).await;
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.log.iter().all(|s| s.limit_exceeded.is_none()));
    }

    #[tokio::test]
    async fn test_strict_routing_completes_on_no_match() {
        let def = GraphDefinition::new("r")
            .with_node(Node::router("r"))
            .with_node(Node::router("x"))
            .with_edge(Edge::when("r", "x", "n > 10"));
        let graph = Graph::from_definition("g", def).unwrap();

        let strict = EngineConfig {
            max_iterations: 100,
            routing: RoutingMode::Strict,
        };
        let (run, _) = drive(&graph, strict, &NoopObserver).await;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.log.len(), 1);

        let (run, _) = drive(&graph, EngineConfig::default(), &NoopObserver).await;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.log.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_stops_immediately() {
        let def = GraphDefinition::new("a")
            .with_node(Node::tool("a", "inc"))
            .with_node(Node::tool("b", "missing"))
            .with_node(Node::router("c"))
            .with_edge(Edge::new("a", "b"))
            .with_edge(Edge::new("b", "c"));
        let graph = Graph::from_definition("g", def).unwrap();

        let recorder = Recorder::default();
        let (run, store) = drive(&graph, EngineConfig::default(), &recorder).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.log.len(), 2);
        assert_eq!(run.current_node_id.as_deref(), Some("b"));
        assert_eq!(run.state["n"], json!(1));
        assert_eq!(store.get_run("r1").await.unwrap().unwrap().status, RunStatus::Failed);
        assert_eq!(recorder.steps.lock().len(), 2);
    }
}
