//! Next-node resolution over a node's outgoing edges

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::ConditionEvaluator;
use crate::graph::Graph;
use crate::state::State;

/// What to do when no outgoing edge is selected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Fall back to the first outgoing edge's target
    #[default]
    Lenient,
    /// Terminate the run instead
    Strict,
}

impl std::str::FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(RoutingMode::Lenient),
            "strict" => Ok(RoutingMode::Strict),
            other => Err(format!("unknown routing mode '{}' (expected lenient or strict)", other)),
        }
    }
}

/// How a target was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    /// A conditional edge evaluated true
    Matched,
    /// An edge without a condition
    Unconditional,
    /// Nothing matched; first outgoing edge taken
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Next { target: String, reason: RouteReason },
    End,
}

impl Route {
    pub fn target(&self) -> Option<&str> {
        match self {
            Route::Next { target, .. } => Some(target),
            Route::End => None,
        }
    }

    pub fn into_target(self) -> Option<String> {
        match self {
            Route::Next { target, .. } => Some(target),
            Route::End => None,
        }
    }
}

/// Picks the single next node for a run
pub struct RoutingResolver<'a> {
    evaluator: &'a ConditionEvaluator,
    mode: RoutingMode,
}

impl<'a> RoutingResolver<'a> {
    pub fn new(evaluator: &'a ConditionEvaluator, mode: RoutingMode) -> Self {
        Self { evaluator, mode }
    }

    /// Scan edges leaving `current` in declared order. The first edge that is
    /// unconditional or whose condition holds wins.
    pub fn resolve(&self, graph: &Graph, state: &State, current: &str) -> Route {
        let mut first = None;

        for edge in graph.outgoing_edges(current) {
            first.get_or_insert(edge);

            let reason = match &edge.condition {
                None => RouteReason::Unconditional,
                Some(predicate) if self.evaluator.evaluate(predicate, state) => RouteReason::Matched,
                Some(_) => continue,
            };

            debug!(from = %current, to = %edge.target, ?reason, "Edge selected");
            return Route::Next {
                target: edge.target.clone(),
                reason,
            };
        }

        match (first, self.mode) {
            (None, _) => Route::End,
            (Some(_), RoutingMode::Strict) => {
                debug!(from = %current, "No edge matched, terminating (strict routing)");
                Route::End
            }
            (Some(edge), RoutingMode::Lenient) => {
                debug!(from = %current, to = %edge.target, "No edge matched, falling back to first edge");
                Route::Next {
                    target: edge.target.clone(),
                    reason: RouteReason::Fallback,
                }
            }
        }
    }

    /// Id of the next node, or `None` when the run should terminate
    pub fn next_node(&self, graph: &Graph, state: &State, current: &str) -> Option<String> {
        self.resolve(graph, state, current).into_target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, GraphDefinition, Node};
    use crate::state::from_value;
    use serde_json::json;

    fn graph(edges: Vec<Edge>) -> Graph {
        let mut def = GraphDefinition::new("r")
            .with_node(Node::router("r"))
            .with_node(Node::router("x"))
            .with_node(Node::router("y"));
        def.edges = edges;
        Graph::from_definition("g", def).unwrap()
    }

    fn resolve(g: &Graph, mode: RoutingMode, state: serde_json::Value) -> Route {
        let evaluator = ConditionEvaluator::new();
        RoutingResolver::new(&evaluator, mode).resolve(g, &from_value(state), "r")
    }

    #[test]
    fn test_no_outgoing_edges_ends() {
        let g = graph(vec![]);
        assert_eq!(resolve(&g, RoutingMode::Lenient, json!({})), Route::End);
        assert_eq!(resolve(&g, RoutingMode::Strict, json!({})), Route::End);
    }

    #[test]
    fn test_conditional_declared_first_wins() {
        let g = graph(vec![
            Edge::when("r", "x", "state.count > 5"),
            Edge::new("r", "y"),
        ]);
        assert_eq!(
            resolve(&g, RoutingMode::Lenient, json!({"count": 10})),
            Route::Next { target: "x".into(), reason: RouteReason::Matched }
        );
        assert_eq!(
            resolve(&g, RoutingMode::Lenient, json!({"count": 1})),
            Route::Next { target: "y".into(), reason: RouteReason::Unconditional }
        );
    }

    #[test]
    fn test_unconditional_declared_first_traps() {
        let g = graph(vec![
            Edge::new("r", "y"),
            Edge::when("r", "x", "state.count > 5"),
        ]);
        assert_eq!(
            resolve(&g, RoutingMode::Lenient, json!({"count": 10})).target(),
            Some("y")
        );
    }

    #[test]
    fn test_invalid_condition_falls_through() {
        let g = graph(vec![
            Edge::when("r", "x", "count >>> 5"),
            Edge::when("r", "y", "missing_key == 1"),
            Edge::when("r", "x", "count == 2"),
        ]);
        assert_eq!(
            resolve(&g, RoutingMode::Lenient, json!({"count": 2})),
            Route::Next { target: "x".into(), reason: RouteReason::Matched }
        );
    }

    #[test]
    fn test_nothing_matches_lenient_falls_back_to_first() {
        let g = graph(vec![
            Edge::when("r", "y", "count > 100"),
            Edge::when("r", "x", "count > 50"),
        ]);
        assert_eq!(
            resolve(&g, RoutingMode::Lenient, json!({"count": 1})),
            Route::Next { target: "y".into(), reason: RouteReason::Fallback }
        );
        assert_eq!(resolve(&g, RoutingMode::Strict, json!({"count": 1})), Route::End);
    }

    #[test]
    fn test_routing_mode_from_str() {
        assert_eq!("Strict".parse::<RoutingMode>().unwrap(), RoutingMode::Strict);
        assert_eq!("lenient".parse::<RoutingMode>().unwrap(), RoutingMode::Lenient);
        assert!("loose".parse::<RoutingMode>().is_err());
        assert_eq!(RoutingMode::default(), RoutingMode::Lenient);
    }
}
