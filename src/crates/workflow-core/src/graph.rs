//! Workflow graph definitions
//!
//! A [`GraphDefinition`] is what a client submits. Once it passes
//! [`GraphDefinition::validate`] it becomes an immutable [`Graph`] with an id.
//! Runs only ever borrow graphs; nothing mutates a graph after creation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::GraphError;

/// Kind of work a node performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Invokes a registered tool and merges its output into state
    Tool,
    /// Records a step; routing happens on its outgoing edges
    Router,
    /// Same as a router at execution time; marks the head of a cycle
    Loop,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Tool => "tool",
            NodeKind::Router => "router",
            NodeKind::Loop => "loop",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A graph vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the graph. Filled from the map key when omitted.
    #[serde(default)]
    pub id: String,
    /// Node kind
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Tool to invoke, required for tool nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Passed verbatim to the tool
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Node {
    /// Create a tool node
    pub fn tool(id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Tool,
            tool_name: Some(tool_name.into()),
            params: Map::new(),
        }
    }

    /// Create a router node
    pub fn router(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Router,
            tool_name: None,
            params: Map::new(),
        }
    }

    /// Create a loop node
    pub fn loop_marker(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Loop,
            tool_name: None,
            params: Map::new(),
        }
    }

    /// Add a tool parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Directed, optionally conditional connection between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// Predicate over state; `None` means always taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Edge {
    /// Create an unconditional edge
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    /// Create a conditional edge
    pub fn when(
        source: impl Into<String>,
        target: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: Some(condition.into()),
        }
    }
}

/// Graph as submitted by a client, before it has an id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub nodes: BTreeMap<String, Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub start_node: String,
}

impl GraphDefinition {
    pub fn new(start_node: impl Into<String>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            start_node: start_node.into(),
        }
    }

    /// Add a node, keyed by its id
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    /// Append an edge. Declaration order is routing order.
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Check referential integrity: the start node and every edge endpoint
    /// must name a node. Node ids omitted in the body are taken from the key.
    pub fn validate(&mut self) -> Result<(), GraphError> {
        for (key, node) in self.nodes.iter_mut() {
            if key.is_empty() {
                return Err(GraphError::EmptyNodeId);
            }
            if node.id.is_empty() {
                node.id = key.clone();
            } else if node.id != *key {
                return Err(GraphError::NodeIdMismatch {
                    key: key.clone(),
                    id: node.id.clone(),
                });
            }
        }

        if self.start_node.is_empty() {
            return Err(GraphError::MissingStartNode);
        }
        if !self.nodes.contains_key(&self.start_node) {
            return Err(GraphError::UnknownStartNode(self.start_node.clone()));
        }

        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.source) {
                return Err(GraphError::UnknownEdgeSource(edge.source.clone()));
            }
            if !self.nodes.contains_key(&edge.target) {
                return Err(GraphError::UnknownEdgeTarget(edge.target.clone()));
            }
        }

        Ok(())
    }
}

/// A validated, immutable workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub id: String,
    pub nodes: BTreeMap<String, Node>,
    pub edges: Vec<Edge>,
    pub start_node: String,
}

impl Graph {
    /// Validate a definition and assign it an id
    pub fn from_definition(
        id: impl Into<String>,
        mut definition: GraphDefinition,
    ) -> Result<Self, GraphError> {
        definition.validate()?;
        Ok(Self {
            id: id.into(),
            nodes: definition.nodes,
            edges: definition.edges,
            start_node: definition.start_node,
        })
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Edges leaving `node_id`, in declaration order
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Every edge condition in the graph
    pub fn conditions(&self) -> impl Iterator<Item = &str> {
        self.edges.iter().filter_map(|e| e.condition.as_deref())
    }
}
