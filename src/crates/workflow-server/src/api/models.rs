//! Request and response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use workflow_core::{Edge, Graph, GraphDefinition, Node, Run, RunStatus, State, StepRecord};

/// POST /graph/create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGraphRequest {
    pub nodes: BTreeMap<String, Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub start_node: String,
}

impl From<CreateGraphRequest> for GraphDefinition {
    fn from(req: CreateGraphRequest) -> Self {
        GraphDefinition {
            nodes: req.nodes,
            edges: req.edges,
            start_node: req.start_node,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGraphResponse {
    pub graph_id: String,
}

/// POST /graph/run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunGraphRequest {
    pub graph_id: String,
    #[serde(default)]
    pub initial_state: State,
    #[serde(default)]
    pub async_execution: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunGraphResponse {
    pub run_id: String,
    pub status: RunStatus,
    pub state: State,
    pub log: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RunGraphResponse {
    pub fn from_run(run: Run) -> Self {
        Self {
            run_id: run.run_id,
            status: run.status,
            state: run.state,
            log: run.log,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// GET /graph/state/:run_id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStateResponse {
    pub run_id: String,
    pub graph_id: String,
    pub status: RunStatus,
    pub current_node_id: Option<String>,
    pub state: State,
    pub log: Vec<StepRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Run> for RunStateResponse {
    fn from(run: Run) -> Self {
        Self {
            run_id: run.run_id,
            graph_id: run.graph_id,
            status: run.status,
            current_node_id: run.current_node_id,
            state: run.state,
            log: run.log,
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSummary {
    pub graph_id: String,
    pub start_node: String,
    pub nodes: usize,
    pub edges: usize,
}

impl From<&Graph> for GraphSummary {
    fn from(graph: &Graph) -> Self {
        Self {
            graph_id: graph.id.clone(),
            start_node: graph.start_node.clone(),
            nodes: graph.nodes.len(),
            edges: graph.edges.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub current_node_id: Option<String>,
    pub steps: usize,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.run_id.clone(),
            status: run.status,
            current_node_id: run.current_node_id.clone(),
            steps: run.log.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub name: String,
    pub version: String,
    pub status: String,
    pub endpoints: BTreeMap<String, String>,
}
