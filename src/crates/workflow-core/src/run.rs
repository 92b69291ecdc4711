//! Run instances and their execution log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, Result};
use crate::graph::{Graph, NodeKind};
use crate::state::State;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not yet started
    Pending,
    /// Actively advancing
    Running,
    /// Reached a node with no viable outgoing edge
    Completed,
    /// Step failure or iteration ceiling reached
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Completed and failed runs never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Pending, RunStatus::Running) => true,
            (RunStatus::Running, RunStatus::Running) => true,
            (RunStatus::Running, RunStatus::Completed) => true,
            (RunStatus::Running, RunStatus::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// Immutable audit entry for one node execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub node_id: String,
    /// Absent when the node id did not resolve in the graph
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeKind>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input_state: State,
    pub output_state: State,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_params: Option<Map<String, Value>>,
    /// Set on the final record of a run stopped by the iteration ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_exceeded: Option<usize>,
}

impl StepRecord {
    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// One execution instance of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub graph_id: String,
    /// Node about to execute; on failure, the node that failed
    pub current_node_id: Option<String>,
    pub state: State,
    pub status: RunStatus,
    pub log: Vec<StepRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Create a pending run positioned at the graph's start node
    pub fn new(run_id: impl Into<String>, graph: &Graph, initial_state: State) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            graph_id: graph.id.clone(),
            current_node_id: Some(graph.start_node.clone()),
            state: initial_state,
            status: RunStatus::Pending,
            log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `status`, rejecting transitions out of terminal states
    pub fn transition(&mut self, status: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(status) {
            return Err(EngineError::InvalidStateTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn last_step(&self) -> Option<&StepRecord> {
        self.log.last()
    }
}
