//! Error types for graph definition, tool execution, storage and run control
//!
//! ```text
//! GraphError      - definition rejected before any run exists
//! ToolError       - a tool failed (fatal to the run)
//! StoreError      - graph/run storage failure
//! EngineError     - engine-level failures surfaced to callers
//! ```
//!
//! Predicate failures live in [`crate::condition::ConditionError`]; they are
//! never surfaced to engine callers.

use thiserror::Error;

use crate::run::RunStatus;

/// Errors found while validating a graph definition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The definition has no start node
    #[error("start_node is required")]
    MissingStartNode,

    /// The start node does not name a node in the graph
    #[error("start_node '{0}' not found in nodes")]
    UnknownStartNode(String),

    /// An edge source does not name a node in the graph
    #[error("Edge source '{0}' not found in nodes")]
    UnknownEdgeSource(String),

    /// An edge target does not name a node in the graph
    #[error("Edge target '{0}' not found in nodes")]
    UnknownEdgeTarget(String),

    /// A node map key disagrees with the node's own id
    #[error("Node key '{key}' does not match node id '{id}'")]
    NodeIdMismatch { key: String, id: String },

    /// A node has an empty id
    #[error("Node ids must not be empty")]
    EmptyNodeId,
}

/// Errors raised by tools
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// The tool ran and reported a failure
    #[error("Tool '{tool}' failed: {error}")]
    ExecutionFailed { tool: String, error: String },

    /// The tool rejected its params
    #[error("Invalid params for tool '{tool}': {error}")]
    InvalidParams { tool: String, error: String },

    /// The tool panicked
    #[error("Tool '{tool}' panicked: {message}")]
    Panicked { tool: String, message: String },
}

impl ToolError {
    /// Shorthand for [`ToolError::ExecutionFailed`]
    pub fn failed(tool: impl Into<String>, error: impl Into<String>) -> Self {
        ToolError::ExecutionFailed {
            tool: tool.into(),
            error: error.into(),
        }
    }

    /// Shorthand for [`ToolError::InvalidParams`]
    pub fn invalid_params(tool: impl Into<String>, error: impl Into<String>) -> Self {
        ToolError::InvalidParams {
            tool: tool.into(),
            error: error.into(),
        }
    }
}

/// Errors raised by graph and run stores
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Storage backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the engine facade
#[derive(Debug, Error)]
pub enum EngineError {
    /// Graph id not present in the graph store
    #[error("Graph {0} not found")]
    GraphNotFound(String),

    /// Run id not present in the run store
    #[error("Run {0} not found")]
    RunNotFound(String),

    /// Definition rejected
    #[error("Invalid graph: {0}")]
    InvalidGraph(#[from] GraphError),

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A run was asked to move between incompatible states
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: RunStatus, to: RunStatus },
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
