//! HTTP server, CLI and built-in workflows for the workflow graph engine.
//!
//! [`build_app`] wires a [`ServerConfig`] into a ready [`AppState`]: the
//! built-in tools are registered, the engine picks up the configured
//! iteration ceiling and routing mode, and a broadcast observer feeds the
//! WebSocket log stream.

pub mod api;
pub mod config;
pub mod workflows;

use std::sync::Arc;
use workflow_core::{BroadcastObserver, WorkflowEngine};

pub use api::{create_router, AppState};
pub use config::{ServerConfig, ServerConfigError};

/// Engine with the built-in tools, configured from `config`
pub fn build_engine(config: &ServerConfig) -> (WorkflowEngine, Arc<BroadcastObserver>) {
    let broadcast = Arc::new(BroadcastObserver::new());
    let engine = WorkflowEngine::new(Arc::new(workflows::builtin_tools()))
        .with_config(config.engine_config())
        .with_observer(broadcast.clone());
    (engine, broadcast)
}

/// Application state for [`create_router`]
pub fn build_app(config: &ServerConfig) -> AppState {
    let (engine, broadcast) = build_engine(config);
    AppState::new(engine, broadcast)
}
