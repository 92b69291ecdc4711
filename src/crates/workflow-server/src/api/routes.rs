//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use workflow_core::{BroadcastObserver, WorkflowEngine};

use crate::api::{
    handlers,
    middleware::{cors_layer, logging_layer},
    ws,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: WorkflowEngine,
    pub broadcast: Arc<BroadcastObserver>,
    pub service_name: String,
}

impl AppState {
    pub fn new(engine: WorkflowEngine, broadcast: Arc<BroadcastObserver>) -> Self {
        Self {
            engine,
            broadcast,
            service_name: "workflow-engine".to_string(),
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }
}

/// Build the complete API router
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/tools", get(handlers::list_tools))
        // Graph endpoints
        .route("/graph", get(handlers::list_graphs))
        .route("/graph/create", post(handlers::create_graph))
        .route("/graph/run", post(handlers::run_graph))
        .route("/graph/state/:run_id", get(handlers::get_run_state))
        .route("/graph/ws/logs/:run_id", get(ws::log_stream))
        .route(
            "/graph/:graph_id",
            get(handlers::get_graph).delete(handlers::delete_graph),
        )
        .route("/graph/:graph_id/runs", get(handlers::list_graph_runs))
        .layer(logging_layer())
        .layer(cors_layer())
        .with_state(app_state)
}
