//! Service info and health

use axum::{extract::State, response::IntoResponse};
use std::collections::BTreeMap;

use crate::api::{
    models::{HealthResponse, ServiceInfo},
    response,
    routes::AppState,
};

/// GET /health
pub async fn health(State(app_state): State<AppState>) -> impl IntoResponse {
    response::ok(HealthResponse {
        status: "healthy".to_string(),
        service: app_state.service_name.clone(),
    })
}

/// GET /
pub async fn root(State(app_state): State<AppState>) -> impl IntoResponse {
    let endpoints: BTreeMap<String, String> = [
        ("create_graph", "POST /graph/create"),
        ("list_graphs", "GET /graph"),
        ("get_graph", "GET /graph/{graph_id}"),
        ("delete_graph", "DELETE /graph/{graph_id}"),
        ("graph_runs", "GET /graph/{graph_id}/runs"),
        ("run_graph", "POST /graph/run"),
        ("get_state", "GET /graph/state/{run_id}"),
        ("websocket_logs", "WS /graph/ws/logs/{run_id}"),
        ("tools", "GET /tools"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    response::ok(ServiceInfo {
        message: "Workflow Engine API".to_string(),
        name: app_state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        endpoints,
    })
}
