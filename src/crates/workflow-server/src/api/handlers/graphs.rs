//! Graph endpoint handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};

use crate::api::{
    error::ApiResult,
    models::{CreateGraphRequest, CreateGraphResponse, GraphSummary, RunSummary},
    response,
    routes::AppState,
};

/// Validate and store a graph definition
///
/// POST /graph/create
pub async fn create_graph(
    State(app_state): State<AppState>,
    payload: Result<Json<CreateGraphRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let graph = app_state.engine.create_graph(req.into()).await?;

    tracing::info!(graph_id = %graph.id, nodes = graph.nodes.len(), "Created graph");
    Ok(response::created(CreateGraphResponse { graph_id: graph.id }))
}

/// GET /graph
pub async fn list_graphs(State(app_state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let graphs = app_state.engine.list_graphs().await?;
    let summaries: Vec<GraphSummary> = graphs.iter().map(GraphSummary::from).collect();
    Ok(response::ok(summaries))
}

/// GET /graph/:graph_id
pub async fn get_graph(
    State(app_state): State<AppState>,
    Path(graph_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let graph = app_state.engine.get_graph(&graph_id).await?;
    Ok(response::ok(graph))
}

/// Remove a graph; its runs stay queryable
///
/// DELETE /graph/:graph_id
pub async fn delete_graph(
    State(app_state): State<AppState>,
    Path(graph_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    app_state.engine.delete_graph(&graph_id).await?;
    tracing::info!(graph_id = %graph_id, "Deleted graph");
    Ok(response::no_content())
}

/// GET /graph/:graph_id/runs
pub async fn list_graph_runs(
    State(app_state): State<AppState>,
    Path(graph_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    // 404 for unknown graphs rather than an empty list
    app_state.engine.get_graph(&graph_id).await?;
    let runs = app_state.engine.list_runs(Some(&graph_id)).await?;
    let summaries: Vec<RunSummary> = runs.iter().map(RunSummary::from).collect();
    Ok(response::ok(summaries))
}
