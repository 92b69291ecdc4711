//! Run endpoint handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};

use crate::api::{
    error::ApiResult,
    middleware::validate_not_empty,
    models::{RunGraphRequest, RunGraphResponse, RunStateResponse},
    response,
    routes::AppState,
};

/// Start a run, inline or in the background
///
/// POST /graph/run
pub async fn run_graph(
    State(app_state): State<AppState>,
    payload: Result<Json<RunGraphRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    validate_not_empty(&req.graph_id, "graph_id")?;

    if req.async_execution {
        let run = app_state.engine.spawn(&req.graph_id, req.initial_state).await?;
        tracing::info!(run_id = %run.run_id, "Scheduled async execution");
        return Ok(response::ok(
            RunGraphResponse::from_run(run).with_message("Graph execution started in background"),
        ));
    }

    let run = app_state
        .engine
        .run_to_completion(&req.graph_id, req.initial_state)
        .await?;
    tracing::info!(run_id = %run.run_id, status = %run.status, "Completed sync execution");
    Ok(response::ok(RunGraphResponse::from_run(run)))
}

/// Latest persisted snapshot of a run
///
/// GET /graph/state/:run_id
pub async fn get_run_state(
    State(app_state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let run = app_state.engine.get_run(&run_id).await?;
    Ok(response::ok(RunStateResponse::from(run)))
}
