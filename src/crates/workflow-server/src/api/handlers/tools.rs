//! Tool listing

use axum::{extract::State, response::IntoResponse};

use crate::api::{models::ToolInfo, response, routes::AppState};

/// GET /tools
pub async fn list_tools(State(app_state): State<AppState>) -> impl IntoResponse {
    let tools: Vec<ToolInfo> = app_state
        .engine
        .tools()
        .describe()
        .into_iter()
        .map(|(name, description)| ToolInfo { name, description })
        .collect();
    response::ok(tools)
}
