//! Response helpers

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// 200 OK with a JSON body
pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// 201 Created with a JSON body
pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(data))
}

/// 204 No Content
pub fn no_content() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
