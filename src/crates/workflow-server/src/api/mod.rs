//! REST and WebSocket API
//!
//! Routes:
//!
//! | Method | Path                        | Handler                      |
//! |--------|-----------------------------|------------------------------|
//! | POST   | `/graph/create`             | [`handlers::create_graph`]   |
//! | GET    | `/graph`                    | [`handlers::list_graphs`]    |
//! | GET    | `/graph/:graph_id`          | [`handlers::get_graph`]      |
//! | DELETE | `/graph/:graph_id`          | [`handlers::delete_graph`]   |
//! | GET    | `/graph/:graph_id/runs`     | [`handlers::list_graph_runs`]|
//! | POST   | `/graph/run`                | [`handlers::run_graph`]      |
//! | GET    | `/graph/state/:run_id`      | [`handlers::get_run_state`]  |
//! | WS     | `/graph/ws/logs/:run_id`    | [`ws::log_stream`]           |
//! | GET    | `/tools`                    | [`handlers::list_tools`]     |
//! | GET    | `/health`, `/`              | [`handlers::health`], [`handlers::root`] |

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod ws;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use routes::{create_router, AppState};
