//! Endpoint handlers

pub mod graphs;
pub mod health;
pub mod runs;
pub mod tools;

pub use graphs::{create_graph, delete_graph, get_graph, list_graph_runs, list_graphs};
pub use health::{health, root};
pub use runs::{get_run_state, run_graph};
pub use tools::list_tools;
