//! Graph and run storage
//!
//! The run store is the sole source of truth clients query for progress.
//! Implementations must give last-writer-wins consistency per key when
//! several runs write concurrently.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::StoreError;
use crate::graph::Graph;
use crate::run::Run;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn put_graph(&self, graph: Graph) -> StoreResult<()>;

    async fn get_graph(&self, graph_id: &str) -> StoreResult<Option<Graph>>;

    /// Returns whether a graph was removed
    async fn delete_graph(&self, graph_id: &str) -> StoreResult<bool>;

    async fn list_graphs(&self) -> StoreResult<Vec<Graph>>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Store a snapshot of `run`, stamping `updated_at`
    async fn put_run(&self, run: &mut Run) -> StoreResult<()>;

    async fn get_run(&self, run_id: &str) -> StoreResult<Option<Run>>;

    async fn delete_run(&self, run_id: &str) -> StoreResult<bool>;

    /// Runs ordered by creation time, optionally restricted to one graph
    async fn list_runs(&self, graph_id: Option<&str>) -> StoreResult<Vec<Run>>;
}

/// Concurrent in-process store for graphs and runs
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    graphs: Arc<DashMap<String, Graph>>,
    runs: Arc<DashMap<String, Run>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every graph and run
    pub fn clear(&self) {
        self.graphs.clear();
        self.runs.clear();
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn put_graph(&self, graph: Graph) -> StoreResult<()> {
        debug!(graph_id = %graph.id, "Storing graph");
        self.graphs.insert(graph.id.clone(), graph);
        Ok(())
    }

    async fn get_graph(&self, graph_id: &str) -> StoreResult<Option<Graph>> {
        Ok(self.graphs.get(graph_id).map(|entry| entry.value().clone()))
    }

    async fn delete_graph(&self, graph_id: &str) -> StoreResult<bool> {
        Ok(self.graphs.remove(graph_id).is_some())
    }

    async fn list_graphs(&self) -> StoreResult<Vec<Graph>> {
        let mut graphs: Vec<Graph> = self.graphs.iter().map(|entry| entry.value().clone()).collect();
        graphs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(graphs)
    }
}

#[async_trait]
impl RunStore for InMemoryStore {
    async fn put_run(&self, run: &mut Run) -> StoreResult<()> {
        run.updated_at = Utc::now();
        debug!(run_id = %run.run_id, status = %run.status, steps = run.log.len(), "Storing run");
        self.runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> StoreResult<Option<Run>> {
        Ok(self.runs.get(run_id).map(|entry| entry.value().clone()))
    }

    async fn delete_run(&self, run_id: &str) -> StoreResult<bool> {
        Ok(self.runs.remove(run_id).is_some())
    }

    async fn list_runs(&self, graph_id: Option<&str>) -> StoreResult<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .filter(|entry| graph_id.map_or(true, |id| entry.graph_id == id))
            .map(|entry| entry.value().clone())
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(runs)
    }
}
