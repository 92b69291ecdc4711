use serde_json::{json, Value};
use std::sync::Arc;
use workflow_core::{state::from_value, RunStatus, WorkflowEngine};
use workflow_server::workflows::{builtin_tools, data_quality_graph};

fn engine() -> WorkflowEngine {
    WorkflowEngine::new(Arc::new(builtin_tools()))
}

fn node_ids(log: &[workflow_core::StepRecord]) -> Vec<&str> {
    log.iter().map(|s| s.node_id.as_str()).collect()
}

#[tokio::test]
async fn test_pipeline_cleans_until_no_anomalies() {
    let engine = engine();
    let graph = engine.create_graph(data_quality_graph()).await.unwrap();

    let initial = from_value(json!({
        "data": [
            { "id": 1, "score": 10 },
            { "id": 2, "score": null },
            { "id": 3, "score": 12 },
            { "id": 3, "score": 12 }
        ]
    }));
    let run = engine.run_to_completion(&graph.id, initial).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.state["anomaly_count"], json!(0));

    let data = run.state["data"].as_array().unwrap();
    assert_eq!(data.len(), 3);
    assert!(data.iter().all(|r| !r["score"].is_null()));

    let ids = node_ids(&run.log);
    assert_eq!(ids.first(), Some(&"profile"));
    assert_eq!(ids.last(), Some(&"done"));
    assert!(ids.len() >= 6);
}

#[tokio::test]
async fn test_pipeline_on_clean_data_runs_once() {
    let engine = engine();
    let graph = engine.create_graph(data_quality_graph()).await.unwrap();

    let initial = from_value(json!({
        "data": [ { "id": 1, "score": 10 }, { "id": 2, "score": 11 } ]
    }));
    let run = engine.run_to_completion(&graph.id, initial).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        node_ids(&run.log),
        vec!["profile", "identify", "generate", "apply", "check", "done"]
    );
    // type_check rules are advisory only
    assert_eq!(run.state["rules_applied"], json!(0));
    assert_eq!(run.state["rules"].as_array().unwrap().len(), 2);
    assert_eq!(run.state["profile"]["total_records"], Value::from(2));
}
