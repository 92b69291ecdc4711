use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use workflow_core::state::from_value;
use workflow_core::{ConditionEvaluator, Edge, GraphDefinition, Node, State, ToolRegistry, WorkflowEngine};

fn engine() -> WorkflowEngine {
    let tools = ToolRegistry::new();
    tools.register_fn("inc", |state: &State, _: &Map<String, Value>| {
        let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
        Ok(from_value(json!({ "count": count + 1 })))
    });
    WorkflowEngine::new(Arc::new(tools))
}

fn loop_run_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let engine = engine();
    let graph = runtime
        .block_on(
            engine.create_graph(
                GraphDefinition::new("work")
                    .with_node(Node::tool("work", "inc"))
                    .with_node(Node::router("check"))
                    .with_node(Node::router("done"))
                    .with_edge(Edge::new("work", "check"))
                    .with_edge(Edge::when("check", "work", "count < 40"))
                    .with_edge(Edge::new("check", "done")),
            ),
        )
        .unwrap();

    c.bench_function("conditional loop run (81 steps)", |b| {
        b.to_async(&runtime).iter(|| async {
            engine
                .run_to_completion(black_box(&graph.id), State::new())
                .await
                .unwrap();
        });
    });
}

fn condition_benchmark(c: &mut Criterion) {
    let evaluator = ConditionEvaluator::new();
    let state = from_value(json!({
        "profile": { "null_counts": { "age": 0, "score": 3 } },
        "anomaly_count": 3,
        "tags": ["a", "b", "c"]
    }));

    c.bench_function("evaluate cached predicate", |b| {
        b.iter(|| {
            evaluator.evaluate(
                black_box("anomaly_count > 0 and profile.null_counts.score >= 1 and 'b' in tags"),
                black_box(&state),
            )
        });
    });
}

criterion_group!(benches, loop_run_benchmark, condition_benchmark);
criterion_main!(benches);
