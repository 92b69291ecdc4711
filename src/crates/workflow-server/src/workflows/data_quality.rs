//! Data quality pipeline
//!
//! profile → identify anomalies → generate rules → apply rules → check, looping
//! back to profiling while anomalies remain.
//!
//! State contract:
//! - `data`: list of records (maps)
//! - `profile`: written by `profile_data`
//! - `anomalies`, `anomaly_count`: written by `identify_anomalies`, and
//!   `anomaly_count` again by `apply_rules`
//! - `rules`: written by `generate_rules`
//! - `rules_applied`: written by `apply_rules`

use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::{info, warn};
use workflow_core::state::from_value;
use workflow_core::{Edge, FnTool, GraphDefinition, Node, State, ToolError, ToolRegistry, ToolResult};

pub const PROFILE_DATA: &str = "profile_data";
pub const IDENTIFY_ANOMALIES: &str = "identify_anomalies";
pub const GENERATE_RULES: &str = "generate_rules";
pub const APPLY_RULES: &str = "apply_rules";

const DEFAULT_NULL_THRESHOLD: f64 = 0.1;

/// Register the four pipeline tools on `registry`
pub fn register_data_quality_tools(registry: &ToolRegistry) {
    registry.register(
        FnTool::new(PROFILE_DATA, profile_data)
            .with_description("Compute record count, null counts and numeric stats for `data`"),
    );
    registry.register(
        FnTool::new(IDENTIFY_ANOMALIES, identify_anomalies)
            .with_description("Flag high null rates, outliers and duplicate records"),
    );
    registry.register(
        FnTool::new(GENERATE_RULES, generate_rules)
            .with_description("Derive cleaning rules from identified anomalies"),
    );
    registry.register(
        FnTool::new(APPLY_RULES, apply_rules)
            .with_description("Apply cleaning rules to `data` and recount anomalies"),
    );
    info!("Registered data quality workflow tools");
}

/// The bundled pipeline definition
pub fn data_quality_graph() -> GraphDefinition {
    GraphDefinition::new("profile")
        .with_node(Node::tool("profile", PROFILE_DATA))
        .with_node(
            Node::tool("identify", IDENTIFY_ANOMALIES)
                .with_param("null_threshold", json!(DEFAULT_NULL_THRESHOLD)),
        )
        .with_node(Node::tool("generate", GENERATE_RULES))
        .with_node(Node::tool("apply", APPLY_RULES))
        .with_node(Node::router("check"))
        .with_node(Node::router("done"))
        .with_edge(Edge::new("profile", "identify"))
        .with_edge(Edge::new("identify", "generate"))
        .with_edge(Edge::new("generate", "apply"))
        .with_edge(Edge::new("apply", "check"))
        .with_edge(Edge::when("check", "profile", "state['anomaly_count'] > 0"))
        .with_edge(Edge::new("check", "done"))
}

fn records(state: &State) -> &[Value] {
    state
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn is_blank(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null)) || value.and_then(Value::as_str) == Some("")
}

fn field<'a>(record: &'a Value, name: &str) -> Option<&'a Value> {
    record.as_object().and_then(|r| r.get(name))
}

/// Canonical text of a record; maps serialize with sorted keys
fn fingerprint(record: &Value) -> String {
    record.to_string()
}

pub fn profile_data(state: &State, _params: &Map<String, Value>) -> ToolResult {
    let data = records(state);

    if data.is_empty() {
        warn!("No data found for profiling");
        return Ok(from_value(json!({
            "profile": { "total_records": 0, "fields": [], "null_counts": {} }
        })));
    }

    let fields: Vec<String> = data[0]
        .as_object()
        .map(|first| first.keys().cloned().collect())
        .unwrap_or_default();

    let mut null_counts = Map::new();
    let mut numeric_stats = Map::new();

    for name in &fields {
        let nulls = data.iter().filter(|r| is_blank(field(r, name))).count();
        null_counts.insert(name.clone(), json!(nulls));

        let numbers: Vec<&Value> = data
            .iter()
            .filter_map(|r| field(r, name))
            .filter(|v| v.is_number())
            .collect();

        if numbers.is_empty() {
            continue;
        }

        let as_f64 = |v: &&Value| v.as_f64().unwrap_or_default();
        let min = numbers
            .iter()
            .copied()
            .min_by(|a, b| as_f64(a).total_cmp(&as_f64(b)));
        let max = numbers
            .iter()
            .copied()
            .max_by(|a, b| as_f64(a).total_cmp(&as_f64(b)));
        let avg = numbers.iter().map(as_f64).sum::<f64>() / numbers.len() as f64;

        numeric_stats.insert(
            name.clone(),
            json!({ "min": min, "max": max, "avg": avg, "count": numbers.len() }),
        );
    }

    info!(records = data.len(), fields = fields.len(), "Profiled data");

    Ok(from_value(json!({
        "profile": {
            "total_records": data.len(),
            "fields": fields,
            "null_counts": null_counts,
            "numeric_stats": numeric_stats,
        }
    })))
}

pub fn identify_anomalies(state: &State, params: &Map<String, Value>) -> ToolResult {
    let data = records(state);
    let empty = Map::new();
    let profile = state.get("profile").and_then(Value::as_object).unwrap_or(&empty);

    let null_threshold = match params.get("null_threshold") {
        None => DEFAULT_NULL_THRESHOLD,
        Some(v) => v.as_f64().ok_or_else(|| {
            ToolError::invalid_params(IDENTIFY_ANOMALIES, "null_threshold must be a number")
        })?,
    };

    let total_records = profile
        .get("total_records")
        .and_then(Value::as_u64)
        .unwrap_or(data.len() as u64);

    if total_records == 0 {
        return Ok(from_value(json!({ "anomaly_count": 0, "anomalies": [] })));
    }

    let mut anomalies = Vec::new();

    if let Some(null_counts) = profile.get("null_counts").and_then(Value::as_object) {
        for (name, count) in null_counts {
            let count = count.as_u64().unwrap_or(0);
            let rate = count as f64 / total_records as f64;
            if rate > null_threshold {
                anomalies.push(json!({
                    "type": "high_null_rate",
                    "field": name,
                    "null_count": count,
                    "null_rate": rate,
                    "threshold": null_threshold,
                }));
            }
        }
    }

    if let Some(numeric_stats) = profile.get("numeric_stats").and_then(Value::as_object) {
        for (name, stats) in numeric_stats {
            let stat = |key: &str| stats.get(key).and_then(Value::as_f64);
            let (Some(avg), Some(min), Some(max)) = (stat("avg"), stat("min"), stat("max")) else {
                continue;
            };
            if stat("count").unwrap_or(0.0) == 0.0 {
                continue;
            }

            let range = max - min;
            if range <= 0.0 {
                continue;
            }
            let threshold = avg + range * 2.0;
            for value in data.iter().filter_map(|r| field(r, name)) {
                if value.as_f64().map_or(false, |v| v > threshold) {
                    anomalies.push(json!({
                        "type": "outlier",
                        "field": name,
                        "value": value,
                        "threshold": threshold,
                    }));
                }
            }
        }
    }

    if data.first().map_or(false, Value::is_object) {
        let mut seen = HashSet::new();
        for (index, record) in data.iter().enumerate().filter(|(_, r)| r.is_object()) {
            if !seen.insert(fingerprint(record)) {
                anomalies.push(json!({ "type": "duplicate", "record_index": index }));
            }
        }
    }

    info!(count = anomalies.len(), "Identified anomalies");

    Ok(from_value(json!({
        "anomaly_count": anomalies.len(),
        "anomalies": anomalies,
    })))
}

pub fn generate_rules(state: &State, _params: &Map<String, Value>) -> ToolResult {
    let anomalies = state
        .get("anomalies")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut rules = Vec::new();

    for anomaly in anomalies {
        let field_name = anomaly.get("field").and_then(Value::as_str).unwrap_or_default();
        match anomaly.get("type").and_then(Value::as_str) {
            Some("high_null_rate") => rules.push(json!({
                "rule_type": "not_null",
                "field": field_name,
                "description": format!("Field '{}' should not be null", field_name),
                "action": "flag_or_fill",
            })),
            Some("outlier") => {
                let threshold = anomaly.get("threshold").cloned().unwrap_or(Value::Null);
                rules.push(json!({
                    "rule_type": "range_check",
                    "field": field_name,
                    "max_value": threshold,
                    "description": format!("Field '{}' should be <= {}", field_name, threshold),
                    "action": "cap_or_remove",
                }));
            }
            Some("duplicate") => rules.push(json!({
                "rule_type": "unique",
                "description": "Remove duplicate records",
                "action": "remove_duplicates",
            })),
            _ => {}
        }
    }

    if let Some(profile) = state.get("profile") {
        let numeric = profile.get("numeric_stats").and_then(Value::as_object);
        let fields = profile.get("fields").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
        for name in fields.iter().filter_map(Value::as_str) {
            if numeric.map_or(false, |stats| stats.contains_key(name)) {
                rules.push(json!({
                    "rule_type": "type_check",
                    "field": name,
                    "expected_type": "numeric",
                    "description": format!("Field '{}' should be numeric", name),
                    "action": "validate_or_convert",
                }));
            }
        }
    }

    info!(count = rules.len(), "Generated quality rules");

    Ok(from_value(json!({ "rules": rules })))
}

pub fn apply_rules(state: &State, _params: &Map<String, Value>) -> ToolResult {
    let data = records(state);
    if data.is_empty() {
        return Ok(from_value(json!({ "data": [], "anomaly_count": 0, "rules_applied": 0 })));
    }

    let rules = state
        .get("rules")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut cleaned: Vec<Value> = data.to_vec();
    let mut rules_applied = 0usize;

    for rule in rules {
        let field_name = rule.get("field").and_then(Value::as_str);
        match (rule.get("rule_type").and_then(Value::as_str), field_name) {
            (Some("not_null"), Some(name)) => {
                for record in cleaned.iter_mut().filter_map(Value::as_object_mut) {
                    if is_blank(record.get(name)) {
                        record.insert(name.to_string(), json!(0));
                    }
                }
                rules_applied += 1;
            }
            (Some("range_check"), Some(name)) => {
                if let Some(max) = rule.get("max_value").filter(|v| v.is_number()) {
                    let limit = max.as_f64().unwrap_or(f64::INFINITY);
                    for record in cleaned.iter_mut().filter_map(Value::as_object_mut) {
                        if record.get(name).and_then(Value::as_f64).map_or(false, |v| v > limit) {
                            record.insert(name.to_string(), max.clone());
                        }
                    }
                }
                rules_applied += 1;
            }
            (Some("unique"), _) => {
                let mut seen = HashSet::new();
                cleaned.retain(|record| record.is_object() && seen.insert(fingerprint(record)));
                rules_applied += 1;
            }
            _ => {}
        }
    }

    let remaining = cleaned
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|record| record.values())
        .filter(|value| is_blank(Some(value)))
        .count();

    info!(rules_applied, remaining, "Applied quality rules");

    Ok(from_value(json!({
        "data": cleaned,
        "anomaly_count": remaining,
        "rules_applied": rules_applied,
    })))
}
