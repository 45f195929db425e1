//! The `aggregator` behavior: combines named sub-results and finalizes
//! execution metadata.
//!
//! Strategy is selected by `metadata.strategy`:
//! - `merge` — an object collecting the keys listed in `metadata.source_keys`.
//! - `template` — `{name}` substitution over `metadata.template`.
//! - `priority` — the first non-empty key from `metadata.source_keys` wins.
//!
//! Result is written to `metadata.output_key` (default `final_output`).
//! This is also where `metadata.execution_path`, `metadata.end_time`, and
//! `metadata.execution_time` are finalized, reading `metadata.start_time` set
//! by the executor when the invocation began.

use crate::behaviors::render_template;
use crate::error::NodeError;
use crate::spec::NodeDef;
use crate::state::State;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

pub async fn run(node: &NodeDef, mut state: State) -> Result<State, NodeError> {
    let strategy = node.metadata.get("strategy").and_then(|v| v.as_str()).unwrap_or("merge");
    let output_key = node
        .metadata
        .get("output_key")
        .and_then(|v| v.as_str())
        .unwrap_or("final_output");

    let output = match strategy {
        "template" => aggregate_template(node, &state),
        "priority" => aggregate_priority(node, &state),
        _ => aggregate_merge(node, &state),
    };
    state.set(output_key, output);
    state.push_execution_path(&node.id);
    finalize_timing(&mut state);
    Ok(state)
}

fn source_keys(node: &NodeDef) -> Vec<String> {
    node.metadata
        .get("source_keys")
        .and_then(|v| v.as_array())
        .map(|list| list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn aggregate_merge(node: &NodeDef, state: &State) -> Value {
    let mut object = Map::new();
    for key in source_keys(node) {
        if let Some(value) = state.get(&key) {
            object.insert(key, value);
        }
    }
    Value::Object(object)
}

fn aggregate_template(node: &NodeDef, state: &State) -> Value {
    let template = node.metadata.get("template").and_then(|v| v.as_str()).unwrap_or("");
    let (rendered, _warnings) = render_template(template, state);
    json!(rendered)
}

fn aggregate_priority(node: &NodeDef, state: &State) -> Value {
    for key in source_keys(node) {
        if let Some(value) = state.get(&key) {
            if !is_empty(&value) {
                return value;
            }
        }
    }
    Value::Null
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn finalize_timing(state: &mut State) {
    let start_time = state
        .metadata
        .get("start_time")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
    let end_time = Utc::now();
    state.metadata.insert("end_time".to_string(), json!(end_time.to_rfc3339()));
    if let Some(start_time) = start_time {
        let execution_time = (end_time - start_time.with_timezone(&Utc)).num_milliseconds() as f64 / 1000.0;
        state.metadata.insert("execution_time".to_string(), json!(execution_time));
    }
}
