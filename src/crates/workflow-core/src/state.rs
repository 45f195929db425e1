//! The mutable execution context threaded through a workflow invocation.
//!
//! Represented as a struct of optional typed fields for the well-known keys
//! plus an `extra` bag for caller-defined ones, per the "tagged dictionary"
//! design note: this gives the join rule in [`join`] a type to dispatch on
//! (numeric counters vs. lists vs. scalars) without falling back to a bare
//! `HashMap<String, Value>`.

use crate::error::NodeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A mutable execution context. Node behaviors never mutate their input in
/// place — each is handed an owned clone and returns a new `State` value
/// that functionally serves as the "delta" the executor merges onward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub errors: Vec<NodeError>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl State {
    /// A fresh state seeded with `user_input`, as the executor builds it for
    /// a new invocation.
    pub fn with_input(user_input: impl Into<String>) -> Self {
        Self {
            user_input: Some(user_input.into()),
            ..Default::default()
        }
    }

    /// Read a field by name, checking the typed well-known fields first and
    /// falling back to `extra`. Used by the condition evaluator and by node
    /// behaviors resolving `{name}` placeholders.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "user_input" => self.user_input.clone().map(Value::String),
            "intent" => self.intent.clone().map(Value::String),
            "text_result" => self.text_result.clone().map(Value::String),
            "image_result" => self.image_result.clone(),
            "db_result" => self.db_result.clone(),
            "final_output" => self.final_output.clone(),
            "tokens_used" => Some(Value::from(self.tokens_used)),
            "cost" => Some(Value::from(self.cost)),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// Write a field by name, routing into the matching typed field or into
    /// `extra` for caller-defined keys. Used by node behaviors writing to
    /// `metadata.output_key`.
    pub fn set(&mut self, key: &str, value: Value) {
        match key {
            "user_input" => self.user_input = value.as_str().map(str::to_string),
            "intent" => self.intent = value.as_str().map(str::to_string),
            "text_result" => self.text_result = value.as_str().map(str::to_string),
            "image_result" => self.image_result = Some(value),
            "db_result" => self.db_result = Some(value),
            "final_output" => self.final_output = Some(value),
            "tokens_used" => self.tokens_used = value.as_u64().unwrap_or(self.tokens_used),
            "cost" => self.cost = value.as_f64().unwrap_or(self.cost),
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }

    /// Append `node_id` to `metadata.execution_path`, initializing it if
    /// this is the first node to complete.
    pub fn push_execution_path(&mut self, node_id: &str) {
        let path = self
            .metadata
            .entry("execution_path")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = path {
            list.push(Value::String(node_id.to_string()));
        }
    }

    pub fn execution_path(&self) -> Vec<String> {
        self.metadata
            .get("execution_path")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    /// Append a non-fatal warning (unresolved placeholder, fan-in scalar
    /// conflict, unknown condition identifier) to `metadata.warnings`.
    pub fn push_warning(&mut self, message: impl Into<String>) {
        let warnings = self
            .metadata
            .entry("warnings")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = warnings {
            list.push(Value::String(message.into()));
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.metadata
            .get("warnings")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }
}

/// Merge `branches` using the deterministic fan-in rule: keys present in
/// exactly one branch are kept as-is; numeric counters (`tokens_used`,
/// `cost`) are summed; `errors` and `metadata.execution_path` are
/// concatenated in the given (declaration) order; every other key
/// conflicting across branches keeps the first branch's value and appends a
/// warning. `branches` must already be ordered by the declaration order of
/// their incoming edges.
pub fn join(branches: Vec<State>) -> State {
    let mut iter = branches.into_iter();
    let Some(first) = iter.next() else {
        return State::default();
    };
    let mut acc = to_object(&first);
    for branch in iter {
        merge_object(&mut acc, to_object(&branch));
    }
    let mut state: State = serde_json::from_value(Value::Object(acc)).unwrap_or_default();
    // metadata.warnings accumulated via merge_object's object path above are
    // already concatenated lists, but conflicts recorded below are appended
    // directly since they're discovered mid-merge.
    if !state.metadata.contains_key("execution_path") {
        state.metadata.insert("execution_path".to_string(), Value::Array(Vec::new()));
    }
    state
}

fn to_object(state: &State) -> Map<String, Value> {
    match serde_json::to_value(state).unwrap_or(Value::Object(Map::new())) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn merge_object(acc: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match acc.get(&key).cloned() {
            None => {
                acc.insert(key, value);
            }
            Some(existing) => match key.as_str() {
                "tokens_used" => {
                    let sum = existing.as_u64().unwrap_or(0) + value.as_u64().unwrap_or(0);
                    acc.insert(key, Value::from(sum));
                }
                "cost" => {
                    let sum = existing.as_f64().unwrap_or(0.0) + value.as_f64().unwrap_or(0.0);
                    acc.insert(key, Value::from(sum));
                }
                "errors" => {
                    let mut list = existing.as_array().cloned().unwrap_or_default();
                    list.extend(value.as_array().cloned().unwrap_or_default());
                    acc.insert(key, Value::Array(list));
                }
                "metadata" => {
                    let mut existing_meta = existing.as_object().cloned().unwrap_or_default();
                    let incoming_meta = value.as_object().cloned().unwrap_or_default();
                    merge_metadata(&mut existing_meta, incoming_meta);
                    acc.insert(key, Value::Object(existing_meta));
                }
                _ => {
                    if existing != value {
                        push_conflict_warning(acc, &key);
                    }
                    // first branch's value wins; acc already holds it.
                }
            },
        }
    }
}

fn merge_metadata(acc: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match acc.get(&key).cloned() {
            None => {
                acc.insert(key, value);
            }
            Some(existing) => {
                if key == "execution_path" || key == "warnings" {
                    let mut list = existing.as_array().cloned().unwrap_or_default();
                    list.extend(value.as_array().cloned().unwrap_or_default());
                    acc.insert(key, Value::Array(list));
                } else if existing != value {
                    let warnings = acc.entry("warnings").or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(list) = warnings {
                        list.push(Value::String(format!(
                            "fan-in conflict on metadata.{key}, keeping first value by declaration order"
                        )));
                    }
                }
            }
        }
    }
}

fn push_conflict_warning(acc: &mut Map<String, Value>, key: &str) {
    let metadata = acc
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(meta) = metadata {
        let warnings = meta.entry("warnings").or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = warnings {
            list.push(Value::String(format!(
                "fan-in conflict on '{key}', keeping first value by declaration order"
            )));
        }
    }
}
