//! Polymorphic per-node-type computations.
//!
//! A behavior is a pure morphism from input state to output state,
//! parameterized by a node's id and metadata and possibly invoking an
//! external-service adapter. Each is handed an owned clone of the inbound
//! state rather than a mutable reference, and returns the new state, which
//! functions as the delta the executor merges onward.
//!
//! Dispatch on [`NodeType`] is a closed match in [`run`] — the "compile-time
//! table from type to behavior constructor" the six-variant tagged union
//! calls for, rather than a runtime string lookup.

use crate::error::NodeError;
use crate::registry::SourceRegistry;
use crate::spec::{NodeDef, NodeType};
use crate::state::State;
use std::sync::Arc;
use workflow_adapters::{ChatModel, DbQuerier, HttpCaller, ImageModel};

pub mod aggregator;
pub mod db;
pub mod image;
pub mod input;
pub mod llm;
pub mod router;

/// The external-service capabilities node behaviors may invoke, bound at
/// invocation time so the same compiled graph can run against mocks or real
/// providers.
#[derive(Clone)]
pub struct Adapters {
    pub chat: Arc<dyn ChatModel>,
    pub image: Arc<dyn ImageModel>,
    pub db: Arc<dyn DbQuerier>,
    pub http: Arc<dyn HttpCaller>,
}

/// Run the behavior selected by `node.node_type`.
pub async fn run(
    node: &NodeDef,
    registry: &SourceRegistry<'_>,
    adapters: &Adapters,
    state: State,
) -> Result<State, NodeError> {
    match node.node_type {
        NodeType::Input => input::run(node, state).await,
        NodeType::Router => router::run(node, registry, adapters, state).await,
        NodeType::Llm => llm::run(node, registry, adapters, state).await,
        NodeType::Image => image::run(node, registry, adapters, state).await,
        NodeType::Db => db::run(node, registry, adapters, state).await,
        NodeType::Aggregator => aggregator::run(node, state).await,
    }
}

/// Substitute `{name}` placeholders in `template` with values read from
/// `state`. An unresolved placeholder is left as the literal `{name}` and
/// reported as a warning instead of failing the node.
pub(crate) fn render_template(template: &str, state: &State) -> (String, Vec<String>) {
    let mut output = String::with_capacity(template.len());
    let mut warnings = Vec::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(rel_end) = template[i..].find('}') {
                let name = &template[i + 1..i + rel_end];
                match state.get(name) {
                    Some(value) => output.push_str(&value_to_text(&value)),
                    None => {
                        output.push_str(&template[i..i + rel_end + 1]);
                        warnings.push(format!("unresolved placeholder '{{{name}}}'"));
                    }
                }
                i += rel_end + 1;
                continue;
            }
        }
        let ch = template[i..].chars().next().expect("i within bounds of a valid str");
        output.push(ch);
        i += ch.len_utf8();
    }
    (output, warnings)
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_placeholder() {
        let mut state = State::default();
        state.user_input = Some("world".to_string());
        let (rendered, warnings) = render_template("hello {user_input}", &state);
        assert_eq!(rendered, "hello world");
        assert!(warnings.is_empty());
    }

    #[test]
    fn leaves_unresolved_placeholder_literal_with_warning() {
        let state = State::default();
        let (rendered, warnings) = render_template("hello {missing}", &state);
        assert_eq!(rendered, "hello {missing}");
        assert_eq!(warnings.len(), 1);
    }
}
