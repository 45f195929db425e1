//! Read-only indexed view over a spec's sources.

use crate::spec::{SourceDef, SpecIndex};
use serde_json::Value;

/// Looks up a [`SourceDef`]'s kind and configuration by id. Secret material
/// referenced from `config` (an `*_env` variable name) is resolved lazily,
/// at adapter-invocation time, from the process environment — the registry
/// itself never holds a secret value, only the name of where to find one.
pub struct SourceRegistry<'a> {
    index: &'a SpecIndex<'a>,
}

impl<'a> SourceRegistry<'a> {
    pub fn new(index: &'a SpecIndex<'a>) -> Self {
        Self { index }
    }

    /// The source's declared kind and config, or `None` if `id` is unknown.
    pub fn get(&self, id: &str) -> Option<&'a SourceDef> {
        self.index.source(id)
    }

    /// The `source_config` value (`config` as a JSON object) expected by the
    /// `workflow-adapters` capability traits.
    pub fn config(&self, id: &str) -> Option<Value> {
        self.get(id).map(|s| Value::Object(s.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{SourceKind, WorkflowSpec};

    #[test]
    fn resolves_registered_source_config() {
        let spec = WorkflowSpec {
            nodes: vec![],
            edges: vec![],
            queues: vec![],
            sources: vec![SourceDef {
                id: "openai".to_string(),
                kind: SourceKind::Llm,
                config: serde_json::json!({"api_key_env": "OPENAI_API_KEY"}).as_object().unwrap().clone(),
            }],
            start_node: "x".to_string(),
        };
        let index = spec.indexed();
        let registry = SourceRegistry::new(&index);
        let config = registry.config("openai").unwrap();
        assert_eq!(config["api_key_env"], "OPENAI_API_KEY");
        assert!(registry.config("missing").is_none());
    }
}
