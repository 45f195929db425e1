//! The `llm` behavior: renders a prompt and invokes a chat-completion source.

use crate::behaviors::{render_template, Adapters};
use crate::error::{NodeError, NodeErrorKind};
use crate::registry::SourceRegistry;
use crate::spec::NodeDef;
use crate::state::State;
use serde_json::json;
use workflow_adapters::{ChatCompletion, ChatOptions};

/// Reads `metadata.prompt_template`, substitutes `{name}` placeholders from
/// state, invokes the chat-completion capability of `metadata.source`, and
/// writes the completion text to `metadata.output_key` (default
/// `text_result`), adding the reported token count to `tokens_used`.
pub async fn run(
    node: &NodeDef,
    registry: &SourceRegistry<'_>,
    adapters: &Adapters,
    mut state: State,
) -> Result<State, NodeError> {
    let (completion, warnings) = invoke_chat(node, registry, adapters, &state).await?;
    for warning in warnings {
        state.push_warning(warning);
    }
    let output_key = node
        .metadata
        .get("output_key")
        .and_then(|v| v.as_str())
        .unwrap_or("text_result");
    state.set(output_key, json!(completion.text));
    state.tokens_used += completion.tokens_used;
    state.push_execution_path(&node.id);
    Ok(state)
}

/// Used by the router's `llm` strategy: runs the same prompt/invoke path but
/// returns the raw trimmed completion text as a candidate intent token
/// instead of writing it into state.
pub(crate) async fn classify(
    node: &NodeDef,
    registry: &SourceRegistry<'_>,
    adapters: &Adapters,
    state: &State,
) -> Result<(String, Vec<String>), NodeError> {
    let (completion, warnings) = invoke_chat(node, registry, adapters, state).await?;
    Ok((completion.text.trim().to_string(), warnings))
}

async fn invoke_chat(
    node: &NodeDef,
    registry: &SourceRegistry<'_>,
    adapters: &Adapters,
    state: &State,
) -> Result<(ChatCompletion, Vec<String>), NodeError> {
    let source_id = node
        .metadata
        .get("source")
        .and_then(|v| v.as_str())
        .ok_or_else(|| NodeError::new(&node.id, NodeErrorKind::InvalidInput, "missing metadata.source"))?;
    let source_config = registry
        .config(source_id)
        .ok_or_else(|| NodeError::new(&node.id, NodeErrorKind::InvalidInput, format!("unknown source '{source_id}'")))?;
    let template = node.metadata.get("prompt_template").and_then(|v| v.as_str()).unwrap_or("");
    let (prompt, warnings) = render_template(template, state);
    let options = ChatOptions {
        system_prompt: node.metadata.get("system_prompt").and_then(|v| v.as_str()).map(str::to_string),
        temperature: node.metadata.get("temperature").and_then(|v| v.as_f64()),
        max_tokens: node.metadata.get("max_tokens").and_then(|v| v.as_u64()).map(|v| v as u32),
    };
    let completion = adapters
        .chat
        .complete(&source_config, &prompt, options)
        .await
        .map_err(|err| adapter_error_to_node_error(&node.id, err))?;
    Ok((completion, warnings))
}

pub(crate) fn adapter_error_to_node_error(node_id: &str, err: workflow_adapters::AdapterError) -> NodeError {
    use workflow_adapters::AdapterError;
    let kind = match err {
        AdapterError::MissingCredential(_) => NodeErrorKind::MissingCredential,
        AdapterError::UnavailableExternalService(_) => NodeErrorKind::UnavailableExternalService,
        AdapterError::InvalidOperation(_) => NodeErrorKind::InvalidOperation,
    };
    NodeError::new(node_id, kind, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::NodeType;
    use serde_json::{json, Map};
    use std::sync::Arc;
    use workflow_adapters::mock::{MockChatModel, MockDbQuerier, MockHttpCaller, MockImageModel};

    fn adapters() -> Adapters {
        Adapters {
            chat: Arc::new(MockChatModel::default()),
            image: Arc::new(MockImageModel),
            db: Arc::new(MockDbQuerier::default()),
            http: Arc::new(MockHttpCaller),
        }
    }

    #[tokio::test]
    async fn writes_completion_and_adds_tokens() {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("s"));
        metadata.insert("prompt_template".to_string(), json!("hi {user_input}"));
        let node = NodeDef { id: "l".to_string(), node_type: NodeType::Llm, metadata };

        let spec = crate::spec::WorkflowSpec {
            nodes: vec![],
            edges: vec![],
            queues: vec![],
            sources: vec![crate::spec::SourceDef {
                id: "s".to_string(),
                kind: crate::spec::SourceKind::Llm,
                config: Map::new(),
            }],
            start_node: "x".to_string(),
        };
        let index = spec.indexed();
        let registry = SourceRegistry::new(&index);

        let state = State::with_input("there");
        let state = run(&node, &registry, &adapters(), state).await.unwrap();
        assert!(state.text_result.unwrap().contains("there"));
        assert!(state.tokens_used > 0);
    }
}
