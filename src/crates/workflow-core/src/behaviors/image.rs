//! The `image` behavior: renders a prompt and invokes an image-generation source.

use crate::behaviors::llm::adapter_error_to_node_error;
use crate::behaviors::{render_template, Adapters};
use crate::error::{NodeError, NodeErrorKind};
use crate::registry::SourceRegistry;
use crate::spec::NodeDef;
use crate::state::State;
use serde_json::json;
use workflow_adapters::ImageOptions;

/// Builds the prompt as `llm` does, invokes the image-generation capability
/// of `metadata.source`, and stores `{url, prompt, size}` plus any
/// model-specific fields under `metadata.output_key` (default `image_result`).
pub async fn run(
    node: &NodeDef,
    registry: &SourceRegistry<'_>,
    adapters: &Adapters,
    mut state: State,
) -> Result<State, NodeError> {
    let source_id = node
        .metadata
        .get("source")
        .and_then(|v| v.as_str())
        .ok_or_else(|| NodeError::new(&node.id, NodeErrorKind::InvalidInput, "missing metadata.source"))?;
    let source_config = registry
        .config(source_id)
        .ok_or_else(|| NodeError::new(&node.id, NodeErrorKind::InvalidInput, format!("unknown source '{source_id}'")))?;
    let template = node.metadata.get("prompt_template").and_then(|v| v.as_str()).unwrap_or("");
    let (prompt, warnings) = render_template(template, &state);
    for warning in warnings {
        state.push_warning(warning);
    }
    let size = node.metadata.get("size").and_then(|v| v.as_str()).map(str::to_string);
    let options = ImageOptions { size: size.clone() };

    let result = adapters
        .image
        .generate(&source_config, &prompt, options)
        .await
        .map_err(|err| adapter_error_to_node_error(&node.id, err))?;

    let mut output = serde_json::Map::new();
    output.insert("url".to_string(), json!(result.url));
    output.insert("prompt".to_string(), json!(prompt));
    if let Some(size) = size {
        output.insert("size".to_string(), json!(size));
    }
    for (key, value) in result.metadata {
        output.insert(key, value);
    }

    let output_key = node
        .metadata
        .get("output_key")
        .and_then(|v| v.as_str())
        .unwrap_or("image_result");
    state.set(output_key, serde_json::Value::Object(output));
    state.push_execution_path(&node.id);
    Ok(state)
}
