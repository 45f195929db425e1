//! The `db` behavior: renders a query and invokes a read-only query source.

use crate::behaviors::llm::adapter_error_to_node_error;
use crate::behaviors::{render_template, Adapters};
use crate::error::{NodeError, NodeErrorKind};
use crate::registry::SourceRegistry;
use crate::spec::NodeDef;
use crate::state::State;
use serde_json::json;
use std::collections::HashMap;

/// Parameterizes `metadata.query_template` with state values and invokes the
/// read-only query capability of `metadata.source`, storing the row list
/// under `metadata.output_key` (default `db_result`), honoring an optional
/// `metadata.limit`. Write statements are rejected by the adapter contract,
/// not by this behavior.
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
    let template = node.metadata.get("query_template").and_then(|v| v.as_str()).unwrap_or("");
    let (query, warnings) = render_template(template, &state);
    for warning in warnings {
        state.push_warning(warning);
    }
    let limit = node.metadata.get("limit").and_then(|v| v.as_u64()).map(|v| v as usize);

    let rows = adapters
        .db
        .query(&source_config, &query, &HashMap::new(), limit)
        .await
        .map_err(|err| adapter_error_to_node_error(&node.id, err))?;

    let output_key = node.metadata.get("output_key").and_then(|v| v.as_str()).unwrap_or("db_result");
    state.set(output_key, json!(rows));
    state.push_execution_path(&node.id);
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{NodeType, SourceDef, SourceKind, WorkflowSpec};
    use serde_json::Map;
    use std::sync::Arc;
    use workflow_adapters::mock::{MockChatModel, MockDbQuerier, MockHttpCaller, MockImageModel};
    use workflow_adapters::Row;

    fn adapters_with_rows() -> Adapters {
        let mut tables = std::collections::HashMap::new();
        let mut row = Row::new();
        row.insert("id".to_string(), serde_json::json!(1));
        tables.insert("users".to_string(), vec![row]);
        Adapters {
            chat: Arc::new(MockChatModel::default()),
            image: Arc::new(MockImageModel),
            db: Arc::new(MockDbQuerier { tables }),
            http: Arc::new(MockHttpCaller),
        }
    }

    #[tokio::test]
    async fn stores_returned_rows() {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), serde_json::json!("s"));
        metadata.insert("query_template".to_string(), serde_json::json!("SELECT * FROM users"));
        let node = NodeDef { id: "d".to_string(), node_type: NodeType::Db, metadata };

        let spec = WorkflowSpec {
            nodes: vec![],
            edges: vec![],
            queues: vec![],
            sources: vec![SourceDef { id: "s".to_string(), kind: SourceKind::Db, config: Map::new() }],
            start_node: "x".to_string(),
        };
        let index = spec.indexed();
        let registry = SourceRegistry::new(&index);

        let state = run(&node, &registry, &adapters_with_rows(), State::default()).await.unwrap();
        let rows = state.db_result.unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
    }
}
