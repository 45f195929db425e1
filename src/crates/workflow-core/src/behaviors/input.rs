//! The `input` behavior: identity on state.

use crate::error::NodeError;
use crate::spec::NodeDef;
use crate::state::State;

/// Identity on state; initializes `metadata.execution_path` if absent and
/// appends this node's id.
pub async fn run(node: &NodeDef, mut state: State) -> Result<State, NodeError> {
    state.push_execution_path(&node.id);
    Ok(state)
}
