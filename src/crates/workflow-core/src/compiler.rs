//! Compiles a validated [`WorkflowSpec`] into a graph ready for repeated
//! invocation.
//!
//! The compiled artifact is a snapshot: it owns a clone of the spec plus the
//! `ConditionExpr` parsed once per conditional edge and the `QueueManager`
//! built from the spec's queue declarations. Nothing here re-parses or
//! re-validates per invocation — `invoke` (in [`crate::executor`]) only
//! reads from this snapshot.

use crate::condition::{self, ConditionExpr};
use crate::error::WorkflowError;
use crate::spec::WorkflowSpec;
use crate::validator::validate;
use std::sync::Arc;
use workflow_limiter::{BandwidthPolicy, QueueDef, QueueManager, SubQueueDef};

/// A validated, indexable snapshot of a workflow declaration, bound to a
/// queue manager built from its own queue declarations.
#[derive(Debug)]
pub struct CompiledGraph {
    spec: WorkflowSpec,
    /// Parsed condition per edge, aligned 1:1 with `spec.edges` by index.
    conditions: Vec<Option<ConditionExpr>>,
    queue_manager: Arc<QueueManager>,
}

impl CompiledGraph {
    /// The validated spec this graph was compiled from.
    pub fn spec(&self) -> &WorkflowSpec {
        &self.spec
    }

    /// The id of the node the executor schedules first.
    pub fn start_node(&self) -> &str {
        &self.spec.start_node
    }

    /// The parsed condition for `spec.edges[edge_index]`, if that edge
    /// declared one.
    pub fn condition_at(&self, edge_index: usize) -> Option<&ConditionExpr> {
        self.conditions.get(edge_index).and_then(|c| c.as_ref())
    }

    pub fn queue_manager(&self) -> &Arc<QueueManager> {
        &self.queue_manager
    }
}

/// Validate `spec`, then compile it into a [`CompiledGraph`]:
///
/// 1. Build an adjacency list of outgoing edges per node, implicitly keyed by
///    `(target, condition, queue)` through each edge's own fields — the
///    executor walks `spec.edges` directly rather than a separate derived
///    structure, since the spec itself already carries that key.
/// 2. Parse every edge's `condition` string once into a [`ConditionExpr`].
/// 3. Install one rate-limiter gate per declared queue id.
/// 4. Record `start_node`.
pub fn compile(spec: &WorkflowSpec) -> Result<CompiledGraph, WorkflowError> {
    let errors = validate(spec);
    if !errors.is_empty() {
        return Err(WorkflowError::Validation(errors));
    }

    let mut conditions = Vec::with_capacity(spec.edges.len());
    for edge in &spec.edges {
        let parsed = match &edge.condition {
            Some(source) => Some(condition::parse(source).map_err(|e| {
                WorkflowError::Compile(format!(
                    "edge '{}' -> {:?} carries an unparseable condition that passed validation: {e}",
                    edge.from,
                    edge.to.targets()
                ))
            })?),
            None => None,
        };
        conditions.push(parsed);
    }

    let queue_defs = spec.queues.iter().map(|queue| QueueDef {
        id: queue.id.clone(),
        policy: to_bandwidth_policy(queue.bandwidth),
        sub_queues: queue
            .sub_queues
            .iter()
            .flatten()
            .map(|sub| SubQueueDef { id: sub.id.clone(), weight: sub.weight })
            .collect(),
    });
    let queue_manager = Arc::new(QueueManager::new(queue_defs));

    Ok(CompiledGraph { spec: spec.clone(), conditions, queue_manager })
}

fn to_bandwidth_policy(bandwidth: Option<crate::spec::Bandwidth>) -> BandwidthPolicy {
    let bandwidth = bandwidth.unwrap_or_default();
    BandwidthPolicy {
        max_messages_per_second: bandwidth.max_messages_per_second,
        max_requests_per_minute: bandwidth.max_requests_per_minute,
        max_tokens_per_minute: bandwidth.max_tokens_per_minute,
        burst_size: bandwidth.burst_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Bandwidth, EdgeDef, EdgeTarget, NodeDef, NodeType, QueueDef};
    use serde_json::Map;

    fn node(id: &str, node_type: NodeType) -> NodeDef {
        NodeDef { id: id.to_string(), node_type, metadata: Map::new() }
    }

    #[test]
    fn compiles_a_valid_spec_and_installs_queue_gates() {
        let spec = WorkflowSpec {
            nodes: vec![node("a", NodeType::Input), node("b", NodeType::Aggregator)],
            edges: vec![EdgeDef {
                from: "a".to_string(),
                to: EdgeTarget::Single("b".to_string()),
                queue: Some("q".to_string()),
                condition: None,
                lane: None,
            }],
            queues: vec![QueueDef {
                id: "q".to_string(),
                from: "a".to_string(),
                to: "b".to_string(),
                bandwidth: Some(Bandwidth { max_requests_per_minute: Some(10), ..Default::default() }),
                sub_queues: None,
            }],
            sources: vec![],
            start_node: "a".to_string(),
        };

        let graph = compile(&spec).unwrap();
        assert_eq!(graph.start_node(), "a");
        assert!(graph.queue_manager().gate("q").is_some());
    }

    #[test]
    fn rejects_an_invalid_spec_with_the_full_error_list() {
        let spec = WorkflowSpec {
            nodes: vec![node("a", NodeType::Input)],
            edges: vec![EdgeDef {
                from: "a".to_string(),
                to: EdgeTarget::Single("missing".to_string()),
                queue: None,
                condition: None,
                lane: None,
            }],
            queues: vec![],
            sources: vec![],
            start_node: "a".to_string(),
        };
        match compile(&spec) {
            Err(WorkflowError::Validation(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected a validation failure, got {other:?}"),
        }
    }

    #[test]
    fn parses_conditions_once_at_compile_time() {
        let spec = WorkflowSpec {
            nodes: vec![node("a", NodeType::Router), node("b", NodeType::Aggregator)],
            edges: vec![EdgeDef {
                from: "a".to_string(),
                to: EdgeTarget::Single("b".to_string()),
                queue: None,
                condition: Some("intent == 'image'".to_string()),
                lane: None,
            }],
            queues: vec![],
            sources: vec![],
            start_node: "a".to_string(),
        };
        let graph = compile(&spec).unwrap();
        assert!(graph.condition_at(0).is_some());
    }
}
