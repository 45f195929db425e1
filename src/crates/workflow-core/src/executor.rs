//! Executes a [`CompiledGraph`] against an initial [`State`].
//!
//! Traversal starts a task at `start_node` carrying the initial state. Each
//! node is executed at most once: its inbound edges are resolved
//! concurrently (siblings run in parallel, independent of one another), a
//! fan-in node awaits every live inbound edge and joins their states with
//! [`crate::state::join`] before its own behavior runs, and a behavior
//! failure is recorded into `state.errors` without scheduling that edge's
//! descendants. Node execution is memoized with [`OnceCell`] so a node
//! reached through more than one path still runs exactly once, and its
//! result is shared with every waiting descendant — the async analogue of
//! the frontier the design describes.

use crate::behaviors::{self, Adapters};
use crate::compiler::CompiledGraph;
use crate::error::{NodeError, NodeErrorKind};
use crate::registry::SourceRegistry;
use crate::spec::{NodeDef, NodeType};
use crate::state::{self, State};
use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use workflow_limiter::AdmissionCost;

/// Outcome of attempting to run one node this invocation.
#[derive(Debug, Clone)]
enum NodeOutcome {
    /// No live inbound edge ever delivered a task to this node.
    Unreached,
    /// The node ran and its behavior returned an error; descendants are not
    /// scheduled, but the state (inbound state plus the recorded error) is a
    /// terminal contributor to the final join.
    Failed(State),
    /// The node ran successfully.
    Completed(State),
    /// Execution was cancelled while this node (or an ancestor) was waiting
    /// on gate admission.
    Cancelled,
}

/// How the invocation as a whole concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
    Cancelled,
}

/// Metrics collected for one invocation, independent of whether the graph
/// declares an `aggregator` node.
#[derive(Debug, Clone)]
pub struct ExecutionMetrics {
    pub execution_time: Duration,
    pub nodes_executed: usize,
}

/// The result of one [`invoke`] call.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Correlates this run across tracing spans and logs; not persisted.
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub final_state: State,
    pub metrics: ExecutionMetrics,
}

/// Run `graph` to completion against `initial_state`.
#[tracing::instrument(skip(graph, initial_state, adapters, cancel), fields(start_node = %graph.start_node(), execution_id = tracing::field::Empty))]
pub async fn invoke(
    graph: &CompiledGraph,
    initial_state: State,
    adapters: &Adapters,
    cancel: &CancellationToken,
) -> ExecutionResult {
    let execution_id = Uuid::new_v4();
    tracing::Span::current().record("execution_id", tracing::field::display(execution_id));

    let started_at = Instant::now();
    let mut seeded = initial_state;
    seeded.metadata.insert("start_time".to_string(), json!(Utc::now().to_rfc3339()));

    let spec = graph.spec();
    let index = spec.indexed();
    let registry = SourceRegistry::new(&index);

    let cells: HashMap<String, OnceCell<NodeOutcome>> =
        spec.nodes.iter().map(|n| (n.id.clone(), OnceCell::new())).collect();

    let outcomes = join_all(
        spec.nodes
            .iter()
            .map(|node| execute_node(&node.id, graph, &registry, adapters, cancel, &cells, &seeded)),
    )
    .await;

    let cancelled = outcomes.iter().any(|o| matches!(o, NodeOutcome::Cancelled));
    let nodes_executed = outcomes
        .iter()
        .filter(|o| matches!(o, NodeOutcome::Completed(_) | NodeOutcome::Failed(_)))
        .count();

    let mut terminal_states = Vec::new();
    for (node, outcome) in spec.nodes.iter().zip(outcomes.iter()) {
        match outcome {
            NodeOutcome::Completed(state) if !has_live_outgoing(graph, &node.id, state) => {
                let mut state = state.clone();
                if has_any_outgoing(graph, &node.id) {
                    state.errors.push(NodeError::new(
                        &node.id,
                        NodeErrorKind::InvalidInput,
                        "no outgoing edge condition matched; dead end",
                    ));
                }
                terminal_states.push(state);
            }
            NodeOutcome::Failed(state) => terminal_states.push(state.clone()),
            _ => {}
        }
    }

    let final_state = if terminal_states.is_empty() { seeded.clone() } else { state::join(terminal_states) };

    let status = if cancelled {
        ExecutionStatus::Cancelled
    } else if !final_state.errors.is_empty() {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::Success
    };

    ExecutionResult {
        execution_id,
        status,
        final_state,
        metrics: ExecutionMetrics { execution_time: started_at.elapsed(), nodes_executed },
    }
}

/// `true` if any of `node_id`'s declared outgoing edges fires given `state`
/// — a node with none is a terminal contributor to the final join, whether
/// or not it is a structural sink.
fn has_live_outgoing(graph: &CompiledGraph, node_id: &str, state: &State) -> bool {
    for (i, edge) in graph.spec().edges.iter().enumerate() {
        if edge.from != node_id {
            continue;
        }
        match graph.condition_at(i) {
            Some(cond) => {
                if cond.evaluate(state).0 {
                    return true;
                }
            }
            None => return true,
        }
    }
    false
}

/// `true` if `node_id` declares at least one outgoing edge at all. Used to
/// tell a true structural sink (exempt from the dead-end error) apart from
/// a node whose every outgoing condition failed to match.
fn has_any_outgoing(graph: &CompiledGraph, node_id: &str) -> bool {
    graph.spec().edges.iter().any(|e| e.from == node_id)
}

fn execute_node<'a>(
    node_id: &'a str,
    graph: &'a CompiledGraph,
    registry: &'a SourceRegistry<'a>,
    adapters: &'a Adapters,
    cancel: &'a CancellationToken,
    cells: &'a HashMap<String, OnceCell<NodeOutcome>>,
    initial_state: &'a State,
) -> BoxFuture<'a, NodeOutcome> {
    Box::pin(async move {
        let Some(cell) = cells.get(node_id) else {
            return NodeOutcome::Unreached;
        };
        cell.get_or_init(|| async move {
            run_node(node_id, graph, registry, adapters, cancel, cells, initial_state).await
        })
        .await
        .clone()
    })
}

async fn run_node(
    node_id: &str,
    graph: &CompiledGraph,
    registry: &SourceRegistry<'_>,
    adapters: &Adapters,
    cancel: &CancellationToken,
    cells: &HashMap<String, OnceCell<NodeOutcome>>,
    initial_state: &State,
) -> NodeOutcome {
    let Some(node) = graph.spec().nodes.iter().find(|n| n.id == node_id) else {
        return NodeOutcome::Unreached;
    };

    let input = if node_id == graph.start_node() {
        initial_state.clone()
    } else {
        match gather_inbound(node, graph, registry, adapters, cancel, cells, initial_state).await {
            Gathered::Cancelled => return NodeOutcome::Cancelled,
            Gathered::NoContribution => return NodeOutcome::Unreached,
            Gathered::Joined(state) => state,
        }
    };

    run_behavior(node, registry, adapters, input).await
}

enum Gathered {
    Cancelled,
    NoContribution,
    Joined(State),
}

/// Resolves every inbound edge of `node` concurrently, evaluates each edge's
/// condition against its source's output, gates the surviving ones through
/// their queue and declared lane, and joins whatever arrives. Declaration
/// order of `node`'s inbound edges governs the join's conflict resolution,
/// per the join rule. Any warning a gate attaches to an admission (the
/// starvation carve-out) is folded into that edge's contributed state.
async fn gather_inbound(
    node: &NodeDef,
    graph: &CompiledGraph,
    registry: &SourceRegistry<'_>,
    adapters: &Adapters,
    cancel: &CancellationToken,
    cells: &HashMap<String, OnceCell<NodeOutcome>>,
    initial_state: &State,
) -> Gathered {
    let inbound_edges: Vec<usize> = graph
        .spec()
        .edges
        .iter()
        .enumerate()
        .filter(|(_, e)| e.to.targets().contains(&node.id.as_str()))
        .map(|(i, _)| i)
        .collect();

    let mut contributions = Vec::new();
    for edge_index in inbound_edges {
        let edge = &graph.spec().edges[edge_index];
        let outcome = execute_node(&edge.from, graph, registry, adapters, cancel, cells, initial_state).await;
        let mut source_state = match outcome {
            NodeOutcome::Cancelled => return Gathered::Cancelled,
            NodeOutcome::Unreached | NodeOutcome::Failed(_) => continue,
            NodeOutcome::Completed(state) => state,
        };

        if let Some(cond) = graph.condition_at(edge_index) {
            if !cond.evaluate(&source_state).0 {
                continue;
            }
        }

        let cost = estimated_cost(node);
        match graph.queue_manager().admit(edge.queue.as_deref(), edge.lane.as_deref(), cost, cancel).await {
            Ok(warnings) => {
                for warning in warnings {
                    source_state.push_warning(warning);
                }
            }
            Err(_) => return Gathered::Cancelled,
        }

        contributions.push(source_state);
    }

    if contributions.is_empty() {
        Gathered::NoContribution
    } else {
        Gathered::Joined(state::join(contributions))
    }
}

/// Rate-limiting cost estimate for an edge delivering into `node`: only
/// `llm` nodes report a declared `max_tokens` ceiling worth charging against
/// a `max_tokens_per_minute` policy.
fn estimated_cost(node: &NodeDef) -> AdmissionCost {
    if node.node_type == NodeType::Llm {
        if let Some(max_tokens) = node.metadata.get("max_tokens").and_then(|v| v.as_u64()) {
            return AdmissionCost::with_tokens(max_tokens);
        }
    }
    AdmissionCost::free()
}

#[tracing::instrument(skip(registry, adapters, input), fields(node_id = %node.id, node_type = ?node.node_type))]
async fn run_behavior(node: &NodeDef, registry: &SourceRegistry<'_>, adapters: &Adapters, input: State) -> NodeOutcome {
    match behaviors::run(node, registry, adapters, input.clone()).await {
        Ok(state) => NodeOutcome::Completed(state),
        Err(err) => {
            tracing::error!(node_id = %node.id, error = %err, "node failed");
            let mut failed = input;
            failed.errors.push(err);
            failed.push_execution_path(&node.id);
            NodeOutcome::Failed(failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler;
    use crate::spec::{Bandwidth, EdgeDef, EdgeTarget, QueueDef, WorkflowSpec};
    use serde_json::Map;
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

    fn node(id: &str, node_type: NodeType, metadata: Map<String, serde_json::Value>) -> NodeDef {
        NodeDef { id: id.to_string(), node_type, metadata }
    }

    fn edge(from: &str, to: EdgeTarget) -> EdgeDef {
        EdgeDef { from: from.to_string(), to, queue: None, condition: None, lane: None }
    }

    #[tokio::test]
    async fn single_node_sanity() {
        let spec = WorkflowSpec {
            nodes: vec![node("i", NodeType::Input, Map::new())],
            edges: vec![],
            queues: vec![],
            sources: vec![],
            start_node: "i".to_string(),
        };
        let graph = compiler::compile(&spec).unwrap();
        let cancel = CancellationToken::new();
        let result = invoke(&graph, State::with_input("hi"), &adapters(), &cancel).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.final_state.execution_path(), vec!["i".to_string()]);
    }

    #[tokio::test]
    async fn failed_node_does_not_abort_sibling_branch() {
        let mut llm_metadata = Map::new();
        llm_metadata.insert("source".to_string(), json!("openai"));
        llm_metadata.insert("prompt_template".to_string(), json!("irrelevant"));

        let spec = WorkflowSpec {
            nodes: vec![
                node("i", NodeType::Input, Map::new()),
                node("l", NodeType::Llm, llm_metadata),
                node("agg", NodeType::Aggregator, Map::new()),
            ],
            edges: vec![
                edge("i", EdgeTarget::Many(vec!["l".to_string(), "agg".to_string()])),
                edge("l", EdgeTarget::Single("agg".to_string())),
            ],
            queues: vec![],
            sources: vec![crate::spec::SourceDef {
                id: "openai".to_string(),
                kind: crate::spec::SourceKind::Llm,
                config: serde_json::json!({"api_key_env": "WORKFLOW_TEST_DOES_NOT_EXIST"})
                    .as_object()
                    .unwrap()
                    .clone(),
            }],
            start_node: "i".to_string(),
        };

        let graph = compiler::compile(&spec).unwrap();
        let cancel = CancellationToken::new();
        let result = invoke(&graph, State::with_input("hi"), &adapters(), &cancel).await;

        // "l" fails (missing credential), but "agg" is fed directly by "i"
        // on the sibling fan-out edge and still completes.
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.final_state.errors.len(), 1);
        assert_eq!(result.final_state.errors[0].node_id, "l");
    }

    #[tokio::test]
    async fn unmatched_condition_on_every_outgoing_edge_is_a_dead_end() {
        let spec = WorkflowSpec {
            nodes: vec![node("i", NodeType::Input, Map::new()), node("never", NodeType::Aggregator, Map::new())],
            edges: vec![EdgeDef {
                from: "i".to_string(),
                to: EdgeTarget::Single("never".to_string()),
                queue: None,
                condition: Some("intent == 'nonexistent'".to_string()),
                lane: None,
            }],
            queues: vec![],
            sources: vec![],
            start_node: "i".to_string(),
        };
        let graph = compiler::compile(&spec).unwrap();
        let cancel = CancellationToken::new();
        let result = invoke(&graph, State::with_input("hi"), &adapters(), &cancel).await;

        // "i" completes but its only outgoing edge never fires; it is still a
        // terminal contributor, and that dead end is reported as an error
        // rather than silently dropped.
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.final_state.errors.len(), 1);
        assert_eq!(result.final_state.errors[0].node_id, "i");
        assert_eq!(result.final_state.errors[0].kind, NodeErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn structural_sink_with_no_outgoing_edges_is_not_a_dead_end() {
        let spec = WorkflowSpec {
            nodes: vec![node("i", NodeType::Input, Map::new())],
            edges: vec![],
            queues: vec![],
            sources: vec![],
            start_node: "i".to_string(),
        };
        let graph = compiler::compile(&spec).unwrap();
        let cancel = CancellationToken::new();
        let result = invoke(&graph, State::with_input("hi"), &adapters(), &cancel).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert!(result.final_state.errors.is_empty());
    }

    #[tokio::test]
    async fn router_fan_out_and_aggregator_join() {
        let mut router_metadata = Map::new();
        router_metadata.insert("strategy".to_string(), json!("keyword"));
        router_metadata.insert("rules".to_string(), json!([{"intent": "image", "keywords": ["image"]}]));
        router_metadata.insert("default_intent".to_string(), json!("text"));

        let mut agg_metadata = Map::new();
        agg_metadata.insert("strategy".to_string(), json!("merge"));
        agg_metadata.insert("source_keys".to_string(), json!(["intent"]));

        let spec = WorkflowSpec {
            nodes: vec![
                node("i", NodeType::Input, Map::new()),
                node("r", NodeType::Router, router_metadata),
                node("agg", NodeType::Aggregator, agg_metadata),
            ],
            edges: vec![
                edge("i", EdgeTarget::Single("r".to_string())),
                edge("r", EdgeTarget::Single("agg".to_string())),
            ],
            queues: vec![],
            sources: vec![],
            start_node: "i".to_string(),
        };
        let graph = compiler::compile(&spec).unwrap();
        let cancel = CancellationToken::new();
        let result = invoke(&graph, State::with_input("please draw an image"), &adapters(), &cancel).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.final_state.final_output.unwrap()["intent"], json!("image"));
    }

    #[tokio::test]
    async fn queue_throttles_edge_traversal() {
        let spec = WorkflowSpec {
            nodes: vec![node("i", NodeType::Input, Map::new()), node("agg", NodeType::Aggregator, Map::new())],
            edges: vec![EdgeDef {
                from: "i".to_string(),
                to: EdgeTarget::Single("agg".to_string()),
                queue: Some("q".to_string()),
                condition: None,
                lane: None,
            }],
            queues: vec![QueueDef {
                id: "q".to_string(),
                from: "i".to_string(),
                to: "agg".to_string(),
                bandwidth: Some(Bandwidth { max_requests_per_minute: Some(1000), ..Default::default() }),
                sub_queues: None,
            }],
            sources: vec![],
            start_node: "i".to_string(),
        };
        let graph = compiler::compile(&spec).unwrap();
        let cancel = CancellationToken::new();
        let result = invoke(&graph, State::with_input("hi"), &adapters(), &cancel).await;
        assert_eq!(result.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn cancellation_before_admission_reports_cancelled() {
        let spec = WorkflowSpec {
            nodes: vec![node("i", NodeType::Input, Map::new()), node("agg", NodeType::Aggregator, Map::new())],
            edges: vec![EdgeDef {
                from: "i".to_string(),
                to: EdgeTarget::Single("agg".to_string()),
                queue: Some("q".to_string()),
                condition: None,
                lane: None,
            }],
            queues: vec![QueueDef {
                id: "q".to_string(),
                from: "i".to_string(),
                to: "agg".to_string(),
                bandwidth: Some(Bandwidth { max_requests_per_minute: Some(1), ..Default::default() }),
                sub_queues: None,
            }],
            sources: vec![],
            start_node: "i".to_string(),
        };
        let graph = compiler::compile(&spec).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = invoke(&graph, State::with_input("hi"), &adapters(), &cancel).await;
        assert_eq!(result.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_edge_cost_admits_through_its_declared_lane_and_forwards_the_warning() {
        let mut llm_metadata = Map::new();
        llm_metadata.insert("source".to_string(), json!("s"));
        llm_metadata.insert("prompt_template".to_string(), json!("hi"));
        llm_metadata.insert("max_tokens".to_string(), json!(500));

        let spec = WorkflowSpec {
            nodes: vec![node("i", NodeType::Input, Map::new()), node("l", NodeType::Llm, llm_metadata)],
            edges: vec![EdgeDef {
                from: "i".to_string(),
                to: EdgeTarget::Single("l".to_string()),
                queue: Some("q".to_string()),
                condition: None,
                lane: Some("fast".to_string()),
            }],
            queues: vec![QueueDef {
                id: "q".to_string(),
                from: "i".to_string(),
                to: "l".to_string(),
                bandwidth: Some(Bandwidth { max_tokens_per_minute: Some(10), ..Default::default() }),
                sub_queues: Some(vec![crate::spec::SubQueueRef { id: "fast".to_string(), weight: 1.0 }]),
            }],
            sources: vec![crate::spec::SourceDef {
                id: "s".to_string(),
                kind: crate::spec::SourceKind::Llm,
                config: Map::new(),
            }],
            start_node: "i".to_string(),
        };

        let graph = compiler::compile(&spec).unwrap();
        let cancel = CancellationToken::new();
        let result = invoke(&graph, State::with_input("hi"), &adapters(), &cancel).await;

        // "l" requests 500 tokens against a 10-token-per-minute queue but is
        // admitted immediately (starvation carve-out) through its named lane,
        // and the gate's warning is forwarded into the joined state.
        assert_eq!(result.status, ExecutionStatus::Success);
        assert!(result.final_state.warnings().iter().any(|w| w.contains("500")));
    }
}
