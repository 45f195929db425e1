//! Static validation of a parsed [`WorkflowSpec`].
//!
//! Every check below is independent of the others and all of them run even
//! after one fails — callers get a single complete remediation list rather
//! than a first-error-wins report.

use crate::error::{ErrorCode, ValidationError};
use crate::spec::{NodeType, WorkflowSpec};
use std::collections::{HashMap, HashSet};

/// Run every structural and referential check against `spec`, returning the
/// complete (possibly empty) list of violations.
pub fn validate(spec: &WorkflowSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    check_uniqueness(spec, &mut errors);
    check_start_node(spec, &mut errors);
    check_edge_targets(spec, &mut errors);
    check_queue_endpoints(spec, &mut errors);
    check_source_linkage(spec, &mut errors);
    check_bandwidth(spec, &mut errors);
    check_edge_lanes(spec, &mut errors);
    check_cycles(spec, &mut errors);

    errors
}

fn check_uniqueness(spec: &WorkflowSpec, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for node in &spec.nodes {
        if !seen.insert(node.id.as_str()) {
            errors.push(
                ValidationError::new(ErrorCode::E009, "nodes[].id", format!("duplicate node id '{}'", node.id))
                    .with_node(node.id.clone()),
            );
        }
    }
    let mut seen = HashSet::new();
    for queue in &spec.queues {
        if !seen.insert(queue.id.as_str()) {
            errors.push(
                ValidationError::new(ErrorCode::E010, "queues[].id", format!("duplicate queue id '{}'", queue.id))
                    .with_queue(queue.id.clone()),
            );
        }
    }
    let mut seen = HashSet::new();
    for source in &spec.sources {
        if !seen.insert(source.id.as_str()) {
            errors.push(ValidationError::new(
                ErrorCode::E011,
                "sources[].id",
                format!("duplicate source id '{}'", source.id),
            ));
        }
    }
}

fn check_start_node(spec: &WorkflowSpec, errors: &mut Vec<ValidationError>) {
    if !spec.nodes.iter().any(|n| n.id == spec.start_node) {
        errors.push(ValidationError::new(
            ErrorCode::E005,
            "start_node",
            format!("start_node '{}' does not reference any node", spec.start_node),
        ));
    }
}

fn check_edge_targets(spec: &WorkflowSpec, errors: &mut Vec<ValidationError>) {
    let node_ids: HashSet<&str> = spec.nodes.iter().map(|n| n.id.as_str()).collect();
    for (i, edge) in spec.edges.iter().enumerate() {
        if !node_ids.contains(edge.from.as_str()) {
            errors.push(
                ValidationError::new(
                    ErrorCode::E006,
                    format!("edges[{i}].from"),
                    format!("edge references non-existent node '{}'", edge.from),
                )
                .with_node(edge.from.clone()),
            );
        }
        for target in edge.to.targets() {
            if !node_ids.contains(target) {
                errors.push(
                    ValidationError::new(
                        ErrorCode::E006,
                        format!("edges[{i}].to"),
                        format!("edge references non-existent node '{target}'"),
                    )
                    .with_node(target.to_string()),
                );
            }
        }
    }
}

fn check_queue_endpoints(spec: &WorkflowSpec, errors: &mut Vec<ValidationError>) {
    let node_ids: HashSet<&str> = spec.nodes.iter().map(|n| n.id.as_str()).collect();
    for queue in &spec.queues {
        if !node_ids.contains(queue.from.as_str()) {
            errors.push(
                ValidationError::new(
                    ErrorCode::E007,
                    "queues[].from",
                    format!("queue '{}' references non-existent node '{}'", queue.id, queue.from),
                )
                .with_queue(queue.id.clone()),
            );
        }
        if !node_ids.contains(queue.to.as_str()) {
            errors.push(
                ValidationError::new(
                    ErrorCode::E007,
                    "queues[].to",
                    format!("queue '{}' references non-existent node '{}'", queue.id, queue.to),
                )
                .with_queue(queue.id.clone()),
            );
        }
    }
}

fn check_source_linkage(spec: &WorkflowSpec, errors: &mut Vec<ValidationError>) {
    let source_ids: HashSet<&str> = spec.sources.iter().map(|s| s.id.as_str()).collect();
    for node in &spec.nodes {
        if !matches!(node.node_type, NodeType::Llm | NodeType::Image | NodeType::Db) {
            continue;
        }
        match node.metadata.get("source").and_then(|v| v.as_str()) {
            None => errors.push(
                ValidationError::new(
                    ErrorCode::E014,
                    format!("nodes[{}].metadata.source", node.id),
                    format!("node '{}' of type {:?} requires metadata.source", node.id, node.node_type),
                )
                .with_node(node.id.clone()),
            ),
            Some(source_id) if !source_ids.contains(source_id) => errors.push(
                ValidationError::new(
                    ErrorCode::E008,
                    format!("nodes[{}].metadata.source", node.id),
                    format!("node '{}' references non-existent source '{source_id}'", node.id),
                )
                .with_node(node.id.clone()),
            ),
            Some(_) => {}
        }
    }
}

fn check_bandwidth(spec: &WorkflowSpec, errors: &mut Vec<ValidationError>) {
    for queue in &spec.queues {
        if let Some(bandwidth) = &queue.bandwidth {
            let fields = [
                ("max_messages_per_second", bandwidth.max_messages_per_second),
                ("max_requests_per_minute", bandwidth.max_requests_per_minute),
                ("max_tokens_per_minute", bandwidth.max_tokens_per_minute),
                ("burst_size", bandwidth.burst_size),
            ];
            for (field, value) in fields {
                if let Some(0) = value {
                    errors.push(
                        ValidationError::new(
                            ErrorCode::E012,
                            format!("queues[].bandwidth.{field}"),
                            format!("queue '{}' field '{field}' must be strictly positive", queue.id),
                        )
                        .with_queue(queue.id.clone()),
                    );
                }
            }
        }
        if let Some(sub_queues) = &queue.sub_queues {
            let mut total = 0.0;
            for sub in sub_queues {
                if !(0.0..=1.0).contains(&sub.weight) {
                    errors.push(
                        ValidationError::new(
                            ErrorCode::E012,
                            "queues[].sub_queues[].weight",
                            format!(
                                "queue '{}' sub-queue '{}' weight {} out of [0,1]",
                                queue.id, sub.id, sub.weight
                            ),
                        )
                        .with_queue(queue.id.clone()),
                    );
                }
                total += sub.weight;
            }
            if total > 1.0 {
                errors.push(
                    ValidationError::new(
                        ErrorCode::E012,
                        "queues[].sub_queues",
                        format!("queue '{}' sub-queue weights sum to {total} > 1", queue.id),
                    )
                    .with_queue(queue.id.clone()),
                );
            }
        }
    }
}

/// An edge naming a `lane` must name a `queue` that declares a sub-queue
/// with that id — otherwise the lane can never be matched against a
/// configured weight and admission would silently fall back to the shared
/// lane.
fn check_edge_lanes(spec: &WorkflowSpec, errors: &mut Vec<ValidationError>) {
    let queues: HashMap<&str, &crate::spec::QueueDef> = spec.queues.iter().map(|q| (q.id.as_str(), q)).collect();
    for (i, edge) in spec.edges.iter().enumerate() {
        let Some(lane) = &edge.lane else { continue };
        let declared = edge
            .queue
            .as_deref()
            .and_then(|queue_id| queues.get(queue_id))
            .and_then(|queue| queue.sub_queues.as_ref())
            .is_some_and(|subs| subs.iter().any(|s| &s.id == lane));
        if !declared {
            errors.push(
                ValidationError::new(
                    ErrorCode::E012,
                    format!("edges[{i}].lane"),
                    format!(
                        "edge from '{}' names lane '{lane}' but its queue declares no matching sub-queue",
                        edge.from
                    ),
                )
                .with_node(edge.from.clone()),
            );
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

fn check_cycles(spec: &WorkflowSpec, errors: &mut Vec<ValidationError>) {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &spec.edges {
        adjacency.entry(edge.from.as_str()).or_default().extend(edge.to.targets());
    }

    let mut colors: HashMap<&str, Color> = spec.nodes.iter().map(|n| (n.id.as_str(), Color::White)).collect();
    let mut found_cycle = false;

    for node in &spec.nodes {
        if colors.get(node.id.as_str()) == Some(&Color::White) {
            visit(node.id.as_str(), &adjacency, &mut colors, &mut found_cycle);
        }
    }

    if found_cycle {
        errors.push(ValidationError::new(
            ErrorCode::E013,
            "edges",
            "the graph induced by edges contains a cycle",
        ));
    }
}

fn visit<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    colors: &mut HashMap<&'a str, Color>,
    found_cycle: &mut bool,
) {
    colors.insert(node, Color::Grey);
    if let Some(neighbors) = adjacency.get(node) {
        for &next in neighbors {
            match colors.get(next) {
                Some(Color::Grey) => {
                    *found_cycle = true;
                }
                Some(Color::White) | None => {
                    if colors.contains_key(next) {
                        visit(next, adjacency, colors, found_cycle);
                    }
                }
                Some(Color::Black) => {}
            }
        }
    }
    colors.insert(node, Color::Black);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{EdgeDef, EdgeTarget, NodeDef, QueueDef, SourceDef, SourceKind};
    use serde_json::Map;

    fn node(id: &str, node_type: NodeType) -> NodeDef {
        NodeDef {
            id: id.to_string(),
            node_type,
            metadata: Map::new(),
        }
    }

    fn edge(from: &str, to: EdgeTarget) -> EdgeDef {
        EdgeDef {
            from: from.to_string(),
            to,
            queue: None,
            condition: None,
            lane: None,
        }
    }

    #[test]
    fn single_node_sanity_has_no_errors() {
        let spec = WorkflowSpec {
            nodes: vec![node("i", NodeType::Input)],
            edges: vec![],
            queues: vec![],
            sources: vec![],
            start_node: "i".to_string(),
        };
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn undefined_fan_out_targets_report_one_e006_each() {
        let spec = WorkflowSpec {
            nodes: vec![node("i", NodeType::Input)],
            edges: vec![edge("i", EdgeTarget::Many(vec!["a".to_string(), "b".to_string()]))],
            queues: vec![],
            sources: vec![],
            start_node: "i".to_string(),
        };
        let errors = validate(&spec);
        let e006: Vec<_> = errors.iter().filter(|e| e.code == ErrorCode::E006).collect();
        assert_eq!(e006.len(), 2);
        let named: HashSet<_> = e006.iter().filter_map(|e| e.node_id.as_deref()).collect();
        assert!(named.contains("a"));
        assert!(named.contains("b"));
    }

    #[test]
    fn direct_cycle_is_detected() {
        let spec = WorkflowSpec {
            nodes: vec![node("a", NodeType::Input), node("b", NodeType::Aggregator)],
            edges: vec![
                edge("a", EdgeTarget::Single("b".to_string())),
                edge("b", EdgeTarget::Single("a".to_string())),
            ],
            queues: vec![],
            sources: vec![],
            start_node: "a".to_string(),
        };
        let errors = validate(&spec);
        assert!(errors.iter().any(|e| e.code == ErrorCode::E013));
    }

    #[test]
    fn llm_node_without_source_is_e014() {
        let spec = WorkflowSpec {
            nodes: vec![node("l", NodeType::Llm)],
            edges: vec![],
            queues: vec![],
            sources: vec![],
            start_node: "l".to_string(),
        };
        let errors = validate(&spec);
        assert!(errors.iter().any(|e| e.code == ErrorCode::E014));
    }

    #[test]
    fn llm_node_with_dangling_source_is_e008() {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), serde_json::json!("missing"));
        let spec = WorkflowSpec {
            nodes: vec![NodeDef {
                id: "l".to_string(),
                node_type: NodeType::Llm,
                metadata,
            }],
            edges: vec![],
            queues: vec![],
            sources: vec![],
            start_node: "l".to_string(),
        };
        let errors = validate(&spec);
        assert!(errors.iter().any(|e| e.code == ErrorCode::E008));
    }

    #[test]
    fn sub_queue_weights_over_one_are_rejected() {
        let spec = WorkflowSpec {
            nodes: vec![node("a", NodeType::Input), node("b", NodeType::Aggregator)],
            edges: vec![edge("a", EdgeTarget::Single("b".to_string()))],
            queues: vec![QueueDef {
                id: "q".to_string(),
                from: "a".to_string(),
                to: "b".to_string(),
                bandwidth: None,
                sub_queues: Some(vec![
                    crate::spec::SubQueueRef { id: "x".to_string(), weight: 0.7 },
                    crate::spec::SubQueueRef { id: "y".to_string(), weight: 0.7 },
                ]),
            }],
            sources: vec![],
            start_node: "a".to_string(),
        };
        let errors = validate(&spec);
        assert!(errors.iter().any(|e| e.code == ErrorCode::E012));
    }

    #[test]
    fn edge_lane_without_matching_sub_queue_is_e012() {
        let spec = WorkflowSpec {
            nodes: vec![node("a", NodeType::Input), node("b", NodeType::Aggregator)],
            edges: vec![EdgeDef {
                from: "a".to_string(),
                to: EdgeTarget::Single("b".to_string()),
                queue: Some("q".to_string()),
                condition: None,
                lane: Some("premium".to_string()),
            }],
            queues: vec![QueueDef {
                id: "q".to_string(),
                from: "a".to_string(),
                to: "b".to_string(),
                bandwidth: None,
                sub_queues: Some(vec![crate::spec::SubQueueRef { id: "standard".to_string(), weight: 1.0 }]),
            }],
            sources: vec![],
            start_node: "a".to_string(),
        };
        let errors = validate(&spec);
        assert!(errors.iter().any(|e| e.code == ErrorCode::E012 && e.field_path == "edges[0].lane"));
    }

    #[test]
    fn duplicate_ids_all_reported_together() {
        let spec = WorkflowSpec {
            nodes: vec![node("a", NodeType::Input), node("a", NodeType::Aggregator)],
            edges: vec![],
            queues: vec![],
            sources: vec![SourceDef {
                id: "s".to_string(),
                kind: SourceKind::Llm,
                config: Map::new(),
            }],
            start_node: "a".to_string(),
        };
        let errors = validate(&spec);
        assert!(errors.iter().any(|e| e.code == ErrorCode::E009));
        // start_node check still runs even though uniqueness also failed.
        assert!(!errors.iter().any(|e| e.code == ErrorCode::E005));
    }
}
