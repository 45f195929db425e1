//! In-memory representation of a workflow declaration.
//!
//! Parsing accepts exactly the JSON surface described in the wire format:
//! unknown top-level keys are rejected (`#[serde(deny_unknown_fields)]`),
//! while keys inside `metadata`/`config` maps are preserved opaquely since
//! their shape is type-specific and caller-defined.

use crate::error::SpecError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Read;

/// The closed set of node behaviors. Dispatch on this is a compile-time
/// match, not a runtime string lookup — see [`crate::behaviors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Input,
    Router,
    Llm,
    Image,
    Db,
    Aggregator,
}

/// One node in the declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// The `to` field of an edge: either a single node id or a non-empty list,
/// the latter meaning parallel fan-out to every listed target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeTarget {
    Single(String),
    Many(Vec<String>),
}

impl EdgeTarget {
    /// The target ids, in declaration order.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            EdgeTarget::Single(id) => vec![id.as_str()],
            EdgeTarget::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    /// `true` when this edge targets more than one node.
    pub fn is_fan_out(&self) -> bool {
        matches!(self, EdgeTarget::Many(ids) if ids.len() > 1)
    }
}

/// One edge in the declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDef {
    pub from: String,
    pub to: EdgeTarget,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    /// The sub-queue lane this edge's admissions count against, when `queue`
    /// names a queue that declares `sub_queues`. `None` admits against the
    /// queue's shared lane.
    #[serde(default)]
    pub lane: Option<String>,
}

/// The bandwidth policy carried by a queue. Every field is independently
/// optional; all that are present must be satisfied simultaneously.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Bandwidth {
    #[serde(default)]
    pub max_messages_per_second: Option<u32>,
    #[serde(default)]
    pub max_requests_per_minute: Option<u32>,
    #[serde(default)]
    pub max_tokens_per_minute: Option<u32>,
    #[serde(default)]
    pub burst_size: Option<u32>,
}

/// A weighted lane partitioning a queue's bandwidth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQueueRef {
    pub id: String,
    pub weight: f64,
}

/// One rate-limited channel between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDef {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub bandwidth: Option<Bandwidth>,
    #[serde(default)]
    pub sub_queues: Option<Vec<SubQueueRef>>,
}

/// The kind of external service a [`SourceDef`] configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Llm,
    Image,
    Db,
    Api,
}

/// A named external-service configuration. `config` values that denote
/// secrets are references to key material (an environment variable name),
/// never literal secret values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDef {
    pub id: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// The full workflow declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSpec {
    pub nodes: Vec<NodeDef>,
    pub edges: Vec<EdgeDef>,
    #[serde(default)]
    pub queues: Vec<QueueDef>,
    #[serde(default)]
    pub sources: Vec<SourceDef>,
    pub start_node: String,
}

impl WorkflowSpec {
    /// Parse a declaration from a JSON string.
    pub fn from_json(input: &str) -> Result<Self, SpecError> {
        serde_json::from_str(input).map_err(SpecError::Malformed)
    }

    /// Parse a declaration from any `Read` source (a file, a socket).
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, SpecError> {
        let mut buf = String::new();
        reader
            .read_to_string(&mut buf)
            .map_err(SpecError::Io)?;
        Self::from_json(&buf)
    }

    /// Serialize this declaration back to JSON.
    pub fn to_json(&self) -> Result<String, SpecError> {
        serde_json::to_string_pretty(self).map_err(SpecError::Malformed)
    }

    /// Build an indexed view giving O(1) lookup by id.
    pub fn indexed(&self) -> SpecIndex<'_> {
        SpecIndex::build(self)
    }
}

/// O(1) lookup of nodes, sources, and queues by id, and of outgoing/incoming
/// edges by node id, built once over a [`WorkflowSpec`].
pub struct SpecIndex<'a> {
    spec: &'a WorkflowSpec,
    node_by_id: HashMap<&'a str, usize>,
    source_by_id: HashMap<&'a str, usize>,
    queue_by_id: HashMap<&'a str, usize>,
    edges_from: HashMap<&'a str, Vec<usize>>,
    edges_to: HashMap<&'a str, Vec<usize>>,
}

impl<'a> SpecIndex<'a> {
    fn build(spec: &'a WorkflowSpec) -> Self {
        let mut node_by_id = HashMap::with_capacity(spec.nodes.len());
        for (i, node) in spec.nodes.iter().enumerate() {
            node_by_id.insert(node.id.as_str(), i);
        }
        let mut source_by_id = HashMap::with_capacity(spec.sources.len());
        for (i, source) in spec.sources.iter().enumerate() {
            source_by_id.insert(source.id.as_str(), i);
        }
        let mut queue_by_id = HashMap::with_capacity(spec.queues.len());
        for (i, queue) in spec.queues.iter().enumerate() {
            queue_by_id.insert(queue.id.as_str(), i);
        }
        let mut edges_from: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut edges_to: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, edge) in spec.edges.iter().enumerate() {
            edges_from.entry(edge.from.as_str()).or_default().push(i);
            for target in edge.to.targets() {
                edges_to.entry(target).or_default().push(i);
            }
        }
        Self {
            spec,
            node_by_id,
            source_by_id,
            queue_by_id,
            edges_from,
            edges_to,
        }
    }

    pub fn node(&self, id: &str) -> Option<&'a NodeDef> {
        self.node_by_id.get(id).map(|&i| &self.spec.nodes[i])
    }

    pub fn source(&self, id: &str) -> Option<&'a SourceDef> {
        self.source_by_id.get(id).map(|&i| &self.spec.sources[i])
    }

    pub fn queue(&self, id: &str) -> Option<&'a QueueDef> {
        self.queue_by_id.get(id).map(|&i| &self.spec.queues[i])
    }

    pub fn edges_from(&self, node_id: &str) -> impl Iterator<Item = &'a EdgeDef> + '_ {
        self.edges_from
            .get(node_id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.spec.edges[i])
    }

    pub fn edges_to(&self, node_id: &str) -> impl Iterator<Item = &'a EdgeDef> + '_ {
        self.edges_to
            .get(node_id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.spec.edges[i])
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node_by_id.contains_key(id)
    }

    pub fn has_source(&self, id: &str) -> bool {
        self.source_by_id.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowSpec {
        WorkflowSpec {
            nodes: vec![
                NodeDef {
                    id: "a".to_string(),
                    node_type: NodeType::Input,
                    metadata: Map::new(),
                },
                NodeDef {
                    id: "b".to_string(),
                    node_type: NodeType::Aggregator,
                    metadata: Map::new(),
                },
            ],
            edges: vec![EdgeDef {
                from: "a".to_string(),
                to: EdgeTarget::Single("b".to_string()),
                queue: None,
                condition: None,
                lane: None,
            }],
            queues: vec![],
            sources: vec![],
            start_node: "a".to_string(),
        }
    }

    #[test]
    fn parses_single_and_list_edge_targets() {
        let spec = WorkflowSpec::from_json(
            r#"{"nodes":[{"id":"a","type":"input"}],"edges":[{"from":"a","to":["b","c"]}],"start_node":"a"}"#,
        )
        .unwrap();
        assert!(spec.edges[0].to.is_fan_out());
        assert_eq!(spec.edges[0].to.targets(), vec!["b", "c"]);
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        let result = WorkflowSpec::from_json(
            r#"{"nodes":[],"edges":[],"start_node":"a","bogus":1}"#,
        );
        assert!(matches!(result, Err(SpecError::Malformed(_))));
    }

    #[test]
    fn index_resolves_nodes_and_edges() {
        let spec = sample();
        let index = spec.indexed();
        assert!(index.has_node("a"));
        assert!(!index.has_node("z"));
        assert_eq!(index.edges_from("a").count(), 1);
        assert_eq!(index.edges_to("b").count(), 1);
    }
}
