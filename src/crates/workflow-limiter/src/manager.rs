//! Owns every [`QueueGate`] declared by a workflow spec.

use crate::gate::{AdmissionCost, QueueGate};
use crate::policy::BandwidthPolicy;
use crate::LimiterError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One named, weighted sub-queue lane belonging to a parent queue.
#[derive(Debug, Clone)]
pub struct SubQueueDef {
    /// The sub-queue's id, used as the lane key passed to [`QueueGate::admit`].
    pub id: String,
    /// Weighted-round-robin share relative to its siblings.
    pub weight: f64,
}

/// One queue declaration as it arrives from a workflow spec: an id, its
/// bandwidth policy, and its (possibly empty) sub-queue lanes.
#[derive(Debug, Clone)]
pub struct QueueDef {
    /// The queue's id, referenced by edges' `queue` field.
    pub id: String,
    /// The bandwidth limits to enforce.
    pub policy: BandwidthPolicy,
    /// Weighted lanes partitioning this queue, if any.
    pub sub_queues: Vec<SubQueueDef>,
}

/// Holds one [`QueueGate`] per declared queue, looked up by id at edge
/// traversal time.
#[derive(Debug, Default)]
pub struct QueueManager {
    gates: HashMap<String, Arc<QueueGate>>,
}

impl QueueManager {
    /// Build a manager with one gate per entry in `queues`.
    pub fn new(queues: impl IntoIterator<Item = QueueDef>) -> Self {
        let gates = queues
            .into_iter()
            .map(|def| {
                let lane_weights: HashMap<String, f64> = def
                    .sub_queues
                    .into_iter()
                    .map(|sub| (sub.id, sub.weight))
                    .collect();
                let gate = Arc::new(QueueGate::new(def.id.clone(), def.policy, lane_weights));
                (def.id, gate)
            })
            .collect();
        Self { gates }
    }

    /// An empty manager: every edge traversal goes unthrottled because no
    /// queue was declared at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The gate registered for `queue_id`, if any.
    pub fn gate(&self, queue_id: &str) -> Option<Arc<QueueGate>> {
        self.gates.get(queue_id).cloned()
    }

    /// Admit through `queue_id`'s gate, optionally within `lane`. Passing an
    /// id with no registered gate is a no-op admission — callers validate
    /// queue references ahead of execution, so this only happens for edges
    /// that declare no queue at all. Returns any warnings the gate attached
    /// to this admission (e.g. the starvation carve-out).
    pub async fn admit(
        &self,
        queue_id: Option<&str>,
        lane: Option<&str>,
        cost: AdmissionCost,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, LimiterError> {
        let Some(queue_id) = queue_id else {
            return Ok(Vec::new());
        };
        match self.gate(queue_id) {
            Some(gate) => gate.admit(lane, cost, cancel).await,
            None => Ok(Vec::new()),
        }
    }
}
