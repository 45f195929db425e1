//! A single queue's composed bandwidth gate.

use crate::policy::BandwidthPolicy;
use crate::LimiterError;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

const WINDOW: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The admission cost of one edge traversal: always one message and one
/// request, plus however many tokens the node declares it will spend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionCost {
    /// Tokens this admission will consume against `max_tokens_per_minute`.
    /// `0` for node types that don't report token usage.
    pub tokens: u64,
}

impl AdmissionCost {
    /// A cost carrying no token usage, for non-LLM node types.
    pub fn free() -> Self {
        Self { tokens: 0 }
    }

    /// A cost reporting `tokens` tokens spent.
    pub fn with_tokens(tokens: u64) -> Self {
        Self { tokens }
    }
}

#[derive(Debug, Default)]
struct GateState {
    last_admission: Option<Instant>,
    request_window: VecDeque<Instant>,
    token_window: VecDeque<(Instant, u64)>,
    burst_tokens: f64,
    last_refill: Option<Instant>,
    /// Weighted round-robin virtual clock, one entry per lane that has ever
    /// been admitted through this gate.
    lane_virtual_time: HashMap<String, f64>,
    /// Count of waiters currently polling for admission, per lane. Used so
    /// a lane with nobody waiting never blocks one that does.
    lane_pending: HashMap<String, u64>,
}

/// Enforces [`BandwidthPolicy`] for one queue, optionally partitioned into
/// weighted sub-queue lanes.
///
/// `admit` never returns an error for being rate-limited — it blocks until
/// admission is granted. It returns [`LimiterError::Cancelled`] only if the
/// caller's [`CancellationToken`] fires while the task is suspended here.
#[derive(Debug)]
pub struct QueueGate {
    id: String,
    policy: BandwidthPolicy,
    lane_weights: HashMap<String, f64>,
    state: Mutex<GateState>,
}

impl QueueGate {
    /// Build a gate enforcing `policy`, with `lane_weights` declaring each
    /// named sub-queue's weighted-round-robin share. An empty map means the
    /// gate has no sub-queues — every admission uses the `None` lane.
    pub fn new(id: impl Into<String>, policy: BandwidthPolicy, lane_weights: HashMap<String, f64>) -> Self {
        let burst_tokens = policy.burst_size.map(|b| b as f64).unwrap_or(0.0);
        Self {
            id: id.into(),
            policy,
            lane_weights,
            state: Mutex::new(GateState {
                burst_tokens,
                ..Default::default()
            }),
        }
    }

    /// The queue id this gate was built from.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Block until an admission slot is available for `lane` (or the
    /// default lane if `None`), then record it. Returns any warnings
    /// accrued while granting admission — currently only the starvation
    /// carve-out below — for the caller to attach to its state.
    ///
    /// Grounded in `RateLimiter::acquire`'s check-then-sleep-then-retry
    /// loop, generalized to evaluate all four bandwidth policies and lane
    /// fairness on every poll.
    pub async fn admit(
        &self,
        lane: Option<&str>,
        cost: AdmissionCost,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, LimiterError> {
        let lane_key = lane.unwrap_or("").to_string();
        self.register_waiter(&lane_key).await;

        loop {
            if cancel.is_cancelled() {
                self.unregister_waiter(&lane_key).await;
                return Err(LimiterError::Cancelled);
            }

            let now = Instant::now();
            let mut state = self.state.lock().await;
            self.refill_burst(&mut state, now);
            self.evict_expired(&mut state, now);

            if self.is_eligible(&state, now, &lane_key, cost) {
                let warnings = self.starvation_warning(&state, cost).into_iter().collect();
                self.record_admission(&mut state, now, &lane_key, cost);
                drop(state);
                self.unregister_waiter(&lane_key).await;
                trace!(queue = %self.id, lane = %lane_key, tokens = cost.tokens, "admitted");
                return Ok(warnings);
            }
            drop(state);

            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = cancel.cancelled() => {
                    self.unregister_waiter(&lane_key).await;
                    return Err(LimiterError::Cancelled);
                }
            }
        }
    }

    async fn register_waiter(&self, lane: &str) {
        let mut state = self.state.lock().await;
        *state.lane_pending.entry(lane.to_string()).or_insert(0) += 1;
        state.lane_virtual_time.entry(lane.to_string()).or_insert(0.0);
    }

    async fn unregister_waiter(&self, lane: &str) {
        let mut state = self.state.lock().await;
        if let Some(count) = state.lane_pending.get_mut(lane) {
            *count = count.saturating_sub(1);
        }
    }

    fn refill_burst(&self, state: &mut GateState, now: Instant) {
        let Some(rate) = self.policy.burst_refill_per_second() else {
            return;
        };
        let capacity = self.policy.burst_size.unwrap_or(u32::MAX) as f64;
        let last = state.last_refill.unwrap_or(now);
        let elapsed = now.saturating_duration_since(last).as_secs_f64();
        state.burst_tokens = (state.burst_tokens + elapsed * rate).min(capacity);
        state.last_refill = Some(now);
    }

    fn evict_expired(&self, state: &mut GateState, now: Instant) {
        while let Some(front) = state.request_window.front() {
            if now.saturating_duration_since(*front) > WINDOW {
                state.request_window.pop_front();
            } else {
                break;
            }
        }
        while let Some((at, _)) = state.token_window.front() {
            if now.saturating_duration_since(*at) > WINDOW {
                state.token_window.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_eligible(&self, state: &GateState, now: Instant, lane: &str, cost: AdmissionCost) -> bool {
        if !self.lane_turn(state, lane) {
            return false;
        }
        if let Some(max_mps) = self.policy.max_messages_per_second {
            let min_interval = Duration::from_secs_f64(1.0 / max_mps as f64);
            if let Some(last) = state.last_admission {
                if now.saturating_duration_since(last) < min_interval {
                    return false;
                }
            }
        }
        if let Some(max_rpm) = self.policy.max_requests_per_minute {
            if state.request_window.len() as u32 >= max_rpm {
                return false;
            }
        }
        if let Some(max_tpm) = self.policy.max_tokens_per_minute {
            let spent: u64 = state.token_window.iter().map(|(_, t)| t).sum();
            if spent + cost.tokens > max_tpm as u64 && !self.is_lone_oversized_request(spent, cost, max_tpm) {
                return false;
            }
        }
        if self.policy.burst_size.is_some() && state.burst_tokens < 1.0 {
            return false;
        }
        true
    }

    /// A single request costing more tokens than the whole per-minute budget
    /// would otherwise block forever. Once the window is empty, admit it
    /// anyway rather than starve it — this is the only case `is_eligible`
    /// treats as eligible despite `spent + cost.tokens > max_tpm`.
    fn is_lone_oversized_request(&self, spent: u64, cost: AdmissionCost, max_tpm: u32) -> bool {
        spent == 0 && cost.tokens > max_tpm as u64
    }

    /// The warning to attach when an admission was only granted via the
    /// starvation carve-out above.
    fn starvation_warning(&self, state: &GateState, cost: AdmissionCost) -> Option<String> {
        let max_tpm = self.policy.max_tokens_per_minute?;
        let spent: u64 = state.token_window.iter().map(|(_, t)| t).sum();
        self.is_lone_oversized_request(spent, cost, max_tpm).then(|| {
            format!(
                "queue '{}' admitted a {}-token request exceeding its {max_tpm}-token-per-minute budget \
                 once the window was empty, to avoid starving it",
                self.id, cost.tokens
            )
        })
    }

    /// A lane may be admitted only if it holds the minimum virtual time
    /// among lanes with a waiter currently pending.
    fn lane_turn(&self, state: &GateState, lane: &str) -> bool {
        if self.lane_weights.is_empty() {
            return true;
        }
        let waiting_lanes = state
            .lane_pending
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(lane, _)| lane.as_str());
        let min_virtual_time = waiting_lanes
            .map(|lane| state.lane_virtual_time.get(lane).copied().unwrap_or(0.0))
            .fold(f64::INFINITY, f64::min);
        let this_lane_time = state.lane_virtual_time.get(lane).copied().unwrap_or(0.0);
        this_lane_time <= min_virtual_time
    }

    fn record_admission(&self, state: &mut GateState, now: Instant, lane: &str, cost: AdmissionCost) {
        state.last_admission = Some(now);
        state.request_window.push_back(now);
        if cost.tokens > 0 {
            state.token_window.push_back((now, cost.tokens));
        }
        if self.policy.burst_size.is_some() {
            state.burst_tokens -= 1.0;
        }
        let weight = self.lane_weights.get(lane).copied().unwrap_or(1.0).max(f64::EPSILON);
        let entry = state.lane_virtual_time.entry(lane.to_string()).or_insert(0.0);
        *entry += 1.0 / weight;
    }
}
