//! Per-queue bandwidth gating for workflow edge traversals.
//!
//! Each [`Queue`] declared in a workflow spec becomes a [`QueueGate`] that
//! enforces, simultaneously, whichever of four independent policies are
//! configured:
//!
//! - `max_messages_per_second` — a minimum interval between admissions.
//! - `max_requests_per_minute` — a sliding 60s window of admission counts.
//! - `max_tokens_per_minute` — a sliding 60s window of token-weighted cost.
//! - `burst_size` — a token bucket permitting an initial burst of
//!   admissions, refilling at the rate implied by whichever per-unit limit
//!   is configured (requests/min takes priority over messages/s).
//!
//! Sub-queues partition one gate into weighted lanes serviced by
//! deterministic weighted round-robin; within a lane, admission is FIFO.
//!
//! Grounded in `tooling::rate_limit`'s token-bucket (`RateLimiter`) and
//! sliding-window (`SlidingWindowLimiter`) designs, generalized into one
//! gate that composes all four policies and adds lane fairness.
//!
//! `await_slot`/[`QueueGate::admit`] never fails a workflow for a rate-limit
//! condition — it only ever blocks until admission is granted, or returns
//! [`LimiterError::Cancelled`] if the caller's cancellation token fires
//! while the task is suspended.

mod gate;
mod manager;
mod policy;

pub use gate::{AdmissionCost, QueueGate};
pub use manager::{QueueDef, QueueManager, SubQueueDef};
pub use policy::BandwidthPolicy;
pub use tokio_util::sync::CancellationToken;

use thiserror::Error;

/// Failure returned by [`QueueGate::admit`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// The caller's cancellation token fired while the task was suspended
    /// waiting for admission. The executor converts this into `Cancelled`.
    #[error("admission wait cancelled")]
    Cancelled,

    /// The gate's owning manager was torn down while a waiter was blocked.
    #[error("rate limiter shut down while awaiting admission")]
    Shutdown,
}
