//! Bandwidth policy configuration for a single queue.

/// Declared bandwidth limits for one queue. Every field is independently
/// optional; all configured fields must be satisfied simultaneously for an
/// admission to be granted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandwidthPolicy {
    /// Minimum admission interval is `1 / max_messages_per_second` seconds.
    pub max_messages_per_second: Option<u32>,
    /// At most this many admissions may fall within any trailing 60s window.
    pub max_requests_per_minute: Option<u32>,
    /// At most this many tokens may be admitted within any trailing 60s
    /// window.
    pub max_tokens_per_minute: Option<u32>,
    /// Token-bucket capacity permitting an initial burst of admissions.
    pub burst_size: Option<u32>,
}

impl BandwidthPolicy {
    /// `true` if no bandwidth policy is configured at all — the gate is a
    /// pass-through.
    pub fn is_unbounded(&self) -> bool {
        self.max_messages_per_second.is_none()
            && self.max_requests_per_minute.is_none()
            && self.max_tokens_per_minute.is_none()
            && self.burst_size.is_none()
    }

    /// The refill rate (admissions/second) implied for the burst bucket:
    /// requests/minute takes priority over messages/second, per spec §4.4.
    pub(crate) fn burst_refill_per_second(&self) -> Option<f64> {
        if let Some(rpm) = self.max_requests_per_minute {
            Some(rpm as f64 / 60.0)
        } else {
            self.max_messages_per_second.map(|m| m as f64)
        }
    }
}
