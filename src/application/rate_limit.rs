//! Per-placement cooldown tracking.
//!
//! The auction server may tell the client to back off a placement for a
//! number of seconds. [`RateLimiter`] records those cooldowns against the
//! monotonic clock; it never blocks, and callers decide whether to honor it.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::id::PlacementId;

/// Longest cooldown applied, whatever the server asks for.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(86_400 * 365);

/// Cooldown state for one placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterState {
    /// Cooldown most recently set, in seconds.
    pub cooldown_secs: u64,
    /// Earliest instant a new request is allowed.
    pub next_allowed_at: Instant,
}

/// Concurrent map of placement cooldowns.
///
/// Unknown placements are never limited.
#[derive(Debug, Default)]
pub struct RateLimiter {
    limits: DashMap<PlacementId, RateLimiterState>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining cooldown for `placement`, zero when not limited.
    pub fn remaining(&self, placement: &PlacementId) -> Duration {
        self.limits
            .get(placement)
            .map(|state| state.next_allowed_at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Remaining cooldown in whole milliseconds, rounded up.
    pub fn remaining_ms(&self, placement: &PlacementId) -> u64 {
        let remaining = self.remaining(placement);
        let millis = remaining.as_millis() as u64;
        if remaining > Duration::from_millis(millis) {
            millis + 1
        } else {
            millis
        }
    }

    /// Cooldown seconds last set for `placement`, zero when never set.
    pub fn limit_secs(&self, placement: &PlacementId) -> u64 {
        self.limits
            .get(placement)
            .map(|state| state.cooldown_secs)
            .unwrap_or(0)
    }

    /// Block `placement` for `seconds` from now, replacing any previous cooldown.
    ///
    /// The wait is capped at [`MAX_COOLDOWN`]; `limit_secs` still reports
    /// the value the server sent.
    pub fn set_limit(&self, placement: &PlacementId, seconds: u64) {
        let wait = Duration::from_secs(seconds).min(MAX_COOLDOWN);
        let now = Instant::now();
        let next_allowed_at = now.checked_add(wait).unwrap_or(now);
        debug!(placement = %placement, seconds, "Rate limit updated");
        self.limits.insert(
            placement.clone(),
            RateLimiterState {
                cooldown_secs: seconds,
                next_allowed_at,
            },
        );
    }

    /// Snapshot of a placement's state.
    pub fn state(&self, placement: &PlacementId) -> Option<RateLimiterState> {
        self.limits.get(placement).map(|state| *state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(id: &str) -> PlacementId {
        PlacementId::from(id)
    }

    #[tokio::test(start_paused = true)]
    async fn set_limit_then_remaining_is_bounded() {
        let limiter = RateLimiter::new();
        limiter.set_limit(&placement("p1"), 30);

        let remaining = limiter.remaining_ms(&placement("p1"));
        assert!(remaining > 0);
        assert!(remaining <= 30_000);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_expires_with_clock() {
        let limiter = RateLimiter::new();
        limiter.set_limit(&placement("p1"), 30);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(limiter.remaining_ms(&placement("p1")) > 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(limiter.remaining_ms(&placement("p1")), 0);
        assert_eq!(limiter.limit_secs(&placement("p1")), 30);
    }

    #[test]
    fn unknown_placement_is_not_limited() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.remaining_ms(&placement("nope")), 0);
        assert_eq!(limiter.limit_secs(&placement("nope")), 0);
        assert!(limiter.state(&placement("nope")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn set_limit_overwrites_previous_value() {
        let limiter = RateLimiter::new();
        limiter.set_limit(&placement("p1"), 300);
        limiter.set_limit(&placement("p1"), 5);

        assert!(limiter.remaining_ms(&placement("p1")) <= 5_000);
        assert_eq!(limiter.limit_secs(&placement("p1")), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_cooldown_is_capped() {
        let limiter = RateLimiter::new();
        limiter.set_limit(&placement("p1"), u64::MAX);

        assert_eq!(limiter.remaining(&placement("p1")), MAX_COOLDOWN);
        assert_eq!(limiter.limit_secs(&placement("p1")), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn placements_are_independent() {
        let limiter = RateLimiter::new();
        limiter.set_limit(&placement("p1"), 30);
        assert_eq!(limiter.remaining_ms(&placement("p2")), 0);
    }
}
