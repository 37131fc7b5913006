//! Deadlines for partner and auction calls.

use std::time::Duration;

use serde::Deserialize;

/// Per-operation deadlines, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimeoutConfig {
    /// Bidder token fetch, per partner.
    #[serde(default = "default_prebid_ms")]
    pub prebid_ms: u64,
    #[serde(default = "default_banner_load_ms")]
    pub banner_load_ms: u64,
    #[serde(default = "default_fullscreen_load_ms")]
    pub fullscreen_load_ms: u64,
    #[serde(default = "default_show_ms")]
    pub show_ms: u64,
    #[serde(default = "default_invalidate_ms")]
    pub invalidate_ms: u64,
    /// One partner's set-up call.
    #[serde(default = "default_init_partner_ms")]
    pub init_partner_ms: u64,
    /// When the initialization report fires, finished or not.
    #[serde(default = "default_init_overall_ms")]
    pub init_overall_ms: u64,
}

const fn default_prebid_ms() -> u64 {
    5_000
}

const fn default_banner_load_ms() -> u64 {
    15_000
}

const fn default_fullscreen_load_ms() -> u64 {
    30_000
}

const fn default_show_ms() -> u64 {
    5_000
}

const fn default_invalidate_ms() -> u64 {
    5_000
}

const fn default_init_partner_ms() -> u64 {
    30_000
}

const fn default_init_overall_ms() -> u64 {
    10_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            prebid_ms: default_prebid_ms(),
            banner_load_ms: default_banner_load_ms(),
            fullscreen_load_ms: default_fullscreen_load_ms(),
            show_ms: default_show_ms(),
            invalidate_ms: default_invalidate_ms(),
            init_partner_ms: default_init_partner_ms(),
            init_overall_ms: default_init_overall_ms(),
        }
    }
}

impl TimeoutConfig {
    pub const fn prebid(&self) -> Duration {
        Duration::from_millis(self.prebid_ms)
    }

    pub const fn banner_load(&self) -> Duration {
        Duration::from_millis(self.banner_load_ms)
    }

    pub const fn fullscreen_load(&self) -> Duration {
        Duration::from_millis(self.fullscreen_load_ms)
    }

    pub const fn show(&self) -> Duration {
        Duration::from_millis(self.show_ms)
    }

    pub const fn invalidate(&self) -> Duration {
        Duration::from_millis(self.invalidate_ms)
    }

    pub const fn init_partner(&self) -> Duration {
        Duration::from_millis(self.init_partner_ms)
    }

    pub const fn init_overall(&self) -> Duration {
        Duration::from_millis(self.init_overall_ms)
    }

    /// Name of the first zero deadline, if any.
    pub(super) fn first_zero(&self) -> Option<&'static str> {
        [
            ("prebid_ms", self.prebid_ms),
            ("banner_load_ms", self.banner_load_ms),
            ("fullscreen_load_ms", self.fullscreen_load_ms),
            ("show_ms", self.show_ms),
            ("invalidate_ms", self.invalidate_ms),
            ("init_partner_ms", self.init_partner_ms),
            ("init_overall_ms", self.init_overall_ms),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0)
        .map(|(field, _)| field)
    }
}
