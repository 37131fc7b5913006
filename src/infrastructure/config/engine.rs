//! Rate limit, waterfall and prefetch sections.

use serde::Deserialize;

/// Server cooldown handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitSettings {
    /// Refuse auctions during a cooldown. Cooldowns are tracked either way.
    #[serde(default = "default_true")]
    pub enforce: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self { enforce: true }
    }
}

/// Waterfall policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WaterfallSettings {
    /// Treat adaptive banners larger than requested as failed loads.
    #[serde(default = "default_true")]
    pub reject_oversized_banners: bool,
}

impl Default for WaterfallSettings {
    fn default() -> Self {
        Self {
            reject_oversized_banners: true,
        }
    }
}

/// Prefetch queue sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PrefetchSettings {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_server_max_capacity")]
    pub server_max_capacity: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            server_max_capacity: default_server_max_capacity(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_capacity() -> usize {
    1
}

const fn default_server_max_capacity() -> usize {
    3
}

const fn default_ttl_secs() -> u64 {
    3600
}
