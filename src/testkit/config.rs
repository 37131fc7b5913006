//! Canonical test configurations.
//!
//! Single source of truth for engine settings used across tests, with
//! deadlines short enough for paused-clock tests to stay readable.

use std::time::Duration;

use crate::application::auction::AuctionConfig;
use crate::application::mediator::MediatorSettings;
use crate::application::prefetch::PrefetchConfig;
use crate::application::waterfall::WaterfallConfig;

/// Prebid deadline used by [`auction`].
pub const PREBID_TIMEOUT: Duration = Duration::from_secs(1);

/// Load deadline used by [`waterfall`] for every format.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(2);

/// Invalidate deadline shared by [`auction`] and [`waterfall`].
pub const INVALIDATE_TIMEOUT: Duration = Duration::from_secs(1);

pub fn auction() -> AuctionConfig {
    AuctionConfig {
        enforce_rate_limit: true,
        prebid_timeout: PREBID_TIMEOUT,
        invalidate_timeout: INVALIDATE_TIMEOUT,
    }
}

/// Waterfall with oversized-banner rejection switched as asked.
pub fn waterfall(reject_oversized_banners: bool) -> WaterfallConfig {
    WaterfallConfig {
        banner_load_timeout: LOAD_TIMEOUT,
        fullscreen_load_timeout: LOAD_TIMEOUT,
        invalidate_timeout: INVALIDATE_TIMEOUT,
        reject_oversized_banners,
    }
}

pub fn prefetch(capacity: usize) -> PrefetchConfig {
    PrefetchConfig {
        capacity,
        server_max_capacity: 5,
        ttl: Duration::from_secs(60),
    }
}

pub fn mediator() -> MediatorSettings {
    MediatorSettings {
        auction: auction(),
        waterfall: waterfall(true),
        prefetch: prefetch(1),
        show_timeout: Duration::from_secs(1),
        init_partner_timeout: Duration::from_secs(2),
        init_overall_timeout: Duration::from_secs(5),
    }
}
