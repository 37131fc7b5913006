//! Engine configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates every engine setting.
//! Every section is optional; an empty file yields the defaults.
//!
//! # Example
//!
//! ```no_run
//! use waterfall::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("mediation.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::engine::{PrefetchSettings, RateLimitSettings, WaterfallSettings};
use super::logging::LoggingConfig;
use super::partners::PartnerSettings;
use super::timeouts::TimeoutConfig;
use crate::application::auction::AuctionConfig;
use crate::application::mediator::MediatorSettings;
use crate::application::prefetch::PrefetchConfig;
use crate::application::waterfall::WaterfallConfig;
use crate::domain::id::PartnerId;
use crate::error::{ConfigError, Result};
use crate::port::outbound::partner::PartnerConfig;

/// Main engine configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Partner and auction deadlines.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub waterfall: WaterfallSettings,

    #[serde(default)]
    pub prefetch: PrefetchSettings,

    /// Partners to initialize, in configuration order.
    #[serde(default)]
    pub partners: Vec<PartnerSettings>,
}

impl Config {
    /// Parse and validate configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration values.
    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        if let Some(field) = self.timeouts.first_zero() {
            return Err(ConfigError::InvalidValue {
                field,
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.prefetch.server_max_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server_max_capacity",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.prefetch.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ttl_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for partner in &self.partners {
            if partner.id.trim().is_empty() {
                return Err(ConfigError::MissingField { field: "partners.id" }.into());
            }
            if !seen.insert(partner.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "partners.id",
                    reason: format!("duplicate partner '{}'", partner.id),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self) -> bool {
        self.logging.init()
    }

    pub fn auction_config(&self) -> AuctionConfig {
        AuctionConfig {
            enforce_rate_limit: self.rate_limit.enforce,
            prebid_timeout: self.timeouts.prebid(),
            invalidate_timeout: self.timeouts.invalidate(),
        }
    }

    pub fn waterfall_config(&self) -> WaterfallConfig {
        WaterfallConfig {
            banner_load_timeout: self.timeouts.banner_load(),
            fullscreen_load_timeout: self.timeouts.fullscreen_load(),
            invalidate_timeout: self.timeouts.invalidate(),
            reject_oversized_banners: self.waterfall.reject_oversized_banners,
        }
    }

    /// Prefetch sizing; `capacity` is clamped when queues are built.
    pub fn prefetch_config(&self) -> PrefetchConfig {
        PrefetchConfig {
            capacity: self.prefetch.capacity,
            server_max_capacity: self.prefetch.server_max_capacity,
            ttl: Duration::from_secs(self.prefetch.ttl_secs),
        }
    }

    pub fn mediator_settings(&self) -> MediatorSettings {
        MediatorSettings {
            auction: self.auction_config(),
            waterfall: self.waterfall_config(),
            prefetch: self.prefetch_config(),
            show_timeout: self.timeouts.show(),
            init_partner_timeout: self.timeouts.init_partner(),
            init_overall_timeout: self.timeouts.init_overall(),
        }
    }

    /// Set-up payloads of every configured partner, skipped ones included.
    pub fn partner_configs(&self) -> Vec<PartnerConfig> {
        self.partners
            .iter()
            .map(PartnerSettings::to_partner_config)
            .collect()
    }

    pub fn skipped_partners(&self) -> HashSet<PartnerId> {
        self.partners
            .iter()
            .filter(|partner| partner.skip)
            .map(PartnerSettings::partner_id)
            .collect()
    }
}
