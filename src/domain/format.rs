//! Ad formats and creative sizes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MediationError;

/// Smallest accepted adaptive banner height, in density-independent pixels.
pub const MIN_BANNER_HEIGHT: u32 = 50;

/// Largest accepted adaptive banner height, in density-independent pixels.
pub const MAX_BANNER_HEIGHT: u32 = 1800;

/// Placement format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdFormat {
    Banner,
    AdaptiveBanner,
    Interstitial,
    Rewarded,
    RewardedInterstitial,
}

impl AdFormat {
    /// Banner formats use the shorter banner load timeout.
    #[must_use]
    pub const fn is_banner(self) -> bool {
        matches!(self, Self::Banner | Self::AdaptiveBanner)
    }

    #[must_use]
    pub const fn is_fullscreen(self) -> bool {
        !self.is_banner()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Banner => "banner",
            Self::AdaptiveBanner => "adaptive_banner",
            Self::Interstitial => "interstitial",
            Self::Rewarded => "rewarded",
            Self::RewardedInterstitial => "rewarded_interstitial",
        }
    }
}

impl fmt::Display for AdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creative dimensions in density-independent pixels.
///
/// A height of zero on an adaptive banner request means the partner
/// chooses the height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdSize {
    pub width: u32,
    pub height: u32,
}

impl AdSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Standard 320x50 banner.
    pub const STANDARD: Self = Self::new(320, 50);
    /// 300x250 medium rectangle.
    pub const MEDIUM: Self = Self::new(300, 250);
    /// 728x90 leaderboard.
    pub const LEADERBOARD: Self = Self::new(728, 90);

    /// True if `self` exceeds `requested` on either axis.
    ///
    /// A zero on the requested axis leaves that axis unconstrained.
    #[must_use]
    pub const fn exceeds(&self, requested: &Self) -> bool {
        (requested.width != 0 && self.width > requested.width)
            || (requested.height != 0 && self.height > requested.height)
    }
}

impl fmt::Display for AdSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Check the format-specific constraints of a requested size.
///
/// Fullscreen formats ignore the size entirely. Banners need a positive
/// width, and adaptive banners a height inside
/// [`MIN_BANNER_HEIGHT`]..=[`MAX_BANNER_HEIGHT`] or exactly zero.
pub fn validate_size(format: AdFormat, size: Option<AdSize>) -> Result<(), MediationError> {
    if format.is_fullscreen() {
        return Ok(());
    }

    let Some(size) = size else {
        return Err(MediationError::InvalidRequest {
            reason: format!("{format} requests require a size"),
        });
    };

    if size.width == 0 {
        return Err(MediationError::InvalidRequest {
            reason: format!("{format} width must be greater than 0"),
        });
    }

    match format {
        AdFormat::AdaptiveBanner => {
            if size.height != 0
                && !(MIN_BANNER_HEIGHT..=MAX_BANNER_HEIGHT).contains(&size.height)
            {
                return Err(MediationError::InvalidRequest {
                    reason: format!(
                        "adaptive banner height {} outside {}..={} (or 0)",
                        size.height, MIN_BANNER_HEIGHT, MAX_BANNER_HEIGHT
                    ),
                });
            }
        }
        _ => {
            if size.height == 0 {
                return Err(MediationError::InvalidRequest {
                    reason: "fixed banner height must be greater than 0".to_string(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn fullscreen_ignores_size() {
        assert!(validate_size(AdFormat::Interstitial, None).is_ok());
        assert!(validate_size(AdFormat::Rewarded, Some(AdSize::new(0, 0))).is_ok());
    }

    #[test]
    fn adaptive_banner_accepts_zero_height() {
        assert!(validate_size(AdFormat::AdaptiveBanner, Some(AdSize::new(320, 0))).is_ok());
    }

    #[test]
    fn adaptive_banner_rejects_out_of_range_height() {
        let err = validate_size(AdFormat::AdaptiveBanner, Some(AdSize::new(320, 20))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(validate_size(AdFormat::AdaptiveBanner, Some(AdSize::new(320, 5000))).is_err());
    }

    #[test]
    fn adaptive_banner_accepts_range_bounds() {
        for height in [MIN_BANNER_HEIGHT, MAX_BANNER_HEIGHT] {
            assert!(validate_size(AdFormat::AdaptiveBanner, Some(AdSize::new(320, height))).is_ok());
        }
    }

    #[test]
    fn banner_requires_size() {
        assert!(validate_size(AdFormat::Banner, None).is_err());
        assert!(validate_size(AdFormat::Banner, Some(AdSize::new(0, 50))).is_err());
        assert!(validate_size(AdFormat::Banner, Some(AdSize::STANDARD)).is_ok());
    }

    #[test]
    fn exceeds_checks_each_axis() {
        let requested = AdSize::new(320, 50);
        assert!(AdSize::new(400, 50).exceeds(&requested));
        assert!(AdSize::new(320, 51).exceeds(&requested));
        assert!(!AdSize::new(320, 50).exceeds(&requested));
        assert!(!AdSize::new(300, 250).exceeds(&AdSize::new(320, 0)));
    }
}
