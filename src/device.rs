//! Device-tier classification from the client's declared identity.
//!
//! # Responsibilities
//! - Derive a tier from the User-Agent string (pattern match, deterministic)
//! - Select the outbound fetch timeout per tier
//! - Select the static-asset cache freshness window per tier
//! - Select which behavior-script variant the transform injects
//!
//! # Design Decisions
//! - Unmatched signatures default to Desktop
//! - Android gets the longest timeout to tolerate slower mobile networks
//! - Not persisted; recomputed per request

use std::time::Duration;

use axum::http::{header, HeaderMap};
use tower_http::CompressionLevel;

use crate::config::TimeoutConfig;

/// Client device tier, derived per-request from the User-Agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTier {
    Android,
    MobileOther,
    Desktop,
}

impl DeviceTier {
    /// Classify a User-Agent string.
    pub fn from_user_agent(ua: &str) -> Self {
        if ua.contains("Android") {
            DeviceTier::Android
        } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("Mobile") {
            DeviceTier::MobileOther
        } else {
            DeviceTier::Desktop
        }
    }

    /// Classify from request headers. Missing User-Agent means Desktop.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(Self::from_user_agent)
            .unwrap_or(DeviceTier::Desktop)
    }

    /// Outbound call timeout for this tier.
    pub fn fetch_timeout(&self, timeouts: &TimeoutConfig) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs(timeouts))
    }

    /// Timeout in whole seconds, for error reporting.
    pub fn fetch_timeout_secs(&self, timeouts: &TimeoutConfig) -> u64 {
        match self {
            DeviceTier::Android => timeouts.android_secs,
            DeviceTier::MobileOther => timeouts.mobile_secs,
            DeviceTier::Desktop => timeouts.desktop_secs,
        }
    }

    /// Maximum age a cached static asset may have to be served to this tier.
    /// The category TTL is the Android window; faster devices demand fresher
    /// copies, so the window shrinks. Never exceeds the category TTL.
    pub fn static_max_age(&self, category_ttl: Duration) -> Duration {
        match self {
            DeviceTier::Android => category_ttl,
            DeviceTier::MobileOther => category_ttl / 2,
            DeviceTier::Desktop => category_ttl / 4,
        }
    }

    /// Whether the transform pipeline injects the reduced script variant.
    pub fn reduced_scripts(&self) -> bool {
        matches!(self, DeviceTier::Android)
    }

    /// Response compression quality toward this client. Slower radio links
    /// get the smallest payloads; desktop links get the cheapest encode.
    pub fn compression_level(&self) -> CompressionLevel {
        match self {
            DeviceTier::Android => CompressionLevel::Best,
            DeviceTier::MobileOther => CompressionLevel::Default,
            DeviceTier::Desktop => CompressionLevel::Fastest,
        }
    }

    /// Label for logging and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceTier::Android => "android",
            DeviceTier::MobileOther => "mobile_other",
            DeviceTier::Desktop => "desktop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_android_signature() {
        let ua = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36";
        assert_eq!(DeviceTier::from_user_agent(ua), DeviceTier::Android);
    }

    #[test]
    fn test_iphone_is_mobile_other() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)";
        assert_eq!(DeviceTier::from_user_agent(ua), DeviceTier::MobileOther);
    }

    #[test]
    fn test_unmatched_defaults_to_desktop() {
        assert_eq!(DeviceTier::from_user_agent("curl/8.4.0"), DeviceTier::Desktop);
        assert_eq!(DeviceTier::from_headers(&HeaderMap::new()), DeviceTier::Desktop);
    }

    #[test]
    fn test_tier_timeouts() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(
            DeviceTier::Android.fetch_timeout(&timeouts),
            Duration::from_secs(60)
        );
        assert!(
            DeviceTier::Desktop.fetch_timeout(&timeouts)
                < DeviceTier::MobileOther.fetch_timeout(&timeouts)
        );
    }

    #[test]
    fn test_compression_level_per_tier() {
        assert_eq!(
            DeviceTier::Android.compression_level(),
            CompressionLevel::Best
        );
        assert_eq!(
            DeviceTier::MobileOther.compression_level(),
            CompressionLevel::Default
        );
        assert_eq!(
            DeviceTier::Desktop.compression_level(),
            CompressionLevel::Fastest
        );
    }

    #[test]
    fn test_static_max_age_never_exceeds_ttl() {
        let ttl = Duration::from_secs(600);
        for tier in [DeviceTier::Android, DeviceTier::MobileOther, DeviceTier::Desktop] {
            assert!(tier.static_max_age(ttl) <= ttl);
        }
    }
}
