//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! every section carries production defaults so the binary runs without one.

use serde::{Deserialize, Serialize};

/// Root configuration for the transforming proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, cookie base path).
    pub listener: ListenerConfig,

    /// Upstream origins the proxy fronts.
    pub upstreams: UpstreamsConfig,

    /// Outbound timeout configuration, per device tier.
    pub timeouts: TimeoutConfig,

    /// Response cache tuning, per category.
    pub cache: CacheConfig,

    /// Captured-text refresh behavior.
    pub capture: CaptureConfig,

    /// Currency conversion applied during HTML transforms.
    pub currency: CurrencyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Bundled single-page application entry point.
    pub spa: SpaConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Base path written into rewritten `Set-Cookie: Path=` attributes.
    pub cookie_base_path: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            cookie_base_path: "/".to_string(),
        }
    }
}

/// Upstream origins. Origins are absolute URLs without a trailing slash.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamsConfig {
    /// Main web application origin.
    pub main_origin: String,

    /// Secondary service origin, mounted under `secondary_prefix`.
    pub secondary_origin: String,

    /// Inbound path prefix routed to the secondary origin.
    pub secondary_prefix: String,

    /// REST API origin behind `/api-proxy`.
    pub api_origin: String,

    /// Media host behind `/media-proxy`, `/quiz/*.svg` and `/_next/*`.
    pub media_origin: String,

    /// Palmistry media host behind `/palmistry-proxy`.
    pub palmistry_origin: String,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            main_origin: "https://witchpower.online".to_string(),
            secondary_origin: "https://reading.witchpower.online".to_string(),
            secondary_prefix: "/reading".to_string(),
            api_origin: "https://api.witchpower.online".to_string(),
            media_origin: "https://media.witchpower.online".to_string(),
            palmistry_origin: "https://palmistry.witchpower.online".to_string(),
        }
    }
}

/// Outbound timeout configuration. Baseline 15-30s; Android stretches to 60s
/// to tolerate slower mobile networks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Timeout for Desktop-tier clients in seconds.
    pub desktop_secs: u64,

    /// Timeout for non-Android mobile clients in seconds.
    pub mobile_secs: u64,

    /// Timeout for Android-tier clients in seconds.
    pub android_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            desktop_secs: 15,
            mobile_secs: 30,
            android_secs: 60,
            connect_secs: 5,
        }
    }
}

/// Per-category cache tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Interval of the background expiry sweep in seconds.
    pub sweep_interval_secs: u64,

    /// Static assets (css/js/fonts/images served through the main pipeline).
    pub static_assets: CacheCategoryConfig,

    /// GET responses relayed through `/api-proxy`.
    pub api: CacheCategoryConfig,

    /// Non-funnel HTML pages.
    pub html: CacheCategoryConfig,

    /// Images relayed from the media hosts.
    pub image: CacheCategoryConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            static_assets: CacheCategoryConfig { ttl_ms: 600_000, capacity: 500 },
            api: CacheCategoryConfig { ttl_ms: 60_000, capacity: 200 },
            html: CacheCategoryConfig { ttl_ms: 300_000, capacity: 50 },
            image: CacheCategoryConfig { ttl_ms: 1_800_000, capacity: 300 },
        }
    }
}

/// TTL and capacity pair for one cache category.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CacheCategoryConfig {
    /// Entry time-to-live in milliseconds.
    pub ttl_ms: u64,

    /// Maximum number of entries; oldest are evicted past this.
    pub capacity: usize,
}

/// Captured-text refresh behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Value served until a real capture succeeds. Never empty.
    pub fallback_text: String,

    /// Upstream path fetched when a direct refresh is needed.
    pub source_path: String,

    /// Age beyond which the captured text is considered stale, in seconds.
    pub staleness_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fallback_text: "atrair amor e prosperidade".to_string(),
            source_path: "/pt/witch-power/wpGoal".to_string(),
            staleness_secs: 600,
        }
    }
}

/// Currency conversion applied to `$<number>` literals in HTML.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CurrencyConfig {
    /// Fixed USD to BRL conversion rate.
    pub rate: f64,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self { rate: 5.59 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Bundled single-page application entry point, served for the two funnel
/// routes that bypass the transform pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpaConfig {
    /// Path to the SPA index document on disk.
    pub index_path: String,
}

impl Default for SpaConfig {
    fn default() -> Self {
        Self {
            index_path: "public/index.html".to_string(),
        }
    }
}
