//! Configuration subsystem.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CacheCategoryConfig, CacheConfig, CaptureConfig, CurrencyConfig, ListenerConfig,
    ObservabilityConfig, ProxyConfig, SpaConfig, TimeoutConfig, UpstreamsConfig,
};
