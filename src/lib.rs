//! Transforming reverse proxy for the witch-power quiz funnel.
//!
//! Fronts several upstream origins behind one local listener, decodes and
//! rewrites HTML on the way through (URL rewriting, script and pixel
//! injection, USD to BRL conversion), intercepts funnel redirects, caches
//! responses per category and tracks the visitor's captured quiz choice.

pub mod cache;
pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod observability;
pub mod transform;
pub mod upstream;

pub use config::{load_config, ProxyConfig};
pub use error::{ProxyError, ProxyResult};
pub use http::{AppState, HttpServer};
