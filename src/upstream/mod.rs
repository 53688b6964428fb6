//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! inbound path
//!     → resolver.rs (which origin, which outbound path)
//!     → fetcher.rs (headers sanitized, no auto redirects, tier timeout)
//!     → decoder.rs (gzip/deflate/br reversed before any transform)
//! ```

pub mod decoder;
pub mod fetcher;
pub mod resolver;

pub use fetcher::{FetchBody, UpstreamFetcher, UpstreamResponse};
pub use resolver::ResolvedTarget;
