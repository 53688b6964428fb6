//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured key-value logs)
//!     → metrics.rs (counters, histograms, optional Prometheus scrape)
//!     → stats.rs (process-local counters served by /health)
//! ```

pub mod metrics;
pub mod stats;

pub use stats::{memory_report, MemoryReport, ProxyStats};
