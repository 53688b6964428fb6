//! Inbound HTTP surface.
//!
//! # Structure
//! - `server.rs`: router assembly, shared state, the fallthrough pipeline
//! - `handlers.rs`: API, SPA and fixed relay handlers
//! - `headers.rs`: response header scrubbing and cookie rewriting
//! - `request.rs`: per-request ID generation
//! - `compress.rs`: device-tier response compression

pub mod compress;
pub mod handlers;
pub mod headers;
pub mod request;
pub mod server;

pub use server::{build_router, AppState, HttpServer};
