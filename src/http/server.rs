//! HTTP server assembly and the transforming fallthrough pipeline.
//!
//! # Responsibilities
//! - Build the router: API routes, SPA entries, fixed relays, and a fallback
//!   that runs the full transform pipeline
//! - Own the shared state (config, fetcher, caches, captured text, stats)
//! - Serve with graceful shutdown on SIGINT
//!
//! # Data Flow (fallback pipeline)
//! ```text
//! inbound request
//!     → device tier classification
//!     → cache lookup (static assets, transformed html)
//!     → upstream resolution + fetch
//!     → content decoding
//!     → redirect interception (short-circuits)
//!     → header scrub
//!     → HTML transform (html bodies only)
//!     → cache write
//! ```

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Router;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::cache::{CacheCategory, CacheEntry, ResponseCache};
use crate::capture::CapturedText;
use crate::config::ProxyConfig;
use crate::device::DeviceTier;
use crate::error::ProxyError;
use crate::http::compress;
use crate::http::handlers::{self, header_str, path_and_query, upstream_failure};
use crate::http::headers;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::observability::{metrics, ProxyStats};
use crate::transform::{self, redirect};
use crate::upstream::{decoder, resolver, FetchBody, UpstreamFetcher};

/// Inbound bodies beyond this size are rejected rather than buffered
/// unbounded.
pub const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub fetcher: Arc<UpstreamFetcher>,
    pub caches: Arc<ResponseCache>,
    pub captured: Arc<CapturedText>,
    pub stats: Arc<ProxyStats>,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let fetcher = UpstreamFetcher::new(config.timeouts.clone())?;
        let caches = ResponseCache::new(config.cache.clone());
        let captured = CapturedText::new(&config.capture);
        Ok(Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            caches: Arc::new(caches),
            captured: Arc::new(captured),
            stats: Arc::new(ProxyStats::new()),
        })
    }
}

/// The proxy server. Construct, then `run` on a bound listener.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            state: AppState::new(config)?,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self, listener: TcpListener) -> std::io::Result<()> {
        self.state.caches.spawn_sweeper();
        let router = build_router(self.state);
        tracing::info!(address = ?listener.local_addr(), "proxy listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
    }
}

/// Assemble the full route table. Everything not matched by a dedicated
/// route falls through to the transforming pipeline.
pub fn build_router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static(X_REQUEST_ID);
    // Hard ceiling above the slowest device-tier upstream timeout
    let request_deadline =
        std::time::Duration::from_secs(state.config.timeouts.android_secs + 5);
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/captured-text", get(handlers::captured_text))
        .route("/api/set-selected-choice", post(handlers::set_selected_choice))
        .route("/pt/witch-power/trialChoice", get(handlers::spa_entry))
        .route("/pt/witch-power/date", get(handlers::spa_entry))
        .route("/pt/witch-power/email", get(handlers::email_redirect))
        .route("/quiz/{name}", get(handlers::quiz_asset))
        .route("/_next/image", get(handlers::next_asset))
        .route("/_next/static/{*rest}", get(handlers::next_asset))
        .route("/media-proxy/{*rest}", get(handlers::media_relay))
        .route("/palmistry-proxy/{*rest}", get(handlers::palmistry_relay))
        .route("/api-proxy/{*rest}", any(handlers::api_relay))
        .fallback(proxy_handler)
        .layer(compress::TierCompressionLayer)
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(TimeoutLayer::new(request_deadline))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request accounting applied to every route.
async fn track_requests(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let tier = DeviceTier::from_headers(req.headers());
    state.stats.record_request();

    let response = next.run(req).await;

    metrics::record_request(&method, response.status().as_u16(), tier.as_str(), start);
    response
}

/// The transforming fallthrough: everything the route table does not claim.
pub(crate) async fn proxy_handler(State(state): State<AppState>, req: Request<Body>) -> Response {
    let tier = DeviceTier::from_headers(req.headers());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let pq = path_and_query(&req);
    let cacheable = method == Method::GET;
    let is_asset = resolver::is_asset_path(&path);
    let is_funnel = resolver::is_funnel_route(&path);
    let html_key = format!("{}|{}", tier.as_str(), path);

    if cacheable && is_asset {
        let window = tier.static_max_age(state.caches.ttl(CacheCategory::Static));
        if let Some(entry) = state
            .caches
            .get_with_max_age(CacheCategory::Static, &path, window)
        {
            state.stats.record_cache_hit();
            metrics::record_cache_hit("static");
            return relay_response(entry.status, entry.headers, entry.body);
        }
    }
    if cacheable && !is_asset && !is_funnel {
        if let Some(entry) = state.caches.get(CacheCategory::Html, &html_key) {
            state.stats.record_cache_hit();
            metrics::record_cache_hit("html");
            return relay_response(entry.status, entry.headers, entry.body);
        }
    }

    let target = resolver::resolve(&pq, &state.config.upstreams);
    let (parts, body) = req.into_parts();
    let fetch_body = match read_fetch_body(&parts.headers, body).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let url = format!("{}{}", target.origin, target.outbound_path);
    tracing::debug!(%url, tier = tier.as_str(), "forwarding to upstream");

    let upstream = match state
        .fetcher
        .fetch(method.clone(), url, &parts.headers, fetch_body, tier)
        .await
    {
        Ok(response) => response,
        Err(err) => return upstream_failure(&state, err),
    };

    let encoding = header_str(&upstream.headers, header::CONTENT_ENCODING);
    let body = match decoder::decode_body(encoding.as_deref(), upstream.body) {
        Ok(body) => body,
        Err(err) => return upstream_failure(&state, err),
    };

    if upstream.status.is_redirection() {
        if let Some(location) = upstream
            .headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
        {
            let outcome =
                redirect::intercept(upstream.status, location, &target.origin, &state.config.upstreams);
            tracing::info!(
                from = location,
                to = %outcome.location,
                status = outcome.status.as_u16(),
                "redirect intercepted"
            );
            return redirect_response(
                &outcome,
                &upstream.headers,
                &state.config.listener.cookie_base_path,
            );
        }
        // 3xx without a location header passes through as-is
    }

    let headers = headers::scrub_response_headers(
        &upstream.headers,
        &state.config.listener.cookie_base_path,
    );
    let is_html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("text/html"))
        .unwrap_or(false);

    let body = if is_html {
        let html = String::from_utf8_lossy(&body).into_owned();
        Bytes::from(transform::apply_pipeline(&html, tier, &state.config, &state.captured))
    } else {
        body
    };

    if cacheable && upstream.status == StatusCode::OK {
        let entry = CacheEntry {
            status: upstream.status,
            headers: headers.clone(),
            body: body.clone(),
        };
        if is_asset && !is_html {
            state.caches.put(CacheCategory::Static, path, entry);
        } else if is_html && !is_funnel {
            // Keyed per tier; the transformed markup differs by tier
            state.caches.put(CacheCategory::Html, html_key, entry);
        }
    }

    relay_response(upstream.status, headers, body)
}

/// Read the inbound body, unpacking a "photo" multipart upload when present.
async fn read_fetch_body(
    headers: &HeaderMap,
    body: Body,
) -> Result<FetchBody, Response> {
    let is_multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false);

    if is_multipart {
        return read_photo_upload(headers, body).await;
    }

    // A body past the limit (or a failed read) must reject the request;
    // forwarding it truncated would corrupt it
    let bytes = match to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "inbound request body rejected");
            return Err(ProxyError::InvalidClientInput(
                "request body too large or unreadable".to_string(),
            )
            .into_response());
        }
    };
    if bytes.is_empty() {
        Ok(FetchBody::Empty)
    } else {
        Ok(FetchBody::Raw(bytes))
    }
}

async fn read_photo_upload(headers: &HeaderMap, body: Body) -> Result<FetchBody, Response> {
    use axum::extract::multipart::Multipart;
    use axum::extract::FromRequest;

    let mut builder = Request::builder().method(Method::POST).uri("/");
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    let req = match builder.body(body) {
        Ok(req) => req,
        Err(_) => {
            return Err(ProxyError::InvalidClientInput(
                "malformed multipart request".to_string(),
            )
            .into_response())
        }
    };

    let mut multipart = match Multipart::from_request(req, &()).await {
        Ok(m) => m,
        Err(_) => {
            return Err(ProxyError::InvalidClientInput(
                "malformed multipart request".to_string(),
            )
            .into_response())
        }
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("photo") {
            continue;
        }
        let filename = field.file_name().unwrap_or("photo").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        match field.bytes().await {
            Ok(data) => {
                return Ok(FetchBody::Photo {
                    filename,
                    content_type,
                    data,
                })
            }
            Err(_) => {
                return Err(ProxyError::InvalidClientInput(
                    "unreadable photo field".to_string(),
                )
                .into_response())
            }
        }
    }

    // Multipart without a photo field forwards as an empty body
    Ok(FetchBody::Empty)
}

/// Build the client-facing redirect. The upstream's headers still go through
/// the scrub and cookie rewrite; only `Location` is replaced. Funnel 302s are
/// where session cookies get set, so dropping them breaks the flow.
fn redirect_response(
    outcome: &redirect::RedirectOutcome,
    upstream_headers: &HeaderMap,
    cookie_base_path: &str,
) -> Response {
    let mut headers = headers::scrub_response_headers(upstream_headers, cookie_base_path);
    headers.remove(header::LOCATION);
    match HeaderValue::from_str(&outcome.location) {
        Ok(value) => {
            headers.insert(header::LOCATION, value);
            relay_response(outcome.status, headers, Bytes::new())
        }
        Err(_) => relay_response(StatusCode::BAD_GATEWAY, HeaderMap::new(), Bytes::new()),
    }
}

/// Build a client response from status, scrubbed headers and a final body.
pub fn relay_response(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_construction_from_defaults() {
        let state = AppState::new(ProxyConfig::default()).unwrap();
        assert!(state.captured.is_fallback());
        assert!(state.caches.is_empty(CacheCategory::Static));
    }

    #[test]
    fn test_relay_response_carries_everything() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/css"));
        let response = relay_response(
            StatusCode::OK,
            headers,
            Bytes::from_static(b"body{}"),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-type").unwrap(), "text/css");
    }
}
