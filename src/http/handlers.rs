//! Inbound API, SPA and relay handlers.
//!
//! # Responsibilities
//! - /health and the captured-text API surface
//! - The two SPA entry routes that bypass the transform pipeline
//! - Fixed fetch-and-relay routes for media, palmistry and Next.js assets
//! - /api-proxy relay with api-category caching
//!
//! The fallthrough transforming pipeline itself lives in `server.rs`.

use axum::body::{to_bytes, Body};
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::{self, CacheCategory, CacheEntry};
use crate::capture;
use crate::device::DeviceTier;
use crate::error::ProxyError;
use crate::http::headers;
use crate::http::server::{proxy_handler, relay_response, AppState, MAX_REQUEST_BODY_BYTES};
use crate::observability::{self, metrics};
use crate::upstream::{decoder, resolver, FetchBody};

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let memory = observability::memory_report();
    Json(json!({
        "status": "ok",
        "uptimeMinutes": state.stats.uptime_minutes(),
        "requestCount": state.stats.request_count(),
        "errorCount": state.stats.error_count(),
        "cacheHits": state.stats.cache_hit_count(),
        "memory": {
            "rssBytes": memory.rss_bytes,
            "virtualBytes": memory.virtual_bytes,
        },
        "cache": {
            "static": state.caches.len(CacheCategory::Static),
            "api": state.caches.len(CacheCategory::Api),
            "html": state.caches.len(CacheCategory::Html),
            "image": state.caches.len(CacheCategory::Image),
        },
    }))
}

/// `GET /api/captured-text`
///
/// Refreshes synchronously first when the current value is the fallback or
/// stale and no capture is in flight; losers of that race answer immediately
/// with whatever is current.
pub async fn captured_text(State(state): State<AppState>) -> Response {
    if state.captured.needs_refresh() && state.captured.try_begin_capture() {
        metrics::record_capture_event("refresh_started");
        let result = refresh_from_upstream(&state).await;
        metrics::record_capture_event(if result.is_some() {
            "refresh_succeeded"
        } else {
            "refresh_failed"
        });
        state.captured.finish_capture(result);
    }

    let snapshot = state.captured.snapshot();
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let mut response = Json(json!({
        "capturedText": snapshot.text,
        "lastCaptureTime": snapshot.last_capture_ms,
        "isCapturing": snapshot.capturing,
        "timestamp": now_ms,
    }))
    .into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    response
}

/// Fetch the capture source page and run the extraction strategies.
async fn refresh_from_upstream(state: &AppState) -> Option<String> {
    let url = format!(
        "{}{}",
        state.config.upstreams.main_origin, state.config.capture.source_path
    );
    let upstream = match state.fetcher.fetch_relay(url, DeviceTier::Desktop).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "capture refresh fetch failed");
            metrics::record_upstream_error(error_kind(&err));
            return None;
        }
    };
    let encoding = header_str(&upstream.headers, header::CONTENT_ENCODING);
    match decoder::decode_body(encoding.as_deref(), upstream.body) {
        Ok(body) => capture::extract_choice(&String::from_utf8_lossy(&body)),
        Err(err) => {
            tracing::warn!(error = %err, "capture refresh body undecodable");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SelectedChoice {
    #[serde(rename = "selectedText")]
    selected_text: Option<String>,
}

/// `POST /api/set-selected-choice`
///
/// An explicit client report always wins, regardless of any in-flight
/// capture.
pub async fn set_selected_choice(
    State(state): State<AppState>,
    Json(payload): Json<SelectedChoice>,
) -> Response {
    let text = payload
        .selected_text
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        return ProxyError::InvalidClientInput(
            "selectedText must be a non-empty string".to_string(),
        )
        .into_response();
    }

    state.captured.set_reported(text.clone());
    metrics::record_capture_event("client_report");
    Json(json!({
        "message": "selection recorded",
        "capturedText": text,
    }))
    .into_response()
}

/// `GET /pt/witch-power/trialChoice` and `GET /pt/witch-power/date`: serve
/// the bundled SPA entry point, bypassing the transform pipeline entirely.
pub async fn spa_entry(State(state): State<AppState>) -> Response {
    match tokio::fs::read(&state.config.spa.index_path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(
                path = %state.config.spa.index_path,
                error = %err,
                "SPA entry point unreadable"
            );
            state.stats.record_error();
            (StatusCode::INTERNAL_SERVER_ERROR, "SPA entry point unavailable").into_response()
        }
    }
}

/// `GET /pt/witch-power/email`: steered straight into onboarding.
pub async fn email_redirect() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    response.headers_mut().insert(
        header::LOCATION,
        HeaderValue::from_static("/pt/witch-power/onboarding"),
    );
    response
}

/// `GET /quiz/{name}.svg`: quiz artwork from the media host. Anything that
/// is not an `.svg` name falls through to the transforming pipeline.
pub async fn quiz_asset(
    State(state): State<AppState>,
    Path(name): Path<String>,
    req: Request<Body>,
) -> Response {
    if !name.ends_with(".svg") {
        return proxy_handler(State(state), req).await;
    }
    let tier = DeviceTier::from_headers(req.headers());
    let path = format!("/quiz/{name}");
    let url = format!("{}{}", state.config.upstreams.media_origin, path);
    relay(&state, tier, url, path.clone(), Some((CacheCategory::Image, path))).await
}

/// `GET /_next/image` and `GET /_next/static/*`: Next.js asset relay.
pub async fn next_asset(State(state): State<AppState>, req: Request<Body>) -> Response {
    let tier = DeviceTier::from_headers(req.headers());
    let pq = path_and_query(&req);
    let url = format!("{}{}", state.config.upstreams.main_origin, pq);
    let category = if pq.starts_with("/_next/image") {
        CacheCategory::Image
    } else {
        CacheCategory::Static
    };
    relay(&state, tier, url, pq.clone(), Some((category, pq))).await
}

/// `GET /media-proxy/*`
pub async fn media_relay(State(state): State<AppState>, req: Request<Body>) -> Response {
    let tier = DeviceTier::from_headers(req.headers());
    let pq = path_and_query(&req);
    let rest = strip_prefix_rooted(&pq, "/media-proxy");
    let url = format!("{}{}", state.config.upstreams.media_origin, rest);
    relay(&state, tier, url, pq.clone(), Some((CacheCategory::Image, pq))).await
}

/// `GET /palmistry-proxy/*`
pub async fn palmistry_relay(State(state): State<AppState>, req: Request<Body>) -> Response {
    let tier = DeviceTier::from_headers(req.headers());
    let pq = path_and_query(&req);
    let rest = strip_prefix_rooted(&pq, "/palmistry-proxy");
    let url = format!("{}{}", state.config.upstreams.palmistry_origin, rest);
    relay(&state, tier, url, pq.clone(), Some((CacheCategory::Image, pq))).await
}

/// `ANY /api-proxy/*`: REST API relay. GET responses are cacheable under the
/// api category with key `api-<METHOD>-<path>`.
pub async fn api_relay(State(state): State<AppState>, req: Request<Body>) -> Response {
    let tier = DeviceTier::from_headers(req.headers());
    let method = req.method().clone();
    let pq = path_and_query(&req);
    let api_path = strip_prefix_rooted(&pq, "/api-proxy");
    let cache_key = cache::api_key(&method, &api_path);

    if method == Method::GET {
        if let Some(entry) = state.caches.get(CacheCategory::Api, &cache_key) {
            state.stats.record_cache_hit();
            metrics::record_cache_hit("api");
            return relay_response(entry.status, entry.headers, entry.body);
        }
    }

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "api relay body rejected");
            return ProxyError::InvalidClientInput(
                "request body too large or unreadable".to_string(),
            )
            .into_response();
        }
    };
    let fetch_body = if bytes.is_empty() {
        FetchBody::Empty
    } else {
        FetchBody::Raw(bytes)
    };

    let url = format!("{}{}", state.config.upstreams.api_origin, api_path);
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
    let headers = headers::scrub_response_headers(
        &upstream.headers,
        &state.config.listener.cookie_base_path,
    );

    if method == Method::GET && upstream.status == StatusCode::OK {
        state.caches.put(
            CacheCategory::Api,
            cache_key,
            CacheEntry {
                status: upstream.status,
                headers: headers.clone(),
                body: body.clone(),
            },
        );
    }

    relay_response(upstream.status, headers, body)
}

/// Shared fetch-and-relay: cache lookup, fetch, decode, scrub, content-type
/// inference, optional cache write.
async fn relay(
    state: &AppState,
    tier: DeviceTier,
    url: String,
    inference_path: String,
    cache: Option<(CacheCategory, String)>,
) -> Response {
    if let Some((category, key)) = &cache {
        if let Some(entry) = state.caches.get(*category, key) {
            state.stats.record_cache_hit();
            metrics::record_cache_hit(category.as_str());
            return relay_response(entry.status, entry.headers, entry.body);
        }
    }

    let upstream = match state.fetcher.fetch_relay(url, tier).await {
        Ok(response) => response,
        Err(err) => return upstream_failure(state, err),
    };
    let encoding = header_str(&upstream.headers, header::CONTENT_ENCODING);
    let body = match decoder::decode_body(encoding.as_deref(), upstream.body) {
        Ok(body) => body,
        Err(err) => return upstream_failure(state, err),
    };

    let mut headers = headers::scrub_response_headers(
        &upstream.headers,
        &state.config.listener.cookie_base_path,
    );
    // Sniff the upstream's content-type first; fall back to the extension
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(resolver::infer_content_type(&inference_path)),
        );
    }

    if upstream.status == StatusCode::OK {
        if let Some((category, key)) = cache {
            state.caches.put(
                category,
                key,
                CacheEntry {
                    status: upstream.status,
                    headers: headers.clone(),
                    body: body.clone(),
                },
            );
        }
    }

    relay_response(upstream.status, headers, body)
}

pub(crate) fn upstream_failure(state: &AppState, err: ProxyError) -> Response {
    state.stats.record_error();
    metrics::record_upstream_error(error_kind(&err));
    tracing::error!(error = %err, "upstream call failed");
    err.into_response()
}

pub(crate) fn error_kind(err: &ProxyError) -> &'static str {
    match err {
        ProxyError::UpstreamTimeout(_) => "timeout",
        ProxyError::UpstreamUnreachable(_) => "unreachable",
        ProxyError::UpstreamDecodeError { .. } => "decode",
        ProxyError::RedirectParseError(_) => "redirect_parse",
        ProxyError::ExtractionFailure(_) => "extraction",
        ProxyError::InvalidClientInput(_) => "client_input",
    }
}

pub(crate) fn header_str(headers: &axum::http::HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub(crate) fn path_and_query(req: &Request<Body>) -> String {
    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string())
}

fn strip_prefix_rooted(pq: &str, prefix: &str) -> String {
    match pq.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() => "/".to_string(),
        Some(rest) if rest.starts_with('/') || rest.starts_with('?') => {
            if rest.starts_with('?') {
                format!("/{rest}")
            } else {
                rest.to_string()
            }
        }
        _ => pq.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prefix_rooted() {
        assert_eq!(strip_prefix_rooted("/api-proxy/v1/user", "/api-proxy"), "/v1/user");
        assert_eq!(strip_prefix_rooted("/api-proxy", "/api-proxy"), "/");
        assert_eq!(strip_prefix_rooted("/api-proxy?x=1", "/api-proxy"), "/?x=1");
        assert_eq!(strip_prefix_rooted("/other", "/api-proxy"), "/other");
    }
}
