//! Outbound requests to the resolved upstream target.
//!
//! # Responsibilities
//! - Sanitize inbound headers before forwarding
//! - Re-send an uploaded "photo" file as a fresh multipart form
//! - Apply the device-tier timeout per call
//! - Map transport failures onto the proxy error taxonomy
//!
//! # Design Decisions
//! - The client never follows redirects; redirect handling is a proxy-level
//!   concern, not a transport one
//! - No automatic decompression; the content decoder owns that
//! - No retries; a failed upstream call fails the client request once

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::device::DeviceTier;
use crate::error::{ProxyError, ProxyResult};

/// Raw upstream response before any proxy-side processing.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Body forwarded to the upstream.
pub enum FetchBody {
    Empty,
    Raw(Bytes),
    /// Single supported upload field: a file named "photo", re-sent as
    /// binary with its original filename and MIME type.
    Photo {
        filename: String,
        content_type: String,
        data: Bytes,
    },
}

/// Outbound HTTP client wrapper. One instance shared by all handlers.
pub struct UpstreamFetcher {
    client: reqwest::Client,
    timeouts: TimeoutConfig,
}

impl UpstreamFetcher {
    pub fn new(timeouts: TimeoutConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()?;
        Ok(Self { client, timeouts })
    }

    /// Issue one outbound call. Never retried.
    pub async fn fetch(
        &self,
        method: Method,
        url: String,
        headers: &HeaderMap,
        body: FetchBody,
        tier: DeviceTier,
    ) -> ProxyResult<UpstreamResponse> {
        let is_upload = matches!(body, FetchBody::Photo { .. });
        let sanitized = sanitize_request_headers(headers, is_upload);

        let mut request = self
            .client
            .request(method, &url)
            .headers(sanitized)
            .timeout(tier.fetch_timeout(&self.timeouts));

        match body {
            FetchBody::Empty => {}
            FetchBody::Raw(bytes) => {
                request = request.body(bytes);
            }
            FetchBody::Photo {
                filename,
                content_type,
                data,
            } => {
                let part = match Part::bytes(data.to_vec())
                    .file_name(filename.clone())
                    .mime_str(&content_type)
                {
                    Ok(part) => part,
                    Err(_) => Part::bytes(data.to_vec()).file_name(filename),
                };
                request = request.multipart(Form::new().part("photo", part));
            }
        }

        let timeout_secs = tier.fetch_timeout_secs(&self.timeouts);
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::UpstreamTimeout(timeout_secs)
            } else {
                ProxyError::UpstreamUnreachable(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::UpstreamTimeout(timeout_secs)
            } else {
                ProxyError::UpstreamUnreachable(e.to_string())
            }
        })?;

        tracing::debug!(%url, status = status.as_u16(), bytes = body.len(), "upstream response");

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }

    /// GET with no forwarded headers, used by the fixed relay handlers.
    pub async fn fetch_relay(&self, url: String, tier: DeviceTier) -> ProxyResult<UpstreamResponse> {
        self.fetch(Method::GET, url, &HeaderMap::new(), FetchBody::Empty, tier)
            .await
    }
}

/// Strip hop and identity headers before forwarding. `accept-encoding` is
/// kept only for multipart uploads; for everything else the upstream's
/// compression choice is reversed by the decoder anyway.
fn sanitize_request_headers(headers: &HeaderMap, is_upload: bool) -> HeaderMap {
    let mut out = headers.clone();
    out.remove("host");
    out.remove("connection");
    out.remove("x-forwarded-for");
    out.remove("content-length");
    if !is_upload {
        out.remove("accept-encoding");
    } else {
        // reqwest regenerates the multipart boundary
        out.remove("content-type");
    }
    out
}
