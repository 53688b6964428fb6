//! Device-tier response compression.
//!
//! Wraps the router in three `Compression` services, one per tier quality,
//! and dispatches each request to the one matching its User-Agent. Content
//! negotiation (accept-encoding, compressible content types) stays with
//! `tower_http`; only the quality choice is ours.

use std::task::{ready, Context, Poll};

use axum::http::Request;
use tower::{Layer, Service};
use tower_http::compression::Compression;

use crate::device::DeviceTier;

#[derive(Debug, Clone, Copy, Default)]
pub struct TierCompressionLayer;

impl<S: Clone> Layer<S> for TierCompressionLayer {
    type Service = TierCompression<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TierCompression {
            android: Compression::new(inner.clone())
                .quality(DeviceTier::Android.compression_level()),
            mobile: Compression::new(inner.clone())
                .quality(DeviceTier::MobileOther.compression_level()),
            desktop: Compression::new(inner).quality(DeviceTier::Desktop.compression_level()),
        }
    }
}

/// Three quality variants around the same inner service.
#[derive(Clone)]
pub struct TierCompression<S> {
    android: Compression<S>,
    mobile: Compression<S>,
    desktop: Compression<S>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for TierCompression<S>
where
    Compression<S>: Service<Request<ReqBody>>,
{
    type Response = <Compression<S> as Service<Request<ReqBody>>>::Response;
    type Error = <Compression<S> as Service<Request<ReqBody>>>::Error;
    type Future = <Compression<S> as Service<Request<ReqBody>>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        ready!(self.android.poll_ready(cx))?;
        ready!(self.mobile.poll_ready(cx))?;
        self.desktop.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        match DeviceTier::from_headers(req.headers()) {
            DeviceTier::Android => self.android.call(req),
            DeviceTier::MobileOther => self.mobile.call(req),
            DeviceTier::Desktop => self.desktop.call(req),
        }
    }
}
