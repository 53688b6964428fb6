//! Error taxonomy for the proxy pipeline.
//!
//! # Responsibilities
//! - Classify upstream and client failures
//! - Map failures to HTTP responses for the client
//!
//! # Design Decisions
//! - Extraction failures are non-fatal and never reach the client
//! - Upstream failures without a relayable status collapse to a fixed 500
//! - No failure is retried automatically

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Fixed plain-text body for upstream failures with no relayable response.
pub const UPSTREAM_FAILURE_BODY: &str = "Upstream request failed";

/// Errors that can occur while proxying a request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The outbound call exceeded its device-tier timeout.
    #[error("upstream timed out after {0} seconds")]
    UpstreamTimeout(u64),

    /// The outbound connection could not be established.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The upstream body could not be decoded with its declared encoding.
    /// Partially decoded bytes must never be served.
    #[error("failed to decode {encoding} body: {reason}")]
    UpstreamDecodeError { encoding: String, reason: String },

    /// The `Location` header of an upstream redirect could not be parsed.
    /// Recovered by relaying the raw header unmodified.
    #[error("malformed redirect location: {0}")]
    RedirectParseError(String),

    /// No extraction strategy produced a usable candidate. Non-fatal.
    #[error("text extraction failed: {0}")]
    ExtractionFailure(String),

    /// The client sent input the API cannot accept.
    #[error("invalid client input: {0}")]
    InvalidClientInput(String),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    /// Status code the client sees when this error surfaces.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidClientInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for failures that are recovered silently and never fail a request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProxyError::ExtractionFailure(_) | ProxyError::RedirectParseError(_)
        )
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ProxyError::InvalidClientInput(reason) => reason.clone(),
            _ => UPSTREAM_FAILURE_BODY.to_string(),
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProxyError::UpstreamTimeout(60);
        assert_eq!(err.to_string(), "upstream timed out after 60 seconds");

        let err = ProxyError::UpstreamDecodeError {
            encoding: "gzip".into(),
            reason: "corrupt deflate stream".into(),
        };
        assert!(err.to_string().contains("gzip"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::InvalidClientInput("empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::UpstreamUnreachable("refused".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(ProxyError::ExtractionFailure("no anchor".into()).is_recoverable());
        assert!(ProxyError::RedirectParseError("::".into()).is_recoverable());
        assert!(!ProxyError::UpstreamTimeout(15).is_recoverable());
    }
}
