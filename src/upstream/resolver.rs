//! Upstream target resolution.
//!
//! # Responsibilities
//! - Map an inbound path to the main or secondary origin
//! - Strip the secondary prefix before forwarding (empty remainder -> "/")
//! - Classify asset-like paths for the static cache
//! - Infer a content type from the extension when the upstream omits one
//!
//! # Design Decisions
//! - Prefix matching only, no regex
//! - The fixed relay prefixes (/api-proxy, /media-proxy, /palmistry-proxy,
//!   /_next/*, /quiz/*.svg) are routed by dedicated handlers and never reach
//!   this resolver

use crate::config::UpstreamsConfig;

/// Where an inbound request is forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Absolute origin, no trailing slash.
    pub origin: String,
    /// Path plus query forwarded to that origin.
    pub outbound_path: String,
}

/// Resolve an inbound path-and-query against the main/secondary rule.
pub fn resolve(path_and_query: &str, upstreams: &UpstreamsConfig) -> ResolvedTarget {
    let prefix = &upstreams.secondary_prefix;
    if let Some(remainder) = strip_route_prefix(path_and_query, prefix) {
        return ResolvedTarget {
            origin: upstreams.secondary_origin.clone(),
            outbound_path: remainder,
        };
    }
    ResolvedTarget {
        origin: upstreams.main_origin.clone(),
        outbound_path: path_and_query.to_string(),
    }
}

/// Strip `prefix` when it matches on a path-segment boundary. Returns the
/// remainder normalized to start with "/".
fn strip_route_prefix(path: &str, prefix: &str) -> Option<String> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some("/".to_string());
    }
    // "/readingroom" is not "/reading"
    if rest.starts_with('/') || rest.starts_with('?') {
        let normalized = if rest.starts_with('?') {
            format!("/{rest}")
        } else {
            rest.to_string()
        };
        return Some(normalized);
    }
    None
}

const ASSET_EXTENSIONS: [&str; 12] = [
    ".css", ".js", ".mjs", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".woff",
    ".woff2",
];

/// Asset-like paths are the only ones eligible for the static cache.
pub fn is_asset_path(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    let lowered = path.to_ascii_lowercase();
    ASSET_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext))
}

/// Funnel-critical routes are never cached, regardless of method.
pub fn is_funnel_route(path: &str) -> bool {
    path.starts_with("/pt/witch-power")
}

/// Extension-based content-type inference, used when a relayed upstream
/// response carries no content-type header.
pub fn infer_content_type(path: &str) -> &'static str {
    let path = path.split('?').next().unwrap_or(path);
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstreams() -> UpstreamsConfig {
        UpstreamsConfig::default()
    }

    #[test]
    fn test_main_origin_path_unchanged() {
        let target = resolve("/pt/witch-power/wpGoal?step=2", &upstreams());
        assert_eq!(target.origin, upstreams().main_origin);
        assert_eq!(target.outbound_path, "/pt/witch-power/wpGoal?step=2");
    }

    #[test]
    fn test_secondary_prefix_stripped() {
        let target = resolve("/reading/tarot/daily", &upstreams());
        assert_eq!(target.origin, upstreams().secondary_origin);
        assert_eq!(target.outbound_path, "/tarot/daily");
    }

    #[test]
    fn test_bare_secondary_prefix_maps_to_root() {
        let target = resolve("/reading", &upstreams());
        assert_eq!(target.origin, upstreams().secondary_origin);
        assert_eq!(target.outbound_path, "/");
    }

    #[test]
    fn test_prefix_requires_segment_boundary() {
        let target = resolve("/readingroom", &upstreams());
        assert_eq!(target.origin, upstreams().main_origin);
        assert_eq!(target.outbound_path, "/readingroom");
    }

    #[test]
    fn test_secondary_prefix_with_query_only() {
        let target = resolve("/reading?lang=pt", &upstreams());
        assert_eq!(target.origin, upstreams().secondary_origin);
        assert_eq!(target.outbound_path, "/?lang=pt");
    }

    #[test]
    fn test_asset_path_classification() {
        assert!(is_asset_path("/static/app.css"));
        assert!(is_asset_path("/img/logo.PNG"));
        assert!(is_asset_path("/fonts/title.woff2?v=3"));
        assert!(!is_asset_path("/pt/witch-power/trialChoice"));
        assert!(!is_asset_path("/api/user"));
    }

    #[test]
    fn test_funnel_routes_flagged() {
        assert!(is_funnel_route("/pt/witch-power/trialChoice"));
        assert!(!is_funnel_route("/blog/article"));
    }

    #[test]
    fn test_content_type_inference() {
        assert_eq!(infer_content_type("/quiz/moon.svg"), "image/svg+xml");
        assert_eq!(infer_content_type("/a/b/app.js?x=1"), "application/javascript");
        assert_eq!(infer_content_type("/unknown.bin"), "application/octet-stream");
    }
}
