//! Upstream redirect interception and remapping.
//!
//! # Responsibilities
//! - Resolve the upstream `Location` to an absolute URL
//! - Apply the fixed override table (first match wins, forces 302)
//! - Rewrite unoverridden absolute URLs back to proxy-relative paths
//!
//! # Design Decisions
//! - The override table exists because the upstream's natural flow is steered
//!   into a different page sequence than the one it was designed for
//! - A malformed `Location` is relayed raw rather than failing the request
//! - Rules are ordered data, unit-testable apart from the pipeline

use axum::http::StatusCode;
use url::Url;

use crate::config::UpstreamsConfig;

/// What an override rule does when its substring matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectAction {
    /// Send the client to this proxy-local path with a forced 302.
    ClientRedirect(&'static str),
    /// Stop matching and fall through to the generic path rewrite.
    NoOverride,
}

/// One entry of the fixed override table.
#[derive(Debug, Clone, Copy)]
pub struct RedirectRule {
    pub match_substring: &'static str,
    pub action: RedirectAction,
}

/// Fixed override table, evaluated top to bottom.
pub const OVERRIDE_RULES: &[RedirectRule] = &[
    RedirectRule {
        match_substring: "/pt/witch-power/wpGoal",
        action: RedirectAction::ClientRedirect("/pt/witch-power/trialChoice"),
    },
    RedirectRule {
        match_substring: "/pt/witch-power/email",
        action: RedirectAction::ClientRedirect("/pt/witch-power/onboarding"),
    },
    RedirectRule {
        match_substring: "/pt/witch-power/trialPayment",
        action: RedirectAction::ClientRedirect("/pt/witch-power/trialChoice"),
    },
];

/// Redirect the client will actually receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectOutcome {
    pub status: StatusCode,
    pub location: String,
}

/// Intercept a 3xx upstream response.
pub fn intercept(
    status: StatusCode,
    location: &str,
    target_origin: &str,
    upstreams: &UpstreamsConfig,
) -> RedirectOutcome {
    let absolute = match resolve_location(location, target_origin) {
        Some(url) => url,
        None => {
            // RedirectParseError: relay the raw header unmodified
            tracing::warn!(%location, "unparseable redirect location, relaying raw");
            return RedirectOutcome {
                status,
                location: location.to_string(),
            };
        }
    };

    for rule in OVERRIDE_RULES {
        if absolute.contains(rule.match_substring) {
            match rule.action {
                RedirectAction::ClientRedirect(path) => {
                    tracing::debug!(from = %absolute, to = path, "redirect override applied");
                    return RedirectOutcome {
                        status: StatusCode::FOUND,
                        location: path.to_string(),
                    };
                }
                RedirectAction::NoOverride => break,
            }
        }
    }

    RedirectOutcome {
        status,
        location: strip_known_origin(&absolute, upstreams),
    }
}

fn resolve_location(location: &str, target_origin: &str) -> Option<String> {
    let base = Url::parse(target_origin).ok()?;
    base.join(location).ok().map(|url| url.to_string())
}

/// Rewrite an absolute upstream URL back into a proxy-relative path by
/// stripping whichever known origin it starts with. Empty results normalize
/// to "/". Unknown origins pass through untouched.
fn strip_known_origin(absolute: &str, upstreams: &UpstreamsConfig) -> String {
    if let Some(rest) = absolute.strip_prefix(&upstreams.main_origin) {
        return normalize_path(rest);
    }
    if let Some(rest) = absolute.strip_prefix(&upstreams.secondary_origin) {
        let rest = normalize_path(rest);
        return if rest == "/" {
            upstreams.secondary_prefix.clone()
        } else {
            format!("{}{}", upstreams.secondary_prefix, rest)
        };
    }
    absolute.to_string()
}

fn normalize_path(rest: &str) -> String {
    if rest.is_empty() || rest == "/" {
        "/".to_string()
    } else if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstreams() -> UpstreamsConfig {
        UpstreamsConfig::default()
    }

    #[test]
    fn test_wp_goal_override_forces_302() {
        let outcome = intercept(
            StatusCode::MOVED_PERMANENTLY,
            "https://witchpower.online/pt/witch-power/wpGoal?step=1",
            "https://witchpower.online",
            &upstreams(),
        );
        assert_eq!(outcome.status, StatusCode::FOUND);
        assert_eq!(outcome.location, "/pt/witch-power/trialChoice");
    }

    #[test]
    fn test_relative_location_resolved_before_override() {
        let outcome = intercept(
            StatusCode::SEE_OTHER,
            "/pt/witch-power/email",
            "https://witchpower.online",
            &upstreams(),
        );
        assert_eq!(outcome.status, StatusCode::FOUND);
        assert_eq!(outcome.location, "/pt/witch-power/onboarding");
    }

    #[test]
    fn test_generic_rewrite_keeps_upstream_status() {
        let outcome = intercept(
            StatusCode::MOVED_PERMANENTLY,
            "https://witchpower.online/blog/novidades",
            "https://witchpower.online",
            &upstreams(),
        );
        assert_eq!(outcome.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(outcome.location, "/blog/novidades");
    }

    #[test]
    fn test_secondary_origin_gains_prefix() {
        let outcome = intercept(
            StatusCode::FOUND,
            "https://reading.witchpower.online/tarot",
            "https://reading.witchpower.online",
            &upstreams(),
        );
        assert_eq!(outcome.location, "/reading/tarot");
    }

    #[test]
    fn test_origin_root_normalizes_to_slash() {
        let outcome = intercept(
            StatusCode::FOUND,
            "https://witchpower.online",
            "https://witchpower.online",
            &upstreams(),
        );
        assert_eq!(outcome.location, "/");
    }

    #[test]
    fn test_foreign_origin_relayed_absolute() {
        let outcome = intercept(
            StatusCode::FOUND,
            "https://payments.example.com/checkout",
            "https://witchpower.online",
            &upstreams(),
        );
        assert_eq!(outcome.location, "https://payments.example.com/checkout");
    }

    #[test]
    fn test_rule_table_order_is_first_match_wins() {
        // A URL containing two rule substrings resolves by table order.
        let outcome = intercept(
            StatusCode::FOUND,
            "https://witchpower.online/pt/witch-power/wpGoal?next=/pt/witch-power/email",
            "https://witchpower.online",
            &upstreams(),
        );
        assert_eq!(outcome.location, "/pt/witch-power/trialChoice");
    }
}
