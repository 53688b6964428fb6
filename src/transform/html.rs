//! Streaming HTML rewriting: URL remapping and payload injection.
//!
//! # Responsibilities
//! - Rewrite navigable/loadable URLs from upstream-absolute to proxy-relative
//! - Inject the tracking pixel, persistence script and tier behavior script
//!
//! # Design Decisions
//! - Relative URLs are left untouched; rewriting is idempotent
//! - Injection is best-effort: a document without `<head>` or `<body>` is
//!   still served with whatever was rewritten
//! - A rewriter failure serves the original markup rather than failing the
//!   request

use lol_html::html_content::ContentType;
use lol_html::{element, HtmlRewriter, Settings};

use crate::config::UpstreamsConfig;
use crate::device::DeviceTier;

/// Invisible pixel prepended right after `<body>`.
const TRACKING_PIXEL: &str = "<img src=\"/px.gif\" alt=\"\" width=\"1\" height=\"1\" \
     style=\"position:absolute;left:-9999px\">";

/// Client-side quiz-progress persistence. Runs in the browser; only its text
/// is a server concern.
const PERSISTENCE_SCRIPT: &str = "<script>(function(){try{var k=\"fp.quiz.progress\";\
var s=window.sessionStorage.getItem(k)||window.localStorage.getItem(k);\
if(s){window.__quizProgress=JSON.parse(s);}\
window.addEventListener(\"beforeunload\",function(){\
if(window.__quizProgress){var v=JSON.stringify(window.__quizProgress);\
window.sessionStorage.setItem(k,v);window.localStorage.setItem(k,v);}});}\
catch(e){}})();</script>";

const BEHAVIOR_SCRIPT_FULL: &str = "<script src=\"/js/behavior.full.js\" defer></script>";
const BEHAVIOR_SCRIPT_REDUCED: &str = "<script src=\"/js/behavior.lite.js\" defer></script>";

/// Rewrite a single URL attribute value. `None` means leave it alone.
pub fn rewrite_url(value: &str, upstreams: &UpstreamsConfig) -> Option<String> {
    if let Some(rest) = value.strip_prefix(&upstreams.main_origin) {
        return Some(ensure_rooted(rest));
    }
    if let Some(rest) = value.strip_prefix(&upstreams.secondary_origin) {
        return Some(prefix_path(&upstreams.secondary_prefix, rest));
    }
    if let Some(rest) = value.strip_prefix(&upstreams.media_origin) {
        return Some(prefix_path("/media-proxy", rest));
    }
    if let Some(rest) = value.strip_prefix(&upstreams.palmistry_origin) {
        return Some(prefix_path("/palmistry-proxy", rest));
    }
    None
}

fn ensure_rooted(rest: &str) -> String {
    if rest.is_empty() {
        "/".to_string()
    } else if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

fn prefix_path(prefix: &str, rest: &str) -> String {
    if rest.is_empty() || rest == "/" {
        prefix.to_string()
    } else {
        format!("{prefix}{}", ensure_rooted(rest))
    }
}

/// Rewrite URLs and inject the fixed payloads. Status and everything outside
/// the handled elements pass through untouched.
pub fn transform_document(html: &str, tier: DeviceTier, upstreams: &UpstreamsConfig) -> String {
    let behavior = if tier.reduced_scripts() {
        BEHAVIOR_SCRIPT_REDUCED
    } else {
        BEHAVIOR_SCRIPT_FULL
    };
    let head_payload = format!("{PERSISTENCE_SCRIPT}{behavior}");

    let mut output = Vec::with_capacity(html.len() + head_payload.len() + 256);
    let result = {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("a[href], link[href], area[href]", |el| {
                        if let Some(href) = el.get_attribute("href") {
                            if let Some(rewritten) = rewrite_url(&href, upstreams) {
                                el.set_attribute("href", &rewritten).ok();
                            }
                        }
                        Ok(())
                    }),
                    element!("script[src], img[src], source[src], iframe[src]", |el| {
                        if let Some(src) = el.get_attribute("src") {
                            if let Some(rewritten) = rewrite_url(&src, upstreams) {
                                el.set_attribute("src", &rewritten).ok();
                            }
                        }
                        Ok(())
                    }),
                    element!("form[action]", |el| {
                        if let Some(action) = el.get_attribute("action") {
                            if let Some(rewritten) = rewrite_url(&action, upstreams) {
                                el.set_attribute("action", &rewritten).ok();
                            }
                        }
                        Ok(())
                    }),
                    element!("head", |el| {
                        el.append(&head_payload, ContentType::Html);
                        Ok(())
                    }),
                    element!("body", |el| {
                        el.prepend(TRACKING_PIXEL, ContentType::Html);
                        Ok(())
                    }),
                ],
                ..Settings::default()
            },
            |chunk: &[u8]| output.extend_from_slice(chunk),
        );
        rewriter
            .write(html.as_bytes())
            .and_then(|()| rewriter.end())
    };

    match result {
        Ok(()) => String::from_utf8_lossy(&output).into_owned(),
        Err(err) => {
            tracing::warn!(error = %err, "html rewrite failed, serving original markup");
            html.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstreams() -> UpstreamsConfig {
        UpstreamsConfig::default()
    }

    #[test]
    fn test_rewrite_main_origin_strips_to_relative() {
        assert_eq!(
            rewrite_url("https://witchpower.online/x", &upstreams()).as_deref(),
            Some("/x")
        );
    }

    #[test]
    fn test_rewrite_relative_is_noop() {
        assert_eq!(rewrite_url("/x", &upstreams()), None);
        assert_eq!(rewrite_url("img/logo.png", &upstreams()), None);
    }

    #[test]
    fn test_rewrite_secondary_origin_gains_prefix() {
        assert_eq!(
            rewrite_url("https://reading.witchpower.online/tarot", &upstreams()).as_deref(),
            Some("/reading/tarot")
        );
    }

    #[test]
    fn test_rewrite_media_origins() {
        assert_eq!(
            rewrite_url("https://media.witchpower.online/cards/a.webp", &upstreams()).as_deref(),
            Some("/media-proxy/cards/a.webp")
        );
        assert_eq!(
            rewrite_url("https://palmistry.witchpower.online/h.png", &upstreams()).as_deref(),
            Some("/palmistry-proxy/h.png")
        );
    }

    #[test]
    fn test_foreign_origin_untouched() {
        assert_eq!(rewrite_url("https://cdn.example.com/lib.js", &upstreams()), None);
    }

    #[test]
    fn test_document_attributes_rewritten() {
        let html = r#"<html><head><link href="https://witchpower.online/app.css"></head>
            <body><a href="https://reading.witchpower.online/tarot">ler</a>
            <img src="https://media.witchpower.online/moon.png">
            <form action="https://witchpower.online/subscribe"></form></body></html>"#;
        let out = transform_document(html, DeviceTier::Desktop, &upstreams());
        assert!(out.contains(r#"href="/app.css""#));
        assert!(out.contains(r#"href="/reading/tarot""#));
        assert!(out.contains(r#"src="/media-proxy/moon.png""#));
        assert!(out.contains(r#"action="/subscribe""#));
    }

    #[test]
    fn test_payloads_injected() {
        let html = "<html><head></head><body><p>oi</p></body></html>";
        let out = transform_document(html, DeviceTier::Desktop, &upstreams());
        assert!(out.contains("fp.quiz.progress"));
        assert!(out.contains("behavior.full.js"));
        assert!(out.contains("/px.gif"));
        // Pixel lands right after <body>, before existing content
        assert!(out.find("/px.gif").unwrap() < out.find("<p>oi</p>").unwrap());
    }

    #[test]
    fn test_android_gets_reduced_variant() {
        let html = "<html><head></head><body></body></html>";
        let out = transform_document(html, DeviceTier::Android, &upstreams());
        assert!(out.contains("behavior.lite.js"));
        assert!(!out.contains("behavior.full.js"));
    }

    #[test]
    fn test_missing_injection_points_still_served() {
        let fragment = "<div><a href=\"https://witchpower.online/x\">x</a></div>";
        let out = transform_document(fragment, DeviceTier::Desktop, &upstreams());
        assert!(out.contains(r#"href="/x""#));
        assert!(!out.contains("behavior.full.js"));
    }

    #[test]
    fn test_rewriting_is_idempotent() {
        let html = r#"<body><a href="https://witchpower.online/x">x</a></body>"#;
        let once = transform_document(html, DeviceTier::Desktop, &upstreams());
        let twice = transform_document(&once, DeviceTier::Desktop, &upstreams());
        // URL rewriting of an already-relative href is a no-op
        assert_eq!(once.matches(r#"href="/x""#).count(), 1);
        assert!(twice.contains(r#"href="/x""#));
    }
}
