//! HTML transform pipeline.
//!
//! # Data Flow
//! ```text
//! decoded HTML string
//!     → opportunistic text capture (only while the slot holds the fallback)
//!     → URL rewriting + payload injection (html.rs)
//!     → currency conversion (currency.rs)
//!     → serialized back; status passes through unchanged
//! ```
//! Redirect interception (redirect.rs) short-circuits before any of this.

pub mod currency;
pub mod html;
pub mod redirect;

use crate::capture::{self, CapturedText};
use crate::config::ProxyConfig;
use crate::device::DeviceTier;

/// Sentence that marks funnel pages carrying the choice text.
const CAPTURE_ANCHOR: &str = "Ajudamos milhões de pessoas a";

/// Run the full transform pipeline over a decoded HTML body.
pub fn apply_pipeline(
    html: &str,
    tier: DeviceTier,
    config: &ProxyConfig,
    captured: &CapturedText,
) -> String {
    // Step 1: opportunistic capture, best-effort
    if html.contains(CAPTURE_ANCHOR) && captured.is_fallback() {
        match capture::extract_choice(html) {
            Some(candidate) => captured.offer(&candidate),
            None => tracing::debug!("anchor present but no extraction strategy matched"),
        }
    }

    // Steps 2-3: URL rewriting and injection
    let rewritten = html::transform_document(html, tier, &config.upstreams);

    // Step 4: currency localization
    currency::convert_currency(&rewritten, config.currency.rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;

    #[test]
    fn test_pipeline_rewrites_converts_and_captures() {
        let config = ProxyConfig::default();
        let captured = CapturedText::new(&CaptureConfig::default());
        let html = "<html><head></head><body>\
            <p>Ajudamos milhões de pessoas a <b>superar a ansiedade</b>, e queremos ajudar você também.</p>\
            <a href=\"https://witchpower.online/planos\">Assine por $10.00</a>\
            </body></html>";

        let out = apply_pipeline(html, DeviceTier::Desktop, &config, &captured);

        assert!(out.contains(r#"href="/planos""#));
        assert!(out.contains("R$55,90"));
        assert!(out.contains("fp.quiz.progress"));
        assert_eq!(captured.snapshot().text, "superar a ansiedade");
    }

    #[test]
    fn test_capture_skipped_once_text_is_real() {
        let config = ProxyConfig::default();
        let captured = CapturedText::new(&CaptureConfig::default());
        captured.set_reported("abrir meus caminhos".into());

        let html = "<body><p>Ajudamos milhões de pessoas a <b>outro objetivo aqui</b>,</p></body>";
        apply_pipeline(html, DeviceTier::Desktop, &config, &captured);

        assert_eq!(captured.snapshot().text, "abrir meus caminhos");
    }

    #[test]
    fn test_missing_anchor_is_not_an_error() {
        let config = ProxyConfig::default();
        let captured = CapturedText::new(&CaptureConfig::default());
        let out = apply_pipeline("<body><p>sem âncora</p></body>", DeviceTier::Desktop, &config, &captured);
        assert!(out.contains("sem âncora"));
        assert!(captured.is_fallback());
    }
}
