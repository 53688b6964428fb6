//! Captured quiz-choice text: shared state machine plus extraction.
//!
//! # Responsibilities
//! - Hold the single process-wide captured text slot (never empty)
//! - Guard refreshes so at most one upstream fetch is in flight
//! - Extract the choice text from funnel HTML via ordered fallback strategies
//!
//! # Design Decisions
//! - Idle -> Capturing transition is an atomic compare-exchange; two
//!   concurrent "refresh needed" observations can never both fetch
//! - Readers never block on an in-flight capture; they see the current value
//! - `last_capture` advances even on failure so an unreachable upstream
//!   cannot cause a refresh storm
//! - The extraction strategy order (slice, tag pattern, keyword scan, raw
//!   regex) is load-bearing: it decides which of several near-identical
//!   candidates wins. Do not reorder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::config::CaptureConfig;

/// Sentence that anchors the choice text in upstream funnel markup.
const ANCHOR_PHRASE: &str = "Ajudamos milhões de pessoas a";

/// Candidates at or below this length are noise (stray tags, punctuation).
const MIN_CANDIDATE_LEN: usize = 5;

/// Goal keywords used by the keyword-filtered scan strategy.
const GOAL_KEYWORDS: [&str; 6] = [
    "amor",
    "dinheiro",
    "carreira",
    "saúde",
    "espiritual",
    "poder",
];

/// Point-in-time view of the captured text slot.
#[derive(Debug, Clone)]
pub struct CaptureSnapshot {
    pub text: String,
    pub last_capture_ms: u64,
    pub capturing: bool,
}

struct Inner {
    text: String,
    last_capture: SystemTime,
}

/// Process-wide captured-text service. Injected into handlers.
pub struct CapturedText {
    fallback: String,
    staleness_secs: u64,
    inner: Mutex<Inner>,
    capturing: AtomicBool,
}

impl CapturedText {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            fallback: config.fallback_text.clone(),
            staleness_secs: config.staleness_secs,
            inner: Mutex::new(Inner {
                text: config.fallback_text.clone(),
                last_capture: SystemTime::now(),
            }),
            capturing: AtomicBool::new(false),
        }
    }

    /// Current value without blocking on any in-flight capture.
    pub fn snapshot(&self) -> CaptureSnapshot {
        let inner = self.inner.lock().expect("capture mutex poisoned");
        CaptureSnapshot {
            text: inner.text.clone(),
            last_capture_ms: epoch_ms(inner.last_capture),
            capturing: self.capturing.load(Ordering::SeqCst),
        }
    }

    /// Whether the current value still equals the fixed fallback.
    pub fn is_fallback(&self) -> bool {
        self.inner.lock().expect("capture mutex poisoned").text == self.fallback
    }

    /// A refresh is needed when the value is the fallback or has gone stale.
    pub fn needs_refresh(&self) -> bool {
        let inner = self.inner.lock().expect("capture mutex poisoned");
        if inner.text == self.fallback {
            return true;
        }
        inner
            .last_capture
            .elapsed()
            .map(|age| age.as_secs() > self.staleness_secs)
            .unwrap_or(true)
    }

    /// Attempt the Idle -> Capturing transition. Exactly one caller wins.
    pub fn try_begin_capture(&self) -> bool {
        self.capturing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Complete a capture started with [`try_begin_capture`]. The timestamp
    /// advances even on failure; the state always returns to Idle.
    ///
    /// [`try_begin_capture`]: Self::try_begin_capture
    pub fn finish_capture(&self, result: Option<String>) {
        {
            let mut inner = self.inner.lock().expect("capture mutex poisoned");
            inner.last_capture = SystemTime::now();
            match result {
                Some(text) => {
                    tracing::info!(text = %text, "captured choice text refreshed");
                    inner.text = text;
                }
                None => {
                    tracing::warn!("capture refresh produced no candidate, keeping current text");
                }
            }
        }
        self.capturing.store(false, Ordering::SeqCst);
    }

    /// Passive offer from an unrelated HTML transform pass. Accepted only
    /// while the slot still holds the fallback.
    pub fn offer(&self, candidate: &str) {
        let candidate = candidate.trim();
        if candidate.chars().count() <= MIN_CANDIDATE_LEN {
            return;
        }
        let mut inner = self.inner.lock().expect("capture mutex poisoned");
        if inner.text == self.fallback {
            tracing::info!(text = %candidate, "captured choice text passively");
            inner.text = candidate.to_string();
            inner.last_capture = SystemTime::now();
        }
    }

    /// Explicit client report. Always wins, ignores the capture guard.
    pub fn set_reported(&self, text: String) {
        let mut inner = self.inner.lock().expect("capture mutex poisoned");
        inner.text = text;
        inner.last_capture = SystemTime::now();
    }
}

fn epoch_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Extract the quiz-choice text from funnel HTML.
///
/// Strategies run in a fixed order and the first candidate longer than
/// [`MIN_CANDIDATE_LEN`] characters wins.
pub fn extract_choice(html: &str) -> Option<String> {
    let strategies = [
        extract_by_slice,
        extract_by_tag_pattern,
        extract_by_keyword_scan,
        extract_by_raw_regex,
    ];
    for strategy in strategies {
        if let Some(candidate) = strategy(html) {
            let candidate = candidate.trim().to_string();
            if candidate.chars().count() > MIN_CANDIDATE_LEN {
                return Some(candidate);
            }
        }
    }
    None
}

/// Strategy 1: slice between the bold tags that directly follow the anchor.
fn extract_by_slice(html: &str) -> Option<String> {
    let after_anchor = &html[html.find(ANCHOR_PHRASE)? + ANCHOR_PHRASE.len()..];
    let open = after_anchor.find("<b>")?;
    let rest = &after_anchor[open + 3..];
    let close = rest.find("</b>")?;
    Some(strip_tags(&rest[..close]))
}

/// Strategy 2: single regex over anchor plus bold tag, tolerating attributes.
fn extract_by_tag_pattern(html: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"Ajudamos milhões de pessoas a\s*<b[^>]*>(.*?)</b>")
            .expect("tag pattern regex")
    });
    re.captures(html)
        .map(|caps| strip_tags(caps.get(1).map_or("", |m| m.as_str())))
}

/// Strategy 3: scan every bold/strong run and keep the first one carrying a
/// goal keyword.
fn extract_by_keyword_scan(html: &str) -> Option<String> {
    static BOLD: OnceLock<Regex> = OnceLock::new();
    let re = BOLD.get_or_init(|| {
        Regex::new(r"<(?:b|strong)[^>]*>(.*?)</(?:b|strong)>").expect("bold scan regex")
    });
    for caps in re.captures_iter(html) {
        let text = strip_tags(caps.get(1).map_or("", |m| m.as_str()));
        let lowered = text.to_lowercase();
        if GOAL_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            return Some(text);
        }
    }
    None
}

/// Strategy 4: raw regex from the anchor to the closing comma, tags ignored.
fn extract_by_raw_regex(html: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"Ajudamos milhões de pessoas a\s*(?:<[^>]*>\s*)*([^<,]+)")
            .expect("raw extraction regex")
    });
    re.captures(html)
        .map(|caps| caps.get(1).map_or("", |m| m.as_str()).to_string())
}

fn strip_tags(fragment: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let re = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag strip regex"));
    re.replace_all(fragment, "").trim().to_string()
}
