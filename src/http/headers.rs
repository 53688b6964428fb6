//! Response header policy.
//!
//! # Responsibilities
//! - Strip hop-by-hop and size/encoding headers before relaying upstream
//!   responses (the body has been decoded and possibly rewritten, so the
//!   upstream's framing headers are all wrong by now)
//! - Rewrite `Set-Cookie` so cookies bind to the proxy, not the upstream

use axum::http::{HeaderMap, HeaderValue};

const STRIPPED: [&str; 5] = [
    "transfer-encoding",
    "content-encoding",
    "content-length",
    "host",
    "connection",
];

/// Apply the relay header policy to an upstream response.
pub fn scrub_response_headers(headers: &HeaderMap, cookie_base_path: &str) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let lowered = name.as_str();
        if STRIPPED.contains(&lowered) {
            continue;
        }
        if lowered == "set-cookie" {
            match value.to_str() {
                Ok(raw) => {
                    let rewritten = rewrite_set_cookie(raw, cookie_base_path);
                    if let Ok(v) = HeaderValue::from_str(&rewritten) {
                        out.append(name.clone(), v);
                    }
                }
                // Opaque bytes; relay untouched
                Err(_) => {
                    out.append(name.clone(), value.clone());
                }
            }
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Rewrite one `Set-Cookie` value: drop `Domain=...`, drop `Secure`, and
/// point `Path=/` at the proxy's own base path.
pub fn rewrite_set_cookie(value: &str, base_path: &str) -> String {
    value
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter(|part| {
            let lowered = part.to_ascii_lowercase();
            !lowered.starts_with("domain=") && lowered != "secure"
        })
        .map(|part| {
            if part.to_ascii_lowercase() == "path=/" {
                format!("Path={base_path}")
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_headers_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert("content-encoding", HeaderValue::from_static("gzip"));
        headers.insert("content-length", HeaderValue::from_static("1234"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("connection", HeaderValue::from_static("close"));
        headers.insert("content-type", HeaderValue::from_static("text/html"));

        let out = scrub_response_headers(&headers, "/");
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("content-type").unwrap(), "text/html");
    }

    #[test]
    fn test_set_cookie_rewritten_not_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "set-cookie",
            HeaderValue::from_static("sid=abc; Domain=witchpower.online; Path=/; Secure; HttpOnly"),
        );
        let out = scrub_response_headers(&headers, "/pt");
        assert_eq!(out.get("set-cookie").unwrap(), "sid=abc; Path=/pt; HttpOnly");
    }

    #[test]
    fn test_cookie_specific_path_kept() {
        assert_eq!(
            rewrite_set_cookie("sid=abc; Path=/api; Secure", "/pt"),
            "sid=abc; Path=/api"
        );
    }

    #[test]
    fn test_cookie_without_attributes_untouched() {
        assert_eq!(rewrite_set_cookie("plain=1", "/"), "plain=1");
    }

    #[test]
    fn test_multiple_cookies_each_rewritten() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1; Domain=x.com"));
        headers.append("set-cookie", HeaderValue::from_static("b=2; Secure"));
        let out = scrub_response_headers(&headers, "/");
        let cookies: Vec<_> = out
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
    }
}
