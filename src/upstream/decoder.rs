//! Content decoding for upstream response bodies.
//!
//! The upstream is free to answer gzip, deflate or brotli regardless of what
//! we asked for; everything downstream (redirect interception, HTML
//! transforms, passthrough) operates on plain bytes, so the encoding is
//! reversed here first. Unknown or absent encodings pass through unchanged.
//! A decode failure is fatal to the request: partially decoded bytes must
//! never be served.

use std::io::Read;

use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};

use crate::error::{ProxyError, ProxyResult};

/// Reverse the `content-encoding` of an upstream body.
pub fn decode_body(encoding: Option<&str>, body: Bytes) -> ProxyResult<Bytes> {
    // For comma-separated stacked encodings, the first recognizable token
    // decides the decoder.
    let normalized = encoding
        .map(|e| {
            e.split(',')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase()
        })
        .unwrap_or_default();

    match normalized.as_str() {
        enc if enc.contains("gzip") => {
            let mut out = Vec::with_capacity(body.len() * 2);
            GzDecoder::new(body.as_ref())
                .read_to_end(&mut out)
                .map_err(|e| decode_error("gzip", e))?;
            Ok(Bytes::from(out))
        }
        enc if enc.contains("deflate") => {
            let mut out = Vec::with_capacity(body.len() * 2);
            ZlibDecoder::new(body.as_ref())
                .read_to_end(&mut out)
                .map_err(|e| decode_error("deflate", e))?;
            Ok(Bytes::from(out))
        }
        enc if enc.contains("br") => {
            let mut out = Vec::with_capacity(body.len() * 2);
            brotli_decompressor::Decompressor::new(body.as_ref(), 4096)
                .read_to_end(&mut out)
                .map_err(|e| decode_error("br", e))?;
            Ok(Bytes::from(out))
        }
        _ => Ok(body),
    }
}

fn decode_error(encoding: &str, err: std::io::Error) -> ProxyError {
    ProxyError::UpstreamDecodeError {
        encoding: encoding.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Bytes {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        Bytes::from(enc.finish().unwrap())
    }

    #[test]
    fn test_gzip_roundtrip() {
        let body = gzip(b"<html>ola</html>");
        let decoded = decode_body(Some("gzip"), body).unwrap();
        assert_eq!(decoded.as_ref(), b"<html>ola</html>");
    }

    #[test]
    fn test_deflate_roundtrip() {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"{\"ok\":true}").unwrap();
        let body = Bytes::from(enc.finish().unwrap());
        let decoded = decode_body(Some("deflate"), body).unwrap();
        assert_eq!(decoded.as_ref(), b"{\"ok\":true}");
    }

    #[test]
    fn test_unknown_encoding_passes_through() {
        let body = Bytes::from_static(b"raw bytes");
        let decoded = decode_body(Some("zstd"), body.clone()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_absent_encoding_passes_through() {
        let body = Bytes::from_static(b"plain");
        assert_eq!(decode_body(None, body.clone()).unwrap(), body);
    }

    #[test]
    fn test_stacked_encoding_uses_first_token() {
        let body = gzip(b"stacked");
        let decoded = decode_body(Some("gzip, identity"), body).unwrap();
        assert_eq!(decoded.as_ref(), b"stacked");
    }

    #[test]
    fn test_corrupt_gzip_is_fatal() {
        let err = decode_body(Some("gzip"), Bytes::from_static(b"not gzip")).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::UpstreamDecodeError { ref encoding, .. } if encoding == "gzip"
        ));
    }
}
