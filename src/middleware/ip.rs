//! Client IP extraction for middleware.
//!
//! Used by the auth failure limiter to key per-client state. The extracted
//! value is best-effort: `X-Forwarded-For` and `X-Real-IP` can be spoofed by
//! clients that do not sit behind a trusted proxy, which is acceptable for
//! failure limiting (an attacker rotating header values only rate limits
//! invented keys, never other clients).

use axum::http::Request;

/// Placeholder used when no client IP can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Extract the client IP from proxy headers.
///
/// Checks `X-Forwarded-For` (first hop) then `X-Real-IP`, falling back to
/// [`UNKNOWN_IP`].
pub fn extract_client_ip<B>(req: &Request<B>) -> String {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        let candidate = first.trim();
        if !candidate.is_empty() {
            return candidate.to_string();
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return value.trim().to_string();
    }

    UNKNOWN_IP.to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_forwarded_for_first_hop_wins() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "192.0.2.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_client_ip(&req), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_fallback() {
        let req = Request::builder()
            .header("x-real-ip", "192.0.2.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_client_ip(&req), "192.0.2.1");
    }

    #[test]
    fn test_unknown_without_headers() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_client_ip(&req), UNKNOWN_IP);
    }

    #[test]
    fn test_empty_forwarded_for_falls_through() {
        let req = Request::builder()
            .header("x-forwarded-for", "  ")
            .header("x-real-ip", "192.0.2.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_client_ip(&req), "192.0.2.1");
    }
}
