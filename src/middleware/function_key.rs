//! Function key authentication middleware.
//!
//! The publish endpoints are protected by a shared function key, provided via
//! the `x-functions-key` header (preferred) or the `code` query parameter.
//! Key comparison is constant-time and repeated failures from one IP are
//! rate limited.
//!
//! ```bash
//! FUNCTION_KEY=your-secret-key cargo run
//! curl -H "x-functions-key: your-secret-key" -X POST http://localhost:3000/weather/publish-random
//! ```
//!
//! # Bypassed Endpoints
//!
//! Bypass paths use exact, case-sensitive matching against the request path.
//! The defaults cover the health probes and the public sample API.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::{debug, error, warn};

use super::ip::extract_client_ip;

/// Header name for the function key.
pub const FUNCTION_KEY_HEADER: &str = "x-functions-key";

/// Query parameter name for the function key.
pub const FUNCTION_KEY_QUERY: &str = "code";

/// Maximum auth failures per IP per minute before blocking.
const AUTH_FAILURE_LIMIT: NonZeroU32 = NonZeroU32::new(10).unwrap();

/// Burst capacity for auth failure rate limiting.
const AUTH_FAILURE_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();

/// Type alias for the per-IP auth failure limiter.
type AuthFailureLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Function key authentication layer.
///
/// When the expected key is `None`, all requests are allowed (auth disabled).
#[derive(Clone)]
pub struct FunctionKeyAuth {
    /// Expected key (None = auth disabled)
    expected_key: Option<Arc<String>>,
    /// Paths that bypass authentication
    bypass_paths: Arc<Vec<String>>,
    /// Rate limiter tracking auth failures per IP
    failure_limiter: Option<Arc<AuthFailureLimiter>>,
}

impl FunctionKeyAuth {
    /// Create a new function key auth layer.
    ///
    /// # Arguments
    ///
    /// * `function_key` - Expected key, or `None` to disable authentication
    /// * `bypass_paths` - Paths that never require the key
    pub fn new(function_key: Option<String>, bypass_paths: Vec<String>) -> Self {
        let failure_limiter = function_key.is_some().then(|| {
            let quota = Quota::per_minute(AUTH_FAILURE_LIMIT).allow_burst(AUTH_FAILURE_BURST);
            Arc::new(RateLimiter::keyed(quota))
        });

        Self {
            expected_key: function_key.map(Arc::new),
            bypass_paths: Arc::new(bypass_paths),
            failure_limiter,
        }
    }

    /// Check if authentication is enabled.
    pub fn is_enabled(&self) -> bool {
        self.expected_key.is_some()
    }
}

impl<S> Layer<S> for FunctionKeyAuth {
    type Service = FunctionKeyAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FunctionKeyAuthService {
            inner,
            expected_key: self.expected_key.clone(),
            bypass_paths: self.bypass_paths.clone(),
            failure_limiter: self.failure_limiter.clone(),
        }
    }
}

/// Function key authentication service wrapper.
#[derive(Clone)]
pub struct FunctionKeyAuthService<S> {
    inner: S,
    expected_key: Option<Arc<String>>,
    bypass_paths: Arc<Vec<String>>,
    failure_limiter: Option<Arc<AuthFailureLimiter>>,
}

impl<S> Service<Request<Body>> for FunctionKeyAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let expected_key = self.expected_key.clone();
        let bypass_paths = self.bypass_paths.clone();
        let failure_limiter = self.failure_limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let expected = match expected_key {
                Some(key) => key,
                None => return inner.call(req).await,
            };

            let path = req.uri().path();
            if bypass_paths.iter().any(|p| p == path) {
                debug!(path, "Bypassing auth");
                return inner.call(req).await;
            }

            let client_ip = extract_client_ip(&req);

            // Block IPs with too many recent failures before looking at the key
            if let Some(ref limiter) = failure_limiter
                && let Err(not_until) = limiter.check_key(&client_ip)
            {
                let wait_time = not_until.wait_time_from(DefaultClock::default().now());
                let retry_after = wait_time.as_secs().max(1);

                error!(
                    client_ip = %client_ip,
                    retry_after_secs = retry_after,
                    "IP blocked due to excessive auth failures"
                );

                return Ok(rate_limited_response(retry_after));
            }

            match extract_function_key(&req) {
                Some(provided) if constant_time_eq(&provided, &expected) => inner.call(req).await,
                Some(_) => {
                    if let Some(ref limiter) = failure_limiter {
                        let _ = limiter.check_key(&client_ip);
                    }
                    warn!(path = %req.uri().path(), client_ip = %client_ip, "Invalid function key");
                    Ok(unauthorized_response("Invalid function key"))
                }
                None => {
                    if let Some(ref limiter) = failure_limiter {
                        let _ = limiter.check_key(&client_ip);
                    }
                    warn!(path = %req.uri().path(), client_ip = %client_ip, "Missing function key");
                    Ok(unauthorized_response("Function key required"))
                }
            }
        })
    }
}

/// Extract the function key from the header or the `code` query parameter.
///
/// The header is preferred; keys in query strings end up in access logs and
/// proxy caches, so passing `code` logs a warning.
fn extract_function_key<B>(req: &Request<B>) -> Option<String> {
    if let Some(header_value) = req.headers().get(FUNCTION_KEY_HEADER)
        && let Ok(value) = header_value.to_str()
    {
        return Some(value.to_string());
    }

    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=')
                && key == FUNCTION_KEY_QUERY
            {
                warn!(
                    path = %req.uri().path(),
                    "Function key provided via query parameter; prefer the x-functions-key header"
                );
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Constant-time string comparison to prevent timing attacks on the key.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Build an unauthorized (401) response.
fn unauthorized_response(message: &str) -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [
            ("WWW-Authenticate", "FunctionKey"),
            ("Content-Type", "application/json"),
        ],
        format!(r#"{{"error":"unauthorized","message":"{}"}}"#, message),
    )
        .into_response()
}

/// Build a rate limited (429) response for auth failures.
fn rate_limited_response(retry_after: u64) -> Response<Body> {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("Retry-After", retry_after.to_string()),
            ("Content-Type", "application/json".to_string()),
        ],
        r#"{"error":"too_many_requests","message":"Too many failed authentication attempts. Please wait before retrying."}"#.to_string(),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_enabled_only_with_key() {
        assert!(FunctionKeyAuth::new(Some("secret".to_string()), vec![]).is_enabled());
        assert!(!FunctionKeyAuth::new(None, vec![]).is_enabled());
    }

    #[test]
    fn test_extract_key_from_header() {
        let req = Request::builder()
            .header("x-functions-key", "my-secret-key")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_function_key(&req).as_deref(), Some("my-secret-key"));
    }

    #[test]
    fn test_extract_key_from_query() {
        let req = Request::builder()
            .uri("/weather/publish?code=query-secret&other=value")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_function_key(&req).as_deref(), Some("query-secret"));
    }

    #[test]
    fn test_header_takes_priority_over_query() {
        let req = Request::builder()
            .uri("/weather/publish?code=query-secret")
            .header("x-functions-key", "header-secret")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_function_key(&req).as_deref(), Some("header-secret"));
    }

    #[test]
    fn test_no_key_present() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert!(extract_function_key(&req).is_none());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("secret123", "secret123"));
        assert!(!constant_time_eq("secret123", "secret456"));
        assert!(!constant_time_eq("short", "much-longer-string"));
    }
}
