//! Security response headers.
//!
//! A fixed, conservative set applied to every response when
//! `security.headers_enabled` is set. Headers already set by a handler are
//! left alone.

use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self' https: data: blob:; \
     base-uri 'self'; object-src 'none'; frame-ancestors 'none'; \
     form-action 'self'; upgrade-insecure-requests";

/// The headers and values added to responses.
pub fn security_headers() -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (header::X_DNS_PREFETCH_CONTROL, HeaderValue::from_static("off")),
        (
            HeaderName::from_static("x-permitted-cross-domain-policies"),
            HeaderValue::from_static("none"),
        ),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("0")),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ),
        (
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin-allow-popups"),
        ),
        (
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
        ),
    ]
}

/// Layer every security header onto `router`.
pub fn with_security_headers(router: Router) -> Router {
    security_headers()
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(name, value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    #[tokio::test]
    async fn headers_are_added_to_responses() {
        let app = with_security_headers(Router::new().route("/", get(|| async { "ok" })));

        let res = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        for (name, value) in security_headers() {
            assert_eq!(res.headers().get(&name), Some(&value), "{name}");
        }
    }

    #[tokio::test]
    async fn handler_headers_win() {
        let app = with_security_headers(Router::new().route(
            "/",
            get(|| async { ([(header::X_FRAME_OPTIONS, "SAMEORIGIN")], "ok") }),
        ));

        let res = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.headers()[header::X_FRAME_OPTIONS], "SAMEORIGIN");
    }
}
