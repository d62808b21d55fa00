//! Cross-origin request policy.
//!
//! Only listed origins are served. A request carrying any other `Origin` is
//! refused with 403 before it reaches a handler, and preflights from listed
//! origins are answered by the CORS layer itself. Requests without an
//! `Origin` header (non-browser clients) pass through.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(3600);

/// The configured origin allow-list.
#[derive(Debug, Clone)]
pub struct AllowedOrigins(Arc<[HeaderValue]>);

impl AllowedOrigins {
    /// Entries that are not valid header values are skipped; config validation
    /// reports them before this point.
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list: Vec<HeaderValue> = origins
            .into_iter()
            .filter_map(|origin| HeaderValue::from_str(origin.as_ref()).ok())
            .collect();
        Self(list.into())
    }

    pub fn contains(&self, origin: &HeaderValue) -> bool {
        self.0.iter().any(|allowed| allowed == origin)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// CORS response headers and preflight handling for `origins`.
pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins.0.iter().cloned()))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(PREFLIGHT_MAX_AGE)
}

pub async fn reject_foreign_origin(
    State(origins): State<AllowedOrigins>,
    request: Request,
    next: Next,
) -> Response {
    match request.headers().get(header::ORIGIN) {
        Some(origin) if !origins.contains(origin) => {
            tracing::debug!(origin = ?origin, "Origin not allowed");
            let mut response = Response::new(Body::from("Not allowed by CORS"));
            *response.status_mut() = StatusCode::FORBIDDEN;
            response
        }
        _ => next.run(request).await,
    }
}

/// Wrap `router` with the origin check and CORS layer. An empty list leaves
/// the router unchanged.
pub fn with_cors(router: Router, origins: AllowedOrigins) -> Router {
    if origins.is_empty() {
        return router;
    }
    router
        .layer(cors_layer(&origins))
        .layer(middleware::from_fn_with_state(origins, reject_foreign_origin))
}
