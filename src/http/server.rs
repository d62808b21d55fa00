//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum Router with handlers and middleware
//! - Bind the listener and serve until the drain token fires
//! - Report how the serve loop ended to the lifecycle controller

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{Instrument, Span};

use crate::config::AppConfig;
use crate::http::handlers;
use crate::http::in_flight::{track_in_flight, InFlightTracker};
use crate::lifecycle::service::{ServeError, ServiceLoop, TransportError};
use crate::security::cors::{with_cors, AllowedOrigins};
use crate::security::gate::admission_gate;
use crate::security::headers::with_security_headers;
use crate::security::rate_limit::RateLimiter;

/// Build the application router.
///
/// The admission gate is only installed when a limiter is given, and the
/// CORS check only when origins are configured.
#[allow(deprecated)]
pub fn build_router(config: &AppConfig, limiter: Option<Arc<RateLimiter>>) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::health));

    if let Some(limiter) = limiter {
        router = router.layer(middleware::from_fn_with_state(limiter, admission_gate));
    }
    router = with_cors(
        router,
        AllowedOrigins::new(&config.security.cors_allowed_origins),
    );
    if config.security.headers_enabled {
        router = with_security_headers(router);
    }

    router
        .layer(RequestBodyLimitLayer::new(config.http.max_body_bytes))
        .layer(TimeoutLayer::new(config.http.request_timeout()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// HTTP service loop.
pub struct HttpServer {
    bind_address: String,
    router: Router,
    in_flight: InFlightTracker,
    span: Span,
}

impl HttpServer {
    /// Create a server for `config`, gated by `limiter` when given.
    pub fn new(config: &AppConfig, limiter: Option<Arc<RateLimiter>>, span: Span) -> Self {
        Self::from_router(
            config.http.bind_address.clone(),
            build_router(config, limiter),
            span,
        )
    }

    /// Serve an already built router. Requests are still counted in flight.
    pub fn from_router(bind_address: impl Into<String>, router: Router, span: Span) -> Self {
        let in_flight = InFlightTracker::new();
        let router = router.layer(middleware::from_fn_with_state(
            in_flight.clone(),
            track_in_flight,
        ));
        Self {
            bind_address: bind_address.into(),
            router,
            in_flight,
            span,
        }
    }

    pub fn in_flight(&self) -> InFlightTracker {
        self.in_flight.clone()
    }

    async fn run(self, drain: CancellationToken) -> Result<(), ServeError> {
        let listener = TcpListener::bind(&self.bind_address)
            .await
            .map_err(|source| TransportError::Bind {
                addr: self.bind_address.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(TransportError::Serve)?;
        tracing::info!(address = %addr, "HTTP server listening");

        let in_flight = self.in_flight.clone();
        let signal = {
            let drain = drain.clone();
            async move {
                drain.cancelled().await;
                tracing::info!(in_flight = in_flight.count(), "Draining HTTP server");
            }
        };

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(TransportError::Serve)?;

        if drain.is_cancelled() {
            tracing::info!("HTTP server stopped");
            Err(ServeError::Closed)
        } else {
            tracing::warn!("HTTP server stopped without a drain request");
            Ok(())
        }
    }
}

impl ServiceLoop for HttpServer {
    fn serve(
        self,
        drain: CancellationToken,
    ) -> impl Future<Output = Result<(), ServeError>> + Send + 'static {
        let span = self.span.clone();
        self.run(drain).instrument(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        extract::ConnectInfo,
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::security::rate_limit::AdmissionPolicy;

    fn get_from(uri: &str, peer: &str) -> Request<Body> {
        let addr: SocketAddr = peer.parse().unwrap();
        Request::builder()
            .uri(uri)
            .extension(ConnectInfo(addr))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let router = build_router(&AppConfig::default(), None);
        let response = router
            .oneshot(get_from("/healthz", "10.0.0.1:4000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn headers_can_be_disabled() {
        let mut config = AppConfig::default();
        config.security.headers_enabled = false;
        let response = build_router(&config, None)
            .oneshot(get_from("/", "10.0.0.1:4000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(header::X_FRAME_OPTIONS));
    }

    #[tokio::test]
    async fn configured_origins_are_enforced() {
        let mut config = AppConfig::default();
        config.security.cors_allowed_origins = vec!["https://app.example.com".into()];
        let router = build_router(&config, None);

        let mut foreign = get_from("/", "10.0.0.1:4000");
        foreign
            .headers_mut()
            .insert(header::ORIGIN, "https://evil.example".parse().unwrap());
        let response = router.clone().oneshot(foreign).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );

        let mut allowed = get_from("/", "10.0.0.1:4000");
        allowed
            .headers_mut()
            .insert(header::ORIGIN, "https://app.example.com".parse().unwrap());
        let response = router.oneshot(allowed).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://app.example.com"
        );
    }

    #[tokio::test]
    async fn gate_limits_each_peer() {
        let policy: AdmissionPolicy = AdmissionPolicy::new(0.001, 1, Duration::from_secs(60))
            .with_key_extractor(crate::security::keys::key_by_remote_ip);
        let limiter = Arc::new(RateLimiter::start(policy, Span::none()).unwrap());
        let router = build_router(&AppConfig::default(), Some(limiter.clone()));

        let first = router
            .clone()
            .oneshot(get_from("/", "10.0.0.1:4000"))
            .await
            .unwrap();
        let second = router
            .clone()
            .oneshot(get_from("/", "10.0.0.1:4001"))
            .await
            .unwrap();
        let other = router
            .oneshot(get_from("/", "10.0.0.2:4000"))
            .await
            .unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(other.status(), StatusCode::OK);
        limiter.close().await;
    }
}
