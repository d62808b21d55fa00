//! Admission gate middleware.
//!
//! Runs the rate limiter inline before the handler. A denied request never
//! reaches the handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::security::rate_limit::{AdmissionError, RateLimiter};

pub async fn admission_gate(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let admission = limiter.admit(&request);
    match admission {
        Ok(true) => next.run(request).await,
        Ok(false) => reject(StatusCode::TOO_MANY_REQUESTS, "Too many requests"),
        Err(AdmissionError::BadKey) => reject(StatusCode::BAD_REQUEST, "bad client key"),
        Err(AdmissionError::Closed) => reject(StatusCode::SERVICE_UNAVAILABLE, "Shutting down"),
    }
}

fn reject(status: StatusCode, message: &'static str) -> Response {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
}
