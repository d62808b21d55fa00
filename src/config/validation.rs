//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! Every problem is reported, not just the first.

use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderValue;
use tracing_subscriber::EnvFilter;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate `config`, collecting every error.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.http.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "http.bind_address",
            format!("'{}' is not a socket address", config.http.bind_address),
        ));
    }
    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be > 0"));
    }
    if config.http.max_body_bytes == 0 {
        errors.push(ValidationError::new("http.max_body_bytes", "must be > 0"));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.enabled {
        if !rate_limit.requests_per_second.is_finite() || rate_limit.requests_per_second <= 0.0 {
            errors.push(ValidationError::new(
                "rate_limit.requests_per_second",
                "must be a finite number > 0",
            ));
        }
        if rate_limit.burst == 0 {
            errors.push(ValidationError::new("rate_limit.burst", "must be > 0"));
        }
        if rate_limit.visitor_ttl_secs == 0 {
            errors.push(ValidationError::new("rate_limit.visitor_ttl_secs", "must be > 0"));
        }
    }

    if config.shutdown.timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown.timeout_secs", "must be > 0"));
    }

    let observability = &config.observability;
    if let Err(e) = EnvFilter::try_new(&observability.log_level) {
        errors.push(ValidationError::new("observability.log_level", e.to_string()));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    for origin in &config.security.cors_allowed_origins {
        if let Err(message) = check_origin(origin) {
            errors.push(ValidationError::new(
                "security.cors_allowed_origins",
                format!("'{origin}' {message}"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// An origin is a scheme and host with no path, as browsers send it.
fn check_origin(origin: &str) -> Result<(), &'static str> {
    let Some(host) = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
    else {
        return Err("must start with http:// or https://");
    };
    if host.is_empty() || host.contains('/') {
        return Err("must be scheme://host[:port] without a path");
    }
    if HeaderValue::from_str(origin).is_err() {
        return Err("is not a valid header value");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&AppConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = AppConfig::default();
        config.http.bind_address = "not-an-addr".into();
        config.rate_limit.requests_per_second = 0.0;
        config.rate_limit.burst = 0;
        config.rate_limit.visitor_ttl_secs = 0;
        config.shutdown.timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "http.bind_address",
                "rate_limit.requests_per_second",
                "rate_limit.burst",
                "rate_limit.visitor_ttl_secs",
                "shutdown.timeout_secs",
            ]
        );
    }

    #[test]
    fn disabled_rate_limit_is_not_checked() {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        config.rate_limit.burst = 0;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = AppConfig::default();
        config.observability.metrics_address = "nope".into();
        assert_eq!(validate_config(&config), Ok(()));

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.metrics_address");
    }

    #[test]
    fn bad_log_filter_is_reported() {
        let mut config = AppConfig::default();
        config.observability.log_level = "restgate=loud".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.log_level");
    }

    #[test]
    fn cors_origins_must_be_bare_origins() {
        let mut config = AppConfig::default();
        config.security.cors_allowed_origins = vec![
            "http://localhost:3000".into(),
            "*".into(),
            "https://app.example.com/".into(),
            "ftp://files.example.com".into(),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors
            .iter()
            .all(|e| e.field == "security.cors_allowed_origins"));
        assert!(errors[0].message.starts_with("'*'"));
    }
}
