//! Configuration loading from disk and environment.
//!
//! Precedence, lowest first: built-in defaults, the TOML file (if any),
//! environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{AppConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },
    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the process environment, and validate.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_config_with(path, |var| std::env::var(var).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with<F>(path: Option<&Path>, env: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_config(&content)?
        }
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse TOML without validating.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply the recognised environment variables on top of `config`.
pub fn apply_env_overrides<F>(config: &mut AppConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = env("HTTP_ADDR") {
        config.http.bind_address = addr;
    }
    if let Some(level) = env("LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(format) = parsed::<LogFormat, _>(&env, "LOG_FORMAT")? {
        config.observability.log_format = format;
    }
    if let Some(enabled) = parsed(&env, "RATE_LIMIT_ENABLED")? {
        config.rate_limit.enabled = enabled;
    }
    if let Some(rps) = parsed(&env, "RATE_LIMIT_RPS")? {
        config.rate_limit.requests_per_second = rps;
    }
    if let Some(burst) = parsed(&env, "RATE_LIMIT_BURST")? {
        config.rate_limit.burst = burst;
    }
    if let Some(ttl) = parsed(&env, "RATE_LIMIT_TTL_SECS")? {
        config.rate_limit.visitor_ttl_secs = ttl;
    }
    if let Some(timeout) = parsed(&env, "SHUTDOWN_TIMEOUT_SECS")? {
        config.shutdown.timeout_secs = timeout;
    }
    if let Some(origins) = env("CORS_ALLOWED_ORIGINS") {
        config.security.cors_allowed_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_owned)
            .collect();
    }
    Ok(())
}

fn parsed<T, F>(env: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match env(var) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::Env { var, value }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyBy;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(parse_config("").unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = parse_config(
            r#"
            [http]
            bind_address = "127.0.0.1:3000"

            [rate_limit]
            requests_per_second = 2.5
            burst = 5
            key_by = "forwarded_for"

            [observability]
            log_format = "console"
            "#,
        )
        .unwrap();

        assert_eq!(config.http.bind_address, "127.0.0.1:3000");
        assert_eq!(config.http.request_timeout_secs, 15);
        assert_eq!(config.rate_limit.requests_per_second, 2.5);
        assert_eq!(config.rate_limit.burst, 5);
        assert_eq!(config.rate_limit.visitor_ttl_secs, 180);
        assert_eq!(config.rate_limit.key_by, KeyBy::ForwardedFor);
        assert_eq!(config.observability.log_format, LogFormat::Console);
        assert_eq!(config.shutdown.timeout_secs, 10);
    }

    #[test]
    fn unknown_key_strategy_is_a_parse_error() {
        let err = parse_config("[rate_limit]\nkey_by = \"cookie\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let env = env_of(&[
            ("HTTP_ADDR", "127.0.0.1:9999"),
            ("LOG_LEVEL", "debug"),
            ("LOG_FORMAT", "Console"),
            ("RATE_LIMIT_RPS", "0.5"),
            ("RATE_LIMIT_BURST", "3"),
            ("RATE_LIMIT_TTL_SECS", "30"),
            ("SHUTDOWN_TIMEOUT_SECS", "4"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:3000, https://app.example.com,"),
        ]);

        let config = load_config_with(None, env).unwrap();
        assert_eq!(config.http.bind_address, "127.0.0.1:9999");
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, LogFormat::Console);
        assert_eq!(config.rate_limit.requests_per_second, 0.5);
        assert_eq!(config.rate_limit.burst, 3);
        assert_eq!(config.rate_limit.visitor_ttl_secs, 30);
        assert_eq!(config.shutdown.timeout_secs, 4);
        assert_eq!(
            config.security.cors_allowed_origins,
            vec!["http://localhost:3000", "https://app.example.com"]
        );
    }

    #[test]
    fn unparsable_env_value_is_an_error() {
        let err = load_config_with(None, env_of(&[("RATE_LIMIT_BURST", "many")])).unwrap_err();
        match err {
            ConfigError::Env { var, value } => {
                assert_eq!(var, "RATE_LIMIT_BURST");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn env_values_are_validated() {
        let err = load_config_with(None, env_of(&[("RATE_LIMIT_BURST", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors[0].field == "rate_limit.burst"));
        assert!(err.to_string().contains("rate_limit.burst: must be > 0"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config_with(Some(Path::new("/nonexistent/restgate.toml")), env_of(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
