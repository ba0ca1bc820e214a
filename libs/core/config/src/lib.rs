//! Environment-driven configuration shared by the check-out workers.
//!
//! Every config struct implements [`FromEnv`]; binaries load them once at
//! startup and fail fast with a [`ConfigError`] naming the offending key.

pub mod database;
pub mod redis;
pub mod server;
pub mod tracing;

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Deployment environment, selected by `APP_ENV`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Value of `key`, or `default` when unset.
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Value of `key`, or [`ConfigError::MissingEnvVar`].
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parse `key` into `T`, falling back to `default` when the variable is unset.
///
/// A set-but-malformed value is an error rather than a silent fallback.
pub fn env_parse_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            key: key.to_string(),
            details: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults_to_development() {
        temp_env::with_var_unset("APP_ENV", || {
            let env = Environment::from_env();
            assert_eq!(env, Environment::Development);
            assert!(env.is_development());
            assert!(!env.is_production());
        });
    }

    #[test]
    fn test_environment_production_case_insensitive() {
        for value in ["production", "PRODUCTION", "Production"] {
            temp_env::with_var("APP_ENV", Some(value), || {
                assert_eq!(Environment::from_env(), Environment::Production);
            });
        }
    }

    #[test]
    fn test_environment_unknown_defaults_to_development() {
        temp_env::with_var("APP_ENV", Some("staging"), || {
            assert_eq!(Environment::from_env(), Environment::Development);
        });
    }

    #[test]
    fn test_env_or_default() {
        temp_env::with_var("CHECKOUT_TEST_VAR", Some("value"), || {
            assert_eq!(env_or_default("CHECKOUT_TEST_VAR", "default"), "value");
        });
        temp_env::with_var_unset("CHECKOUT_TEST_VAR", || {
            assert_eq!(env_or_default("CHECKOUT_TEST_VAR", "default"), "default");
        });
    }

    #[test]
    fn test_env_required_missing() {
        temp_env::with_var_unset("CHECKOUT_REQUIRED", || {
            let err = env_required("CHECKOUT_REQUIRED").unwrap_err();
            assert!(err.to_string().contains("CHECKOUT_REQUIRED"));
            assert!(err.to_string().contains("required"));
        });
    }

    #[test]
    fn test_env_parse_or_uses_default_when_unset() {
        temp_env::with_var_unset("WORKER_POOL_SIZE", || {
            assert_eq!(env_parse_or("WORKER_POOL_SIZE", 10usize).unwrap(), 10);
        });
    }

    #[test]
    fn test_env_parse_or_parses_value() {
        temp_env::with_var("WORKER_POOL_SIZE", Some(" 4 "), || {
            assert_eq!(env_parse_or("WORKER_POOL_SIZE", 10usize).unwrap(), 4);
        });
    }

    #[test]
    fn test_env_parse_or_rejects_garbage() {
        temp_env::with_var("WORKER_POOL_SIZE", Some("many"), || {
            let err = env_parse_or("WORKER_POOL_SIZE", 10usize).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::ParseError { ref key, .. } if key == "WORKER_POOL_SIZE"
            ));
        });
    }
}
