use crate::{ConfigError, FromEnv, env_or_default, env_required};

/// Redis connection settings for the job queues.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
    /// Prepended to every queue key, e.g. `checkout:labor-jobs:ready`.
    pub key_prefix: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: "checkout".to_string(),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

impl FromEnv for RedisConfig {
    /// `REDIS_URL` is required; `REDIS_KEY_PREFIX` defaults to `checkout`.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("REDIS_URL")?,
            key_prefix: env_or_default("REDIS_KEY_PREFIX", "checkout"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_from_env_success() {
        temp_env::with_vars(
            [
                ("REDIS_URL", Some("redis://localhost:6379")),
                ("REDIS_KEY_PREFIX", None),
            ],
            || {
                let config = RedisConfig::from_env().unwrap();
                assert_eq!(config.url, "redis://localhost:6379");
                assert_eq!(config.key_prefix, "checkout");
            },
        );
    }

    #[test]
    fn test_redis_config_from_env_missing() {
        temp_env::with_var_unset("REDIS_URL", || {
            let err = RedisConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("REDIS_URL"));
        });
    }

    #[test]
    fn test_redis_config_custom_prefix() {
        let config = RedisConfig::new("redis://cache:6379").with_key_prefix("staging");
        assert_eq!(config.key_prefix, "staging");
    }
}
