use crate::{ConfigError, FromEnv, env_parse_or, env_required};

/// Postgres settings for the working-time store.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
        }
    }
}

impl FromEnv for DatabaseConfig {
    /// `DATABASE_URL` is required; `DATABASE_MAX_CONNECTIONS` defaults to 10.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("DATABASE_URL")?,
            max_connections: env_parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_from_env_success() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/checkin")),
                ("DATABASE_MAX_CONNECTIONS", Some("25")),
            ],
            || {
                let config = DatabaseConfig::from_env().unwrap();
                assert_eq!(config.url, "postgres://localhost/checkin");
                assert_eq!(config.max_connections, 25);
            },
        );
    }

    #[test]
    fn test_database_config_from_env_missing() {
        temp_env::with_var_unset("DATABASE_URL", || {
            let err = DatabaseConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("DATABASE_URL"));
        });
    }

    #[test]
    fn test_database_config_new_defaults_pool() {
        assert_eq!(DatabaseConfig::new("postgres://db").max_connections, 10);
    }
}
