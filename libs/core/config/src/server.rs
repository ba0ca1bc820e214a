use crate::{ConfigError, FromEnv, env_or_default, env_parse_or};
use std::net::Ipv4Addr;

/// Bind address of a worker's health/metrics listener.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromEnv for ServerConfig {
    /// `HEALTH_HOST` defaults to 0.0.0.0, `HEALTH_PORT` to 8081.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("HEALTH_HOST", &Ipv4Addr::UNSPECIFIED.to_string()),
            port: env_parse_or("HEALTH_PORT", 8081)?,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED.to_string(), 8081)
    }
}
