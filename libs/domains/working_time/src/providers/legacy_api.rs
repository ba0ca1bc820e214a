//! HTTP client for the legacy labor system.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_parse_or, env_required};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::LegacyApiClient;
use crate::error::LegacyApiError;
use crate::events::LaborJobEvent;

/// Legacy API settings.
#[derive(Debug, Clone)]
pub struct LegacyApiConfig {
    /// Endpoint that accepts check-out events via POST.
    pub url: String,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl LegacyApiConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl FromEnv for LegacyApiConfig {
    /// `LEGACY_API_URL` is required; `LEGACY_API_TIMEOUT_SECS` defaults to 10.
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = env_parse_or("LEGACY_API_TIMEOUT_SECS", Self::DEFAULT_TIMEOUT_SECS)?;
        Ok(Self::new(env_required("LEGACY_API_URL")?)
            .with_timeout(Duration::from_secs(timeout_secs)))
    }
}

/// Posts labor events as JSON.
#[derive(Debug, Clone)]
pub struct HttpLegacyClient {
    client: reqwest::Client,
    url: String,
}

impl HttpLegacyClient {
    pub fn new(config: LegacyApiConfig) -> Result<Self, LegacyApiError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.url,
        })
    }
}

#[async_trait]
impl LegacyApiClient for HttpLegacyClient {
    async fn record_check_out(&self, event: &LaborJobEvent) -> Result<(), LegacyApiError> {
        debug!(url = %self.url, working_time_id = event.working_time_id, "Calling legacy API");

        let response = self.client.post(&self.url).json(event).send().await?;
        let status = response.status();

        if status.as_u16() >= 300 {
            let body = response.text().await.unwrap_or_default();
            warn!(
                working_time_id = event.working_time_id,
                status = status.as_u16(),
                "Legacy API returned non-successful status"
            );
            return Err(LegacyApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            working_time_id = event.working_time_id,
            employee_id = %event.employee_id,
            "Recorded check-out in legacy system"
        );
        Ok(())
    }
}
