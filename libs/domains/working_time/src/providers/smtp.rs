//! SMTP email sender using lettre.
//!
//! Without TLS it talks plain SMTP, which is what local Mailpit/MailHog
//! setups expect.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse_or};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, error, info};

use super::{EmailContent, EmailSender};
use crate::error::EmailError;

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Sender address of the shift summary.
    pub from_email: String,
    pub from_name: String,
    /// Optional for dev servers like Mailpit.
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>, port: u16, from_email: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            from_email: from_email.into(),
            from_name: "Check-in Service".to_string(),
            username: None,
            password: None,
            use_tls: false,
        }
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }
}

impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(
            env_or_default("SMTP_HOST", "localhost"),
            env_parse_or("SMTP_PORT", 1025)?,
            env_or_default("SMTP_FROM_EMAIL", "noreply@factory.com"),
        )
        .with_tls(env_parse_or("SMTP_USE_TLS", false)?);
        config.from_name = env_or_default("SMTP_FROM_NAME", "Check-in Service");

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            config = config.with_credentials(username, password);
        }
        Ok(config)
    }
}

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl SmtpEmailSender {
    pub fn new(config: SmtpConfig) -> Result<Self, EmailError> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("{}: {e}", config.from_email)))?;

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.port(config.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };
        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            host: config.host,
        })
    }

    fn build_message(&self, email: &EmailContent) -> Result<Message, EmailError> {
        let to: Mailbox = email
            .to_email
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("{}: {e}", email.to_email)))?;

        Ok(Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.text_body.clone())?)
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_shift_summary(&self, address: &str, hours_worked: f64) -> Result<(), EmailError> {
        let email = EmailContent::shift_summary(address, hours_worked);
        debug!(to = %email.to_email, host = %self.host, "Sending shift summary via SMTP");

        let message = self.build_message(&email)?;
        let response = self.transport.send(message).await.map_err(|e| {
            error!(to = %email.to_email, error = %e, "Failed to send email via SMTP");
            EmailError::from(e)
        })?;

        info!(
            to = %email.to_email,
            code = %response.code(),
            "Shift summary sent"
        );
        Ok(())
    }
}
