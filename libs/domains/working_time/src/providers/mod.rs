//! Downstream side effects of the check-out jobs.
//!
//! Each job performs exactly one downstream call: the labor job notifies the
//! legacy labor system, the email job sends the shift summary.

mod legacy_api;
mod smtp;

pub use legacy_api::{HttpLegacyClient, LegacyApiConfig};
pub use smtp::{SmtpConfig, SmtpEmailSender};

use async_trait::async_trait;

use crate::error::{EmailError, LegacyApiError};
use crate::events::LaborJobEvent;

/// Client for the legacy labor system.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LegacyApiClient: Send + Sync {
    /// Record a check-out; any non-2xx answer or transport failure is an error.
    async fn record_check_out(&self, event: &LaborJobEvent) -> Result<(), LegacyApiError>;
}

/// Sends the shift summary email.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_shift_summary(&self, address: &str, hours_worked: f64) -> Result<(), EmailError>;
}

/// Plain-text email ready for sending.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailContent {
    pub to_email: String,
    pub subject: String,
    pub text_body: String,
}

impl EmailContent {
    pub const SHIFT_SUMMARY_SUBJECT: &'static str = "Work Shift Summary";

    pub fn shift_summary(address: impl Into<String>, hours_worked: f64) -> Self {
        Self {
            to_email: address.into(),
            subject: Self::SHIFT_SUMMARY_SUBJECT.to_string(),
            text_body: format!(
                "Hello,\n\nYou have successfully checked out. Total hours worked: {hours_worked:.2} hours."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_summary_content() {
        let email = EmailContent::shift_summary("E-7@factory.com", 7.456);

        assert_eq!(email.to_email, "E-7@factory.com");
        assert_eq!(email.subject, "Work Shift Summary");
        assert_eq!(
            email.text_body,
            "Hello,\n\nYou have successfully checked out. Total hours worked: 7.46 hours."
        );
    }
}
