//! Email Worker - Entry Point
//!
//! Sends shift summary emails after check-out.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    checkin_email_worker::run().await
}
