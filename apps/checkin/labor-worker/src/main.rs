//! Labor Worker - Entry Point
//!
//! Reports finished shifts to the legacy labor system.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    checkin_labor_worker::run().await
}
