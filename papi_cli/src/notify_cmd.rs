//! `papi notify test-send`: sends a test notification through the Mailer
//! client so an operator can verify `backends.mailer_addr` is reachable
//! and correctly configured without waiting for a real deployment event.

use papi_definitions::mailer::{Mailer, Notification};

use crate::Result;

pub async fn test_send(mailer_addr: &str, from: &str, to: &str) -> Result<()> {
    let mailer = Mailer::new(reqwest::Client::new(), mailer_addr, from.to_string());
    mailer
        .send(Notification::deployment_submitted(to, "papi-notify-test", "test-job"))
        .await?;
    info!("test notification sent to {} via {}", to, mailer_addr);
    Ok(())
}
