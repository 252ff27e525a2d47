//! Supplemented notification collaborator (SPEC_FULL.md §2), grounded on
//! the teacher's `slack.rs`/`grafana.rs`: a thin HTTP client for one outbound
//! side-channel, built to never block the calling operation on failure.
//! Callers treat a mailer error as best-effort — see
//! `DeploymentController::create`, which logs and continues rather than
//! failing the deployment.

use log::debug;
use serde_derive::Serialize;

use crate::error::Result;

/// One notification payload, built via the constructors below rather than
/// a public struct literal so every call site states which event produced
/// it.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    to: String,
    subject: String,
    body: String,
}

impl Notification {
    pub fn deployment_submitted(owner_email: &str, name: &str, job_id: &str) -> Notification {
        Notification {
            to: owner_email.to_string(),
            subject: format!("Deployment '{}' submitted", name),
            body: format!("Your deployment '{}' was submitted as job {}.", name, job_id),
        }
    }

    pub fn deployment_failed(owner_email: &str, name: &str, reason: &str) -> Notification {
        Notification {
            to: owner_email.to_string(),
            subject: format!("Deployment '{}' failed", name),
            body: format!("Your deployment '{}' hit an error: {}", name, reason),
        }
    }

    pub fn snapshot_ready(owner_email: &str, name: &str, snapshot_tag: &str) -> Notification {
        Notification {
            to: owner_email.to_string(),
            subject: format!("Snapshot of '{}' submitted", name),
            body: format!(
                "Your snapshot of '{}' was submitted as '{}' and will appear in your registry once the batch job completes.",
                name, snapshot_tag
            ),
        }
    }
}

/// A minimal client for the backing mail-relay service: one POST per
/// notification, same shape as the Scheduler/Registry clients.
#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    addr: String,
    from: String,
}

impl Mailer {
    pub fn new(client: reqwest::Client, addr: impl Into<String>, from: impl Into<String>) -> Mailer {
        Mailer {
            client,
            addr: addr.into(),
            from: from.into(),
        }
    }

    pub async fn send(&self, n: Notification) -> Result<()> {
        debug!("sending notification to {}: {}", n.to, n.subject);
        let body = serde_json::json!({
            "from": self.from,
            "to": n.to,
            "subject": n.subject,
            "body": n.body,
        });
        let resp = self
            .client
            .post(format!("{}/v1/send", self.addr.trim_end_matches('/')))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(crate::error::ErrorKind::BackendError(text).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_posts_expected_envelope() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/v1/send")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "to": "alice@x.example",
            })))
            .with_status(202)
            .create_async()
            .await;
        let mailer = Mailer::new(reqwest::Client::new(), server.url(), "papi@x.example".to_string());
        mailer
            .send(Notification::deployment_submitted("alice@x.example", "demo", "job-1"))
            .await
            .unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn send_surfaces_backend_error_on_failure_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/send")
            .with_status(500)
            .with_body("relay down")
            .create_async()
            .await;
        let mailer = Mailer::new(reqwest::Client::new(), server.url(), "papi@x.example".to_string());
        let err = mailer
            .send(Notification::deployment_submitted("alice@x.example", "demo", "job-1"))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::BackendError(_)));
    }
}
