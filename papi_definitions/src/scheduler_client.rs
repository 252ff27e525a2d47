//! HTTP client for the backing Scheduler: a job-submit/job-status/job-stop
//! API over HTTPS/JSON (spec.md glossary). This is the one external
//! collaborator nearly every component touches, so it is kept as a single
//! thin client analogous to the teacher's `vault::Vault` — one struct
//! holding a `reqwest::Client` plus connection info, with narrow typed
//! methods instead of exposing the raw HTTP surface.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};

/// A resource request/allocation as the Scheduler reports it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceUse {
    pub cpu: i64,
    pub ram_mb: i64,
    pub disk_mb: i64,
    pub gpu: i64,
}

/// Coarse job lifecycle state as reported by the Scheduler, before PAPI's
/// own status-derivation table (spec.md §4.5) projects it for users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerJobState {
    Pending,
    Running,
    Lost,
    Dead,
}

/// A single allocation of a task within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub task_name: String,
    pub node_id: String,
    pub healthy: bool,
    pub exit_code: Option<i32>,
    pub failure_message: Option<String>,
}

/// A job as reported by the Scheduler's status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub owner: String,
    pub namespace: String,
    pub state: SchedulerJobState,
    pub has_allocation: bool,
    pub allocation_placing: bool,
    pub user_initiated_stop: bool,
    pub placement_failed: bool,
    pub resources: ResourceUse,
    pub allocations: Vec<Allocation>,
    pub node_id: Option<String>,
    /// The `KIND`/`WORKLOAD_NAME` job metadata PAPI stamps on submit
    /// (spec.md §4.3 computed fields), read back so `list`/`get` never need
    /// PAPI-side state to know what a job is.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub workload_name: Option<String>,
}

/// The Scheduler's fixed name for a job's primary task, as stamped by every
/// job template this crate renders.
pub const MAIN_TASK_NAME: &str = "main";

impl JobStatus {
    pub fn main_allocation(&self) -> Option<&Allocation> {
        self.allocations
            .iter()
            .filter(|a| a.task_name == MAIN_TASK_NAME)
            .last()
    }
}

/// Node capacity/usage as reported by the Scheduler's node-list endpoint
/// (feeds C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub eligible: bool,
    pub ready: bool,
    pub lost: bool,
    pub rescheduling: bool,
    pub pool_tags: Vec<String>,
    pub capacity: ResourceUse,
    pub gpu_model: Option<String>,
    pub reserved: ResourceUse,
    pub vo: Option<String>,
    pub reallocations: u64,
}

#[derive(Clone)]
pub struct SchedulerClient {
    client: reqwest::Client,
    addr: String,
}

impl SchedulerClient {
    pub fn new(client: reqwest::Client, addr: impl Into<String>) -> SchedulerClient {
        SchedulerClient {
            client,
            addr: addr.into(),
        }
    }

    pub fn with_default_client(addr: impl Into<String>, timeout: Duration) -> SchedulerClient {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds");
        SchedulerClient::new(client, addr)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.addr.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Submits a rendered job spec (an opaque string from the template
    /// renderer) to the Scheduler's parse-then-run endpoint.
    pub async fn submit(&self, rendered_spec: &str) -> Result<String> {
        let resp = self
            .client
            .post(self.url("v1/jobs"))
            .header("content-type", "application/json")
            .body(rendered_spec.to_string())
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        #[derive(Deserialize)]
        struct SubmitResponse {
            job_id: String,
        }
        let parsed: SubmitResponse = resp.json().await?;
        Ok(parsed.job_id)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let resp = self
            .client
            .get(self.url(&format!("v1/jobs/{}", job_id)))
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(resp.json().await?)
    }

    /// Purges a job. Must succeed from any state (queued, running, dead) —
    /// spec.md §4.5 delete protocol.
    pub async fn purge(&self, job_id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("v1/jobs/{}?purge=true", job_id)))
            .send()
            .await?;
        if !resp.status().is_success() && resp.status().as_u16() != 404 {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(())
    }

    /// Jobs owned by `owner` in `namespace`, filtered on the `owner`
    /// metadata field (spec.md §4.2 algorithm).
    pub async fn jobs_by_owner(&self, namespace: &str, owner: &str) -> Result<Vec<JobStatus>> {
        let mut params = BTreeMap::new();
        params.insert("namespace", namespace);
        params.insert("owner", owner);
        let resp = self
            .client
            .get(self.url("v1/jobs"))
            .query(&params)
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(resp.json().await?)
    }

    /// All jobs in `namespace` regardless of owner, used by the Try-Me
    /// Controller to enforce the per-VO concurrency cap (spec.md §4.7).
    pub async fn jobs_by_namespace(&self, namespace: &str) -> Result<Vec<JobStatus>> {
        let resp = self
            .client
            .get(self.url("v1/jobs"))
            .query(&[("namespace", namespace)])
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(resp.json().await?)
    }

    pub async fn nodes(&self) -> Result<Vec<NodeStatus>> {
        let resp = self.client.get(self.url("v1/nodes")).send().await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(resp.json().await?)
    }

    /// Looks up the node a running job's main allocation is pinned to, so
    /// the Snapshot Orchestrator can submit a node-constrained batch job
    /// (spec.md §4.6).
    pub async fn node_for_job(&self, job_id: &str) -> Result<String> {
        let status = self.status(job_id).await?;
        status
            .node_id
            .ok_or_else(|| ErrorKind::BadRequest(format!("job {} has no allocated node", job_id)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn submit_returns_job_id_on_success() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/v1/jobs")
            .with_status(200)
            .with_body(r#"{"job_id": "abc-123"}"#)
            .create_async()
            .await;
        let client = SchedulerClient::new(reqwest::Client::new(), server.url());
        let id = client.submit("{}").await.unwrap();
        assert_eq!(id, "abc-123");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn submit_surfaces_backend_message_verbatim() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/jobs")
            .with_status(400)
            .with_body("bad template: missing field 'x'")
            .create_async()
            .await;
        let client = SchedulerClient::new(reqwest::Client::new(), server.url());
        let err = client.submit("{}").await.unwrap_err();
        match err.kind() {
            ErrorKind::BackendError(msg) => assert_eq!(msg, "bad template: missing field 'x'"),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[tokio::test]
    async fn jobs_by_namespace_returns_parsed_list() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/jobs")
            .match_query(mockito::Matcher::UrlEncoded("namespace".into(), "vo-a".into()))
            .with_status(200)
            .with_body(
                r#"[{"job_id":"j1","owner":"alice","namespace":"vo-a","state":"running",
                    "has_allocation":true,"allocation_placing":false,"user_initiated_stop":false,
                    "placement_failed":false,"resources":{"cpu":0,"ram_mb":0,"disk_mb":0,"gpu":0},
                    "allocations":[],"node_id":null}]"#,
            )
            .create_async()
            .await;
        let client = SchedulerClient::new(reqwest::Client::new(), server.url());
        let jobs = client.jobs_by_namespace("vo-a").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].owner, "alice");
    }

    #[tokio::test]
    async fn purge_tolerates_404() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let client = SchedulerClient::new(reqwest::Client::new(), server.url());
        assert!(client.purge("missing-job").await.is_ok());
    }
}
