//! C6 — Snapshot Orchestrator.
//!
//! Submits a node-pinned batch job that commits a running deployment's main
//! container to a tagged image and pushes it to the Registry under a
//! user-namespaced repository (spec.md §4.6). PAPI itself never touches the
//! container filesystem; the batch job template does the commit/push, the
//! same division of labour as `DeploymentController::create` delegates the
//! workload itself to the Scheduler.

use chrono::{DateTime, Utc};
use log::{info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, Result};
use crate::mailer::{Mailer, Notification};
use crate::registry_client::{RegistryClient, RegistryImage};
use crate::scheduler_client::SchedulerClient;
use crate::template::render;

/// One GiB, used for the size caps in spec.md §4.6.
const GIB: i64 = 1024 * 1024 * 1024;
const MAX_CONTAINER_BYTES: i64 = 10 * GIB;
const MAX_USER_QUOTA_BYTES: i64 = 15 * GIB;

#[derive(Debug, Clone, serde_derive::Serialize, serde_derive::Deserialize)]
pub struct Snapshot {
    pub tag: String,
    pub owner: String,
    pub title: String,
    pub description: String,
    pub vo: String,
    pub submitted_at: DateTime<Utc>,
    pub size_bytes: i64,
}

pub struct SnapshotRequest {
    pub owner: String,
    pub owner_email: String,
    pub vo: String,
    pub deployment_uuid: Uuid,
    pub title: String,
    pub description: String,
}

pub struct SnapshotController {
    scheduler: SchedulerClient,
    registry: RegistryClient,
    mailer: Option<Mailer>,
    user_quota_bytes: i64,
    max_container_bytes: i64,
}

impl SnapshotController {
    pub fn new(scheduler: SchedulerClient, registry: RegistryClient, mailer: Option<Mailer>) -> SnapshotController {
        SnapshotController {
            scheduler,
            registry,
            mailer,
            user_quota_bytes: MAX_USER_QUOTA_BYTES,
            max_container_bytes: MAX_CONTAINER_BYTES,
        }
    }

    pub fn with_caps(mut self, user_quota_bytes: i64, max_container_bytes: i64) -> SnapshotController {
        self.user_quota_bytes = user_quota_bytes;
        self.max_container_bytes = max_container_bytes;
        self
    }

    fn repository_for(&self, vo: &str, owner: &str) -> String {
        format!("snapshots/{}/{}", vo, owner)
    }

    /// Resolves collisions on an identical timestamp tag by appending a
    /// monotonic suffix observed via a pre-push existence check (resolves
    /// SPEC_FULL.md Open Question #3).
    fn resolve_tag(existing: &[RegistryImage], base_tag: &str) -> String {
        if !existing.iter().any(|i| i.tag == base_tag) {
            return base_tag.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", base_tag, n);
            if !existing.iter().any(|i| i.tag == candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Takes a snapshot of `req.deployment_uuid`'s main container. Rejects
    /// synchronously with `too-large` if the target's current allocated
    /// disk already exceeds the single-container cap (spec.md §4.6 step (b),
    /// S6); otherwise submits a batch job constrained to the same node as
    /// the running allocation, which does the commit/push and reports back
    /// via job metadata once complete.
    pub async fn create(&self, req: SnapshotRequest, batch_template: &str) -> Result<Snapshot> {
        let job_id = req.deployment_uuid.to_string();
        let status = self.scheduler.status(&job_id).await?;
        if status.owner != req.owner {
            return Err(ErrorKind::Forbidden("deployment not owned by caller".into()).into());
        }
        let container_bytes = status.resources.disk_mb * 1024 * 1024;
        if container_bytes > self.max_container_bytes {
            return Err(ErrorKind::BadRequest("too-large".into()).into());
        }
        let node_id = self.scheduler.node_for_job(&job_id).await?;

        let repository = self.repository_for(&req.vo, &req.owner);
        let used = self.registry.sum_owner_usage(&repository, &req.owner).await?;
        if used >= self.user_quota_bytes {
            return Err(ErrorKind::quota_resource("snapshot storage", self.user_quota_bytes, used).into());
        }

        let existing = self.registry.list_by_owner(&repository, &req.owner).await?;
        let submitted_at = Utc::now();
        let base_tag = format!("{}_{}", job_id, submitted_at.timestamp());
        let tag = Self::resolve_tag(&existing, &base_tag);

        let mut subs = std::collections::BTreeMap::new();
        subs.insert("SOURCE_JOB_ID".into(), job_id.clone());
        subs.insert("TARGET_NODE".into(), node_id);
        subs.insert("REPOSITORY".into(), repository);
        subs.insert("TAG".into(), tag.clone());
        subs.insert("OWNER".into(), req.owner.clone());
        subs.insert("TITLE".into(), req.title.clone());
        subs.insert("DESCRIPTION".into(), req.description.clone());
        subs.insert("VO".into(), req.vo.clone());
        subs.insert(
            "MAX_CONTAINER_BYTES".into(),
            self.max_container_bytes.to_string(),
        );

        let rendered = render(batch_template, &subs)?;
        let snapshot_job_id = self.scheduler.submit(&rendered).await?;
        info!(
            "submitted snapshot job {} for deployment {} ({})",
            snapshot_job_id, job_id, tag
        );

        if let Some(mailer) = &self.mailer {
            if let Err(e) = mailer
                .send(Notification::snapshot_ready(&req.owner_email, &req.title, &tag))
                .await
            {
                warn!("failed to notify {} of snapshot {}: {}", req.owner_email, tag, e);
            }
        }

        Ok(Snapshot {
            tag,
            owner: req.owner,
            title: req.title,
            description: req.description,
            vo: req.vo,
            submitted_at,
            size_bytes: 0,
        })
    }

    pub async fn list(&self, vo: &str, owner: &str) -> Result<Vec<RegistryImage>> {
        let repository = self.repository_for(vo, owner);
        self.registry.list_by_owner(&repository, owner).await
    }

    pub async fn delete(&self, vo: &str, owner: &str, tag: &str) -> Result<()> {
        let repository = self.repository_for(vo, owner);
        self.registry.delete(&repository, tag).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn image(tag: &str) -> RegistryImage {
        RegistryImage {
            repository: "snapshots/vo-a/alice".into(),
            tag: tag.into(),
            size_bytes: 1000,
            labels: Map::new(),
        }
    }

    #[test]
    fn resolve_tag_passes_through_when_unused() {
        let existing = vec![image("other")];
        assert_eq!(SnapshotController::resolve_tag(&existing, "job_100"), "job_100");
    }

    #[test]
    fn resolve_tag_appends_monotonic_suffix_on_collision() {
        let existing = vec![image("job_100"), image("job_100_2")];
        assert_eq!(SnapshotController::resolve_tag(&existing, "job_100"), "job_100_3");
    }

    #[tokio::test]
    async fn create_rejects_when_quota_already_exhausted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/v1/jobs/".into()))
            .with_status(200)
            .with_body(
                r#"{"job_id":"00000000-0000-0000-0000-000000000000","owner":"alice",
                    "namespace":"vo-a","state":"running","has_allocation":true,
                    "allocation_placing":false,"user_initiated_stop":false,
                    "placement_failed":false,"resources":{"cpu":0,"ram_mb":0,"disk_mb":0,"gpu":0},
                    "allocations":[],"node_id":"node-1"}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", mockito::Matcher::Regex("^/v2/_catalog/filter".into()))
            .with_status(200)
            .with_body(
                r#"[{"repository":"snapshots/vo-a/alice","tag":"x","size_bytes":16106127360,"labels":{}}]"#,
            )
            .create_async()
            .await;
        let scheduler = SchedulerClient::new(reqwest::Client::new(), server.url());
        let registry = RegistryClient::new(reqwest::Client::new(), server.url());
        let ctrl = SnapshotController::new(scheduler, registry, None);
        let req = SnapshotRequest {
            owner: "alice".into(),
            owner_email: "alice@x.example".into(),
            vo: "vo-a".into(),
            deployment_uuid: Uuid::nil(),
            title: "t".into(),
            description: "d".into(),
        };
        let err = ctrl.create(req, "{}").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn create_rejects_oversize_container_before_touching_registry() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/v1/jobs/".into()))
            .with_status(200)
            .with_body(
                r#"{"job_id":"00000000-0000-0000-0000-000000000000","owner":"alice",
                    "namespace":"vo-a","state":"running","has_allocation":true,
                    "allocation_placing":false,"user_initiated_stop":false,
                    "placement_failed":false,"resources":{"cpu":0,"ram_mb":0,"disk_mb":12288,"gpu":0},
                    "allocations":[],"node_id":"node-1"}"#,
            )
            .create_async()
            .await;
        let scheduler = SchedulerClient::new(reqwest::Client::new(), server.url());
        let registry = RegistryClient::new(reqwest::Client::new(), server.url());
        let ctrl = SnapshotController::new(scheduler, registry, None);
        let req = SnapshotRequest {
            owner: "alice".into(),
            owner_email: "alice@x.example".into(),
            vo: "vo-a".into(),
            deployment_uuid: Uuid::nil(),
            title: "t".into(),
            description: "d".into(),
        };
        let err = ctrl.create(req, "{}").await.unwrap_err();
        match err.kind() {
            ErrorKind::BadRequest(msg) => assert_eq!(msg, "too-large"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_rejects_snapshot_of_another_users_deployment() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/v1/jobs/".into()))
            .with_status(200)
            .with_body(
                r#"{"job_id":"00000000-0000-0000-0000-000000000000","owner":"alice",
                    "namespace":"vo-a","state":"running","has_allocation":true,
                    "allocation_placing":false,"user_initiated_stop":false,
                    "placement_failed":false,"resources":{"cpu":0,"ram_mb":0,"disk_mb":0,"gpu":0},
                    "allocations":[],"node_id":"node-1"}"#,
            )
            .create_async()
            .await;
        let scheduler = SchedulerClient::new(reqwest::Client::new(), server.url());
        let registry = RegistryClient::new(reqwest::Client::new(), server.url());
        let ctrl = SnapshotController::new(scheduler, registry, None);
        let req = SnapshotRequest {
            owner: "bob".into(),
            owner_email: "bob@x.example".into(),
            vo: "vo-a".into(),
            deployment_uuid: Uuid::nil(),
            title: "t".into(),
            description: "d".into(),
        };
        let err = ctrl.create(req, "{}").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Forbidden(_)));
    }
}
