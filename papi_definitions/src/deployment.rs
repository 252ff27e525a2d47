//! C5 — Deployment Controller.
//!
//! PAPI holds no persistent deployment state of its own (spec.md §3): the
//! Scheduler's job and its allocations are the source of truth. This module
//! holds (a) the pure status-derivation table of spec.md §4.5, independent
//! of any I/O so it can be exhaustively unit tested, and (b) the
//! `DeploymentController` that runs the 8-step create protocol and the
//! read/delete operations against the live collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::CatalogBackend;
use crate::config::Config;
use crate::error::{ErrorKind, Result};
use crate::mailer::{Mailer, Notification};
use crate::quota::{QuotaLedger, ResourceRequest};
use crate::scheduler_client::{JobStatus, SchedulerClient, SchedulerJobState};
use crate::secrets::SecretsBroker;
use crate::template::{compute_fields, flatten_user_config, render, validate_user_config, ComputeFieldsInput};
use crate::workload::{UserConfig, WorkloadKind};

/// User-facing status, derived from Scheduler state (spec.md §4.5 table).
/// Never stored; recomputed on every `get`/`list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserFacingStatus {
    Queued,
    Starting,
    Running,
    Error,
    Complete,
    Down,
    Deleted,
}

/// Derives the user-facing status from a Scheduler `JobStatus`, following
/// the table in spec.md §4.5 exactly, in row order.
pub fn derive_status(job: &JobStatus, kind: WorkloadKind) -> (UserFacingStatus, Option<String>) {
    if job.state == SchedulerJobState::Dead && job.user_initiated_stop {
        return (UserFacingStatus::Deleted, None);
    }
    if job.state == SchedulerJobState::Dead && job.placement_failed {
        return (
            UserFacingStatus::Error,
            job.main_allocation().and_then(|a| a.failure_message.clone()),
        );
    }
    if job.state == SchedulerJobState::Lost {
        return (UserFacingStatus::Down, None);
    }
    if job.state == SchedulerJobState::Pending {
        return if job.has_allocation && job.allocation_placing {
            (UserFacingStatus::Starting, None)
        } else if !job.has_allocation {
            (UserFacingStatus::Queued, None)
        } else {
            (UserFacingStatus::Starting, None)
        };
    }
    if job.state == SchedulerJobState::Running {
        if let Some(alloc) = job.allocations.iter().find(|a| a.exit_code.map(|c| c != 0).unwrap_or(false)) {
            return (UserFacingStatus::Error, alloc.failure_message.clone());
        }
        if kind.is_batch_only() {
            if let Some(main) = job.main_allocation() {
                if main.exit_code == Some(0) {
                    return (UserFacingStatus::Complete, None);
                }
            }
        }
        return (UserFacingStatus::Running, None);
    }
    // Dead, not user-initiated, not a placement failure: treat as error so
    // nothing silently disappears from `list`.
    (
        UserFacingStatus::Error,
        job.main_allocation().and_then(|a| a.failure_message.clone()),
    )
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocatedResources {
    pub cpu: i64,
    pub ram_mb: i64,
    pub disk_mb: i64,
    pub gpu: i64,
    pub gpu_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub uuid: Uuid,
    pub owner: String,
    pub owner_name: String,
    pub owner_email: String,
    pub vo: String,
    pub kind: WorkloadKind,
    pub name: String,
    pub submitted_at: DateTime<Utc>,
    pub status: UserFacingStatus,
    pub endpoints: BTreeMap<String, String>,
    pub resources: AllocatedResources,
    pub error: Option<String>,
}

/// Computes the endpoint map the same way the template's service tags do:
/// `https://<role>-<hostname>.<base_domain>`. PAPI never stores these; it
/// recomputes them from the VO domain and hostname (spec.md §4.5 "Endpoint
/// discovery").
pub fn compute_endpoints(roles: &[&str], hostname: &str, base_domain: &str) -> BTreeMap<String, String> {
    roles
        .iter()
        .map(|role| {
            (
                role.to_string(),
                format!("https://{}-{}.{}", role, hostname, base_domain),
            )
        })
        .collect()
}

/// Everything needed to create one deployment, gathered by the HTTP edge
/// from the authenticated request.
pub struct CreateRequest {
    pub owner: String,
    pub owner_name: String,
    pub owner_email: String,
    pub vo: String,
    pub kind: WorkloadKind,
    pub name: String,
    pub config: UserConfig,
}

pub struct CreateResult {
    pub uuid: Uuid,
    pub endpoints: BTreeMap<String, String>,
}

/// Roles exposed per workload kind, used purely to predict endpoint URLs
/// before the job reaches running state (spec.md §4.5 step 8).
fn roles_for(kind: WorkloadKind) -> &'static [&'static str] {
    match kind {
        WorkloadKind::Module | WorkloadKind::Tool => &["api", "ide"],
        WorkloadKind::BatchInference | WorkloadKind::TryMe | WorkloadKind::Snapshot => &["api"],
        WorkloadKind::FunctionService => &["inference"],
    }
}

pub struct DeploymentController {
    catalog: Arc<dyn CatalogBackend>,
    quota: QuotaLedger,
    secrets: SecretsBroker,
    scheduler: SchedulerClient,
    mailer: Option<Mailer>,
    config: Arc<Config>,
}

impl DeploymentController {
    pub fn new(
        catalog: Arc<dyn CatalogBackend>,
        quota: QuotaLedger,
        secrets: SecretsBroker,
        scheduler: SchedulerClient,
        mailer: Option<Mailer>,
        config: Arc<Config>,
    ) -> DeploymentController {
        DeploymentController {
            catalog,
            quota,
            secrets,
            scheduler,
            mailer,
            config,
        }
    }

    /// Exposes the Scheduler handle for callers that need to re-read live
    /// jobs outside the create/list/get/delete protocol, e.g. the try-me
    /// concurrency check (spec.md §4.7).
    pub fn scheduler(&self) -> &SchedulerClient {
        &self.scheduler
    }

    /// Current per-user resource usage for `vo`, alongside the caps that
    /// apply to them, for the stats route's quota-usage view (spec.md §6).
    pub async fn quota_usage(&self, vo: &str, owner: &str) -> Result<(crate::quota::QuotaSnapshot, crate::vo::ResourceCaps)> {
        let vo_mapping = self
            .config
            .vo
            .get(vo)
            .ok_or_else(|| ErrorKind::BadRequest(format!("unknown VO '{}'", vo)))?;
        let (per_user, _per_vo) = self.config.caps_for(vo);
        let snapshot = self.quota.usage(&vo_mapping.namespace, owner).await?;
        Ok((snapshot, per_user))
    }

    fn templates_path_for(&self, kind: WorkloadKind, name: &str) -> String {
        format!("{}/{}", kind, name)
    }

    /// The 8-step create protocol of spec.md §4.5.
    pub async fn create(&self, req: CreateRequest, job_template: &str) -> Result<CreateResult> {
        // Step 1: resolve kind/name against the catalog.
        let item = self.catalog.metadata(req.kind, &req.name).await.map_err(|e| {
            if matches!(e.kind(), ErrorKind::UnknownWorkload(_, _)) {
                e
            } else {
                ErrorKind::UnknownWorkload(req.kind.to_string(), req.name.clone()).into()
            }
        })?;

        // Step 2: validate config against the schema.
        validate_user_config(&item.config_schema, &req.config)?;

        // Step 3: docker-image allow-list, when the user may override it.
        if let Some(general) = req.config.get("general") {
            if let Some(image) = general.get("docker_image").and_then(|v| v.as_str()) {
                if !self.config.image_allow_list.is_allowed(image) {
                    return Err(ErrorKind::BadRequest(format!(
                        "docker image '{}' is not in the allow-list",
                        image
                    ))
                    .into());
                }
            }
        }

        let vo_mapping = self
            .config
            .vo
            .get(&req.vo)
            .ok_or_else(|| ErrorKind::BadRequest(format!("unknown VO '{}'", req.vo)))?;

        // Step 4: admission.
        let (per_user, _per_vo) = self.config.caps_for(&req.vo);
        let requested = resource_request_from_config(&req.config);
        self.quota
            .check(&vo_mapping.namespace, &req.owner, req.kind, requested, &per_user)
            .await?;

        // Step 5: assemble substitution map; fetch secrets.
        let mut subs = flatten_user_config(&req.config);
        let hostname = req
            .config
            .get("general")
            .and_then(|g| g.get("hostname"))
            .and_then(|v| v.as_str());
        let gpu_model = req
            .config
            .get("hardware")
            .and_then(|h| h.get("gpu_model"))
            .and_then(|v| v.as_str());
        let ram_mb = req
            .config
            .get("hardware")
            .and_then(|h| h.get("ram"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        let computed = compute_fields(ComputeFieldsInput {
            kind: req.kind,
            workload_name: &req.name,
            user_hostname: hostname,
            namespace: &vo_mapping.namespace,
            base_domain: &vo_mapping.domain,
            owner: &req.owner,
            owner_name: &req.owner_name,
            owner_email: &req.owner_email,
            ram_mb,
            gpu_model,
        });
        let hostname_resolved = computed.hostname.clone();
        for (k, v) in computed.into_substitution_map() {
            subs.insert(k, v);
        }

        for secret_field in declared_secret_fields(&req.config) {
            match self
                .secrets
                .get(&vo_mapping.secret_root, &req.vo, &req.owner, &secret_field)
                .await
            {
                Ok(value) => {
                    subs.insert(secret_field.to_uppercase().replace('/', "_"), value);
                }
                Err(e) if self.config.is_prod => return Err(e),
                Err(e) => warn!("dev mode: ignoring missing secret {}: {}", secret_field, e),
            }
        }

        // Step 6: render.
        let rendered = render(job_template, &subs)?;

        // Step 7: submit.
        let job_id = match self.scheduler.submit(&rendered).await {
            Ok(id) => id,
            Err(e) => {
                if let Some(mailer) = &self.mailer {
                    if let Err(send_err) = mailer
                        .send(Notification::deployment_failed(&req.owner_email, &req.name, &e.to_string()))
                        .await
                    {
                        warn!("failed to notify {} of deployment failure: {}", req.owner_email, send_err);
                    }
                }
                return Err(e);
            }
        };

        if let Some(mailer) = &self.mailer {
            if let Err(e) = mailer
                .send(Notification::deployment_submitted(&req.owner_email, &req.name, &job_id))
                .await
            {
                warn!("failed to notify {} of deployment submit: {}", req.owner_email, e);
            }
        }

        // Step 8: predicted endpoints.
        let endpoints = compute_endpoints(roles_for(req.kind), &hostname_resolved, &vo_mapping.domain);
        info!("submitted {} {} as job {} for {}", req.kind, req.name, job_id, req.owner);

        Ok(CreateResult {
            uuid: computed.job_uuid,
            endpoints,
        })
    }

    /// Lists a user's deployments, optionally filtered by VO/kinds. Property
    /// 1 (spec.md §8): every returned deployment's owner equals the caller.
    pub async fn list(&self, owner: &str, vo: &str, kinds: Option<&[WorkloadKind]>) -> Result<Vec<Deployment>> {
        let vo_mapping = self
            .config
            .vo
            .get(vo)
            .ok_or_else(|| ErrorKind::BadRequest(format!("unknown VO '{}'", vo)))?;
        let jobs = self.scheduler.jobs_by_owner(&vo_mapping.namespace, owner).await?;
        let mut out = Vec::new();
        for job in jobs {
            if job.owner != owner {
                continue;
            }
            let kind = infer_kind_from_job(&job, WorkloadKind::Module);
            if let Some(kinds) = kinds {
                if !kinds.contains(&kind) {
                    continue;
                }
            }
            out.push(job_to_deployment(&job, kind, vo, owner));
        }
        Ok(out)
    }

    pub async fn get(&self, owner: &str, vo: &str, kind: WorkloadKind, uuid: &Uuid) -> Result<Deployment> {
        let vo_mapping = self
            .config
            .vo
            .get(vo)
            .ok_or_else(|| ErrorKind::BadRequest(format!("unknown VO '{}'", vo)))?;
        let job = self.scheduler.status(&uuid.to_string()).await?;
        if job.owner != owner {
            return Err(ErrorKind::Forbidden("deployment not owned by caller".into()).into());
        }
        let kind = infer_kind_from_job(&job, kind);
        let _ = &vo_mapping.namespace;
        Ok(job_to_deployment(&job, kind, vo, owner))
    }

    /// Verifies ownership, then purges unconditionally of job state
    /// (spec.md §4.5 delete protocol).
    pub async fn delete(&self, owner: &str, owner_email: &str, uuid: &Uuid) -> Result<()> {
        let job = self.scheduler.status(&uuid.to_string()).await?;
        if job.owner != owner {
            return Err(ErrorKind::Forbidden("cannot delete a deployment you do not own".into()).into());
        }
        if let Err(e) = self.scheduler.purge(&uuid.to_string()).await {
            if let Some(mailer) = &self.mailer {
                let name = job.workload_name.clone().unwrap_or_else(|| uuid.to_string());
                if let Err(send_err) = mailer
                    .send(Notification::deployment_failed(owner_email, &name, &e.to_string()))
                    .await
                {
                    warn!("failed to notify {} of delete failure: {}", owner_email, send_err);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

fn resource_request_from_config(config: &UserConfig) -> ResourceRequest {
    let hw = config.get("hardware");
    let get_i64 = |field: &str| hw.and_then(|h| h.get(field)).and_then(|v| v.as_i64()).unwrap_or(0);
    ResourceRequest {
        cpu: get_i64("cpu_num"),
        gpu: get_i64("gpu_num"),
        ram_mb: get_i64("ram"),
        disk_mb: get_i64("disk"),
    }
}

/// Secret dependencies declared in the `storage`/workload-specific sections
/// that need resolving from the Secrets Broker (spec.md §4.3 step 4:
/// MLflow credentials, rclone password, Harbor robot password, Hugging Face
/// token).
fn declared_secret_fields(config: &UserConfig) -> Vec<String> {
    const SECRET_FIELDS: &[&str] = &[
        "rclone_password",
        "mlflow_password",
        "harbor_robot_password",
        "hf_token",
    ];
    let mut out = Vec::new();
    for section in config.values() {
        for field in section.keys() {
            if SECRET_FIELDS.contains(&field.as_str()) {
                out.push(field.clone());
            }
        }
    }
    out
}

/// Recovers the `WorkloadKind` PAPI stamped as job metadata at submit time
/// (via the `KIND` computed field), falling back to `fallback` for jobs
/// from before that metadata existed.
fn infer_kind_from_job(job: &JobStatus, fallback: WorkloadKind) -> WorkloadKind {
    job.kind
        .as_deref()
        .and_then(|k| k.parse().ok())
        .unwrap_or(fallback)
}

fn job_to_deployment(job: &JobStatus, kind: WorkloadKind, vo: &str, owner: &str) -> Deployment {
    let (status, error) = derive_status(job, kind);
    Deployment {
        uuid: Uuid::parse_str(&job.job_id).unwrap_or_else(|_| Uuid::nil()),
        owner: owner.to_string(),
        owner_name: String::new(),
        owner_email: String::new(),
        vo: vo.to_string(),
        kind,
        name: job.workload_name.clone().unwrap_or_else(|| job.job_id.clone()),
        submitted_at: Utc::now(),
        status,
        endpoints: BTreeMap::new(),
        resources: AllocatedResources {
            cpu: job.resources.cpu,
            ram_mb: job.resources.ram_mb,
            disk_mb: job.resources.disk_mb,
            gpu: job.resources.gpu,
            gpu_model: None,
        },
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler_client::{Allocation, ResourceUse};

    fn base_job() -> JobStatus {
        JobStatus {
            job_id: "11111111-1111-1111-1111-111111111111".into(),
            owner: "alice".into(),
            namespace: "vo-a".into(),
            state: SchedulerJobState::Pending,
            has_allocation: false,
            allocation_placing: false,
            user_initiated_stop: false,
            placement_failed: false,
            resources: ResourceUse::default(),
            allocations: vec![],
            node_id: None,
            kind: None,
            workload_name: None,
        }
    }

    #[test]
    fn pending_no_allocation_is_queued() {
        let job = base_job();
        assert_eq!(derive_status(&job, WorkloadKind::Module).0, UserFacingStatus::Queued);
    }

    #[test]
    fn pending_allocation_placing_is_starting() {
        let mut job = base_job();
        job.has_allocation = true;
        job.allocation_placing = true;
        assert_eq!(derive_status(&job, WorkloadKind::Module).0, UserFacingStatus::Starting);
    }

    #[test]
    fn running_healthy_is_running() {
        let mut job = base_job();
        job.state = SchedulerJobState::Running;
        job.allocations.push(Allocation {
            task_name: "main".into(),
            node_id: "n1".into(),
            healthy: true,
            exit_code: None,
            failure_message: None,
        });
        assert_eq!(derive_status(&job, WorkloadKind::Module).0, UserFacingStatus::Running);
    }

    #[test]
    fn running_with_nonzero_exit_is_error() {
        let mut job = base_job();
        job.state = SchedulerJobState::Running;
        job.allocations.push(Allocation {
            task_name: "sidecar".into(),
            node_id: "n1".into(),
            healthy: false,
            exit_code: Some(1),
            failure_message: Some("oom".into()),
        });
        let (status, err) = derive_status(&job, WorkloadKind::Module);
        assert_eq!(status, UserFacingStatus::Error);
        assert_eq!(err.as_deref(), Some("oom"));
    }

    #[test]
    fn batch_kind_main_exit_zero_is_complete() {
        let mut job = base_job();
        job.state = SchedulerJobState::Running;
        job.allocations.push(Allocation {
            task_name: "main".into(),
            node_id: "n1".into(),
            healthy: true,
            exit_code: Some(0),
            failure_message: None,
        });
        assert_eq!(
            derive_status(&job, WorkloadKind::BatchInference).0,
            UserFacingStatus::Complete
        );
    }

    #[test]
    fn lost_node_is_down() {
        let mut job = base_job();
        job.state = SchedulerJobState::Lost;
        assert_eq!(derive_status(&job, WorkloadKind::Module).0, UserFacingStatus::Down);
    }

    #[test]
    fn dead_user_initiated_is_deleted() {
        let mut job = base_job();
        job.state = SchedulerJobState::Dead;
        job.user_initiated_stop = true;
        assert_eq!(derive_status(&job, WorkloadKind::Module).0, UserFacingStatus::Deleted);
    }

    #[test]
    fn dead_placement_failed_is_error() {
        let mut job = base_job();
        job.state = SchedulerJobState::Dead;
        job.placement_failed = true;
        assert_eq!(derive_status(&job, WorkloadKind::Module).0, UserFacingStatus::Error);
    }

    #[test]
    fn endpoints_follow_role_hostname_domain_formula() {
        let endpoints = compute_endpoints(&["api", "ide"], "demo-app", "a.deploy.example");
        assert_eq!(
            endpoints.get("ide").map(String::as_str),
            Some("https://ide-demo-app.a.deploy.example")
        );
    }
}
