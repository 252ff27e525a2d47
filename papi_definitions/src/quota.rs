//! C2 — Quota Ledger.
//!
//! Holds no state of its own: every `check`/`usage` call re-reads the
//! Scheduler's live jobs for the user (spec.md §4.2, §5 "Quota Ledger holds
//! no state"). This makes it resilient to PAPI restarts but subject to the
//! TOCTOU window documented in spec.md §5 — two concurrent creates from the
//! same user may both pass and both submit; the Scheduler is the final
//! arbiter at the cluster level.

use serde_derive::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};
use crate::scheduler_client::{JobStatus, ResourceUse, SchedulerClient, SchedulerJobState};
use crate::vo::ResourceCaps;
use crate::workload::WorkloadKind;

/// Per-user, per-VO resource totals over live deployments (spec.md §3
/// "Quota Snapshot").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct QuotaSnapshot {
    pub cpu: i64,
    pub gpu: i64,
    pub ram_mb: i64,
    pub disk_mb: i64,
    pub deployments: i64,
}

impl QuotaSnapshot {
    fn add(&mut self, r: ResourceUse) {
        self.cpu += r.cpu;
        self.gpu += r.gpu;
        self.ram_mb += r.ram_mb;
        self.disk_mb += r.disk_mb;
        self.deployments += 1;
    }
}

/// A requested resource envelope, as the Deployment/Try-Me controllers
/// assemble it from user-submitted hardware parameters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequest {
    pub cpu: i64,
    pub gpu: i64,
    pub ram_mb: i64,
    pub disk_mb: i64,
}

impl ResourceRequest {
    /// Componentwise `<=`, used to assert the monotonicity property
    /// (spec.md §8 testable property 7).
    pub fn le(&self, other: &ResourceRequest) -> bool {
        self.cpu <= other.cpu
            && self.gpu <= other.gpu
            && self.ram_mb <= other.ram_mb
            && self.disk_mb <= other.disk_mb
    }
}

/// Whether a `dead` job awaiting purge counts toward the running total.
/// Resolves SPEC_FULL.md Open Question #1.
fn counts_toward_quota(job: &JobStatus, count_dead: bool) -> bool {
    match job.state {
        SchedulerJobState::Pending | SchedulerJobState::Running | SchedulerJobState::Lost => true,
        SchedulerJobState::Dead => count_dead && !job.user_initiated_stop,
    }
}

/// The fixed tie-break order from spec.md §4.2: GPU, CPU, RAM, disk,
/// deployment count.
fn first_overflow(
    current: &QuotaSnapshot,
    requested: &ResourceRequest,
    per_user: &ResourceCaps,
) -> Option<ErrorKind> {
    if current.gpu + requested.gpu > per_user.gpu {
        return Some(ErrorKind::quota_resource("GPU", per_user.gpu, current.gpu));
    }
    if current.cpu + requested.cpu > per_user.cpu {
        return Some(ErrorKind::quota_resource("CPU", per_user.cpu, current.cpu));
    }
    if current.ram_mb + requested.ram_mb > per_user.ram_mb {
        return Some(ErrorKind::quota_resource("RAM", per_user.ram_mb, current.ram_mb));
    }
    if current.disk_mb + requested.disk_mb > per_user.disk_mb {
        return Some(ErrorKind::quota_resource("disk", per_user.disk_mb, current.disk_mb));
    }
    if current.deployments + 1 > per_user.deployments {
        return Some(ErrorKind::quota_resource(
            "deployments",
            per_user.deployments,
            current.deployments,
        ));
    }
    None
}

#[derive(Clone)]
pub struct QuotaLedger {
    scheduler: SchedulerClient,
    global_gpu_cap: i64,
    count_dead_in_quota: bool,
}

impl QuotaLedger {
    pub fn new(
        scheduler: SchedulerClient,
        global_gpu_cap: i64,
        count_dead_in_quota: bool,
    ) -> QuotaLedger {
        QuotaLedger {
            scheduler,
            global_gpu_cap,
            count_dead_in_quota,
        }
    }

    async fn live_jobs(&self, namespace: &str, user: &str) -> Result<Vec<JobStatus>> {
        Ok(self
            .scheduler
            .jobs_by_owner(namespace, user)
            .await?
            .into_iter()
            .filter(|j| counts_toward_quota(j, self.count_dead_in_quota))
            .collect())
    }

    pub async fn usage(&self, namespace: &str, user: &str) -> Result<QuotaSnapshot> {
        let jobs = self.live_jobs(namespace, user).await?;
        let mut snap = QuotaSnapshot::default();
        for j in jobs {
            snap.add(j.resources);
        }
        Ok(snap)
    }

    /// Checks whether `requested` can be admitted for `user` in `namespace`
    /// given `per_user` caps. The global per-user GPU cap is applied in
    /// addition to (and possibly stricter than) the per-user cap table,
    /// regardless of workload kind (spec.md §4.2).
    pub async fn check(
        &self,
        namespace: &str,
        user: &str,
        _kind: WorkloadKind,
        requested: ResourceRequest,
        per_user: &ResourceCaps,
    ) -> Result<()> {
        let current = self.usage(namespace, user).await?;
        let mut effective_caps = *per_user;
        if self.global_gpu_cap < effective_caps.gpu {
            effective_caps.gpu = self.global_gpu_cap;
        }
        if let Some(kind) = first_overflow(&current, &requested, &effective_caps) {
            return Err(kind.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(cpu: i64, gpu: i64, ram_mb: i64, disk_mb: i64, deployments: i64) -> ResourceCaps {
        ResourceCaps {
            cpu,
            gpu,
            ram_mb,
            disk_mb,
            deployments,
        }
    }

    #[test]
    fn tie_break_reports_gpu_first() {
        let current = QuotaSnapshot {
            cpu: 100,
            gpu: 1,
            ram_mb: 100000,
            disk_mb: 100000,
            deployments: 10,
        };
        let requested = ResourceRequest {
            cpu: 100,
            gpu: 1,
            ram_mb: 100000,
            disk_mb: 100000,
        };
        let err = first_overflow(&current, &requested, &caps(1, 1, 1, 1, 1)).unwrap();
        match err {
            ErrorKind::QuotaExceeded { resource, .. } => assert_eq!(resource, "GPU"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn tie_break_falls_through_to_cpu_when_gpu_ok() {
        let current = QuotaSnapshot {
            cpu: 8,
            gpu: 0,
            ram_mb: 0,
            disk_mb: 0,
            deployments: 0,
        };
        let requested = ResourceRequest {
            cpu: 1,
            gpu: 0,
            ram_mb: 0,
            disk_mb: 0,
        };
        let err = first_overflow(&current, &requested, &caps(8, 4, 100000, 100000, 10)).unwrap();
        match err {
            ErrorKind::QuotaExceeded { resource, .. } => assert_eq!(resource, "CPU"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn monotonic_in_request_size() {
        let current = QuotaSnapshot {
            cpu: 4,
            gpu: 0,
            ram_mb: 4000,
            disk_mb: 4000,
            deployments: 1,
        };
        let big = ResourceRequest {
            cpu: 4,
            gpu: 1,
            ram_mb: 4000,
            disk_mb: 4000,
        };
        let small = ResourceRequest {
            cpu: 2,
            gpu: 0,
            ram_mb: 2000,
            disk_mb: 2000,
        };
        assert!(small.le(&big));
        let c = caps(8, 1, 8000, 8000, 5);
        // If the larger request passes, the smaller (componentwise <=) must too.
        if first_overflow(&current, &big, &c).is_none() {
            assert!(first_overflow(&current, &small, &c).is_none());
        }
    }

    #[test]
    fn dead_job_excluded_by_default_policy() {
        let job = JobStatus {
            job_id: "j1".into(),
            owner: "alice".into(),
            namespace: "vo-a".into(),
            state: SchedulerJobState::Dead,
            has_allocation: false,
            allocation_placing: false,
            user_initiated_stop: false,
            placement_failed: false,
            resources: ResourceUse::default(),
            allocations: vec![],
            node_id: None,
            kind: None,
            workload_name: None,
        };
        assert!(!counts_toward_quota(&job, false));
        assert!(counts_toward_quota(&job, true));
    }
}
