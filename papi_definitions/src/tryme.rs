//! C7 — Try-Me Controller concurrency gate.
//!
//! Try-me deployments reuse `DeploymentController::create`/`list`/`delete`
//! wholesale (same 8-step protocol, same status derivation) under a
//! distinct priority band (`WorkloadKind::priority_band`) and a fixed CPU-
//! only envelope; the one piece of logic unique to try-me is the per-user
//! and per-VO concurrency cap, checked here the same stateless-reread way
//! `QuotaLedger::check` works (spec.md §4.7).

use crate::error::{ErrorKind, Result};
use crate::scheduler_client::{SchedulerClient, SchedulerJobState};
use crate::workload::WorkloadKind;

fn is_live_tryme(job: &crate::scheduler_client::JobStatus) -> bool {
    matches!(job.state, SchedulerJobState::Pending | SchedulerJobState::Running)
        && job.kind.as_deref() == Some(WorkloadKind::TryMe.to_string().as_str())
}

/// Fails with `quota-exceeded` when admitting one more try-me deployment
/// would push the user or VO past its concurrency cap.
pub async fn check_concurrency(
    scheduler: &SchedulerClient,
    namespace: &str,
    owner: &str,
    per_user_cap: i64,
    per_vo_cap: i64,
) -> Result<()> {
    let owner_jobs = scheduler.jobs_by_owner(namespace, owner).await?;
    let owner_live = owner_jobs.iter().filter(|j| is_live_tryme(j)).count() as i64;
    if owner_live >= per_user_cap {
        return Err(ErrorKind::quota_resource("tryme-concurrency", per_user_cap, owner_live).into());
    }

    let vo_jobs = scheduler.jobs_by_namespace(namespace).await?;
    let vo_live = vo_jobs.iter().filter(|j| is_live_tryme(j)).count() as i64;
    if vo_live >= per_vo_cap {
        return Err(ErrorKind::quota_resource("tryme-concurrency", per_vo_cap, vo_live).into());
    }
    Ok(())
}
