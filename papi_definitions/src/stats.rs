//! C9 — Cluster Stats Aggregator.
//!
//! Two data planes (spec.md §4.9): a live in-memory snapshot refreshed
//! every 30s from the Scheduler's node list, and historical daily summaries
//! read from a filesystem path an external process writes. The live plane
//! is kept as an atomic swap of an immutable struct (Design Notes §9,
//! "Stats snapshot: atomic swap of an immutable struct on each refresh"),
//! mirrored here with `RwLock<Arc<ClusterStats>>` rather than a bespoke
//! lock-free structure — the critical section is a pointer swap, not the
//! poll itself.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::warn;
use serde_derive::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::scheduler_client::{NodeStatus, SchedulerClient};

/// The distinct node status spec.md §4.9 (ii)/(iii) requires surfacing,
/// rather than collapsing lost/rescheduling into one generic "down".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    Ready,
    Ineligible,
    Lost,
    Rescheduling,
}

/// Classifies one node. Only `Ready` nodes count toward capacity (spec.md
/// §4.9 (i)); `Lost`/`Rescheduling` are distinct from a blanket
/// `Ineligible` so users can tell transient network cuts from true
/// failures.
pub fn classify_node(node: &NodeStatus) -> NodeCategory {
    if node.lost {
        NodeCategory::Lost
    } else if node.rescheduling {
        NodeCategory::Rescheduling
    } else if node.eligible && node.ready {
        NodeCategory::Ready
    } else {
        NodeCategory::Ineligible
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapacityTotals {
    pub cpu: i64,
    pub ram_mb: i64,
    pub disk_mb: i64,
    pub gpu: i64,
    pub gpu_models: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoCapacity {
    pub capacity: CapacityTotals,
    pub reserved: CapacityTotals,
}

/// One immutable snapshot of cluster state, swapped in whole on each
/// successful poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterStats {
    pub ready_nodes: i64,
    pub ineligible_nodes: i64,
    pub lost_nodes: i64,
    pub rescheduling_nodes: i64,
    pub capacity: CapacityTotals,
    pub reserved: CapacityTotals,
    pub per_vo: BTreeMap<String, VoCapacity>,
    pub reallocations_total: u64,
}

fn add_capacity(totals: &mut CapacityTotals, node: &NodeStatus) {
    totals.cpu += node.capacity.cpu;
    totals.ram_mb += node.capacity.ram_mb;
    totals.disk_mb += node.capacity.disk_mb;
    totals.gpu += node.capacity.gpu;
    if let Some(model) = &node.gpu_model {
        *totals.gpu_models.entry(model.clone()).or_insert(0) += node.capacity.gpu;
    }
}

fn add_reserved(totals: &mut CapacityTotals, node: &NodeStatus) {
    totals.cpu += node.reserved.cpu;
    totals.ram_mb += node.reserved.ram_mb;
    totals.disk_mb += node.reserved.disk_mb;
    totals.gpu += node.reserved.gpu;
}

/// Builds one `ClusterStats` snapshot from a raw node list, pure and
/// exhaustively unit-testable without I/O (the same shape as
/// `deployment::derive_status`).
pub fn compute_stats(nodes: &[NodeStatus]) -> ClusterStats {
    let mut stats = ClusterStats::default();
    for node in nodes {
        match classify_node(node) {
            NodeCategory::Ready => stats.ready_nodes += 1,
            NodeCategory::Ineligible => stats.ineligible_nodes += 1,
            NodeCategory::Lost => stats.lost_nodes += 1,
            NodeCategory::Rescheduling => stats.rescheduling_nodes += 1,
        }
        stats.reallocations_total += node.reallocations;

        if classify_node(node) != NodeCategory::Ready {
            continue;
        }
        add_capacity(&mut stats.capacity, node);
        add_reserved(&mut stats.reserved, node);
        if let Some(vo) = &node.vo {
            let entry = stats.per_vo.entry(vo.clone()).or_default();
            add_capacity(&mut entry.capacity, node);
            add_reserved(&mut entry.reserved, node);
        }
    }
    stats
}

/// Keeps the latest live snapshot and serves it; a failed poll keeps the
/// last good snapshot rather than surfacing empty/stale-looking zeros
/// (spec.md §4.9 "A failed poll keeps the last good snapshot").
pub struct StatsAggregator {
    scheduler: SchedulerClient,
    latest: RwLock<Arc<ClusterStats>>,
}

impl StatsAggregator {
    pub fn new(scheduler: SchedulerClient) -> StatsAggregator {
        StatsAggregator {
            scheduler,
            latest: RwLock::new(Arc::new(ClusterStats::default())),
        }
    }

    pub async fn current(&self) -> Arc<ClusterStats> {
        self.latest.read().await.clone()
    }

    /// One poll cycle: fetch nodes, compute, swap. On failure, logs and
    /// leaves the previous snapshot in place.
    pub async fn poll_once(&self) {
        match self.scheduler.nodes().await {
            Ok(nodes) => {
                let stats = Arc::new(compute_stats(&nodes));
                *self.latest.write().await = stats;
            }
            Err(e) => warn!("cluster stats poll failed, keeping last good snapshot: {}", e),
        }
    }
}

/// A pre-computed daily summary as written by the external summarizer
/// process (spec.md §4.9 "Historical"). PAPI only reads these; it never
/// writes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalSummary {
    pub date: String,
    pub per_user: BTreeMap<String, CapacityTotals>,
    pub per_vo: BTreeMap<String, CapacityTotals>,
}

/// Reads one day's summary file (`<path>/<date>.json`) from the
/// filesystem path configured in `Config::stats_history_path`.
pub fn read_historical_summary(history_path: &Path, date: &str) -> Result<Option<HistoricalSummary>> {
    let file = history_path.join(format!("{}.json", date));
    if !file.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(file)
        .map_err(|e| crate::error::ErrorKind::Internal(format!("reading stats history: {}", e)))?;
    Ok(Some(serde_json::from_str(&raw)?))
}
