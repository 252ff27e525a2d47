//! Loads the job template text bound to each workload kind (spec.md §3:
//! "Each kind binds to ... a job template") from the configured templates
//! directory, plus the C6 batch-snapshot template. Templates are read once
//! at startup and held in memory; restarting PAPI is how an operator rolls
//! out a template change, the same deploy-to-update model the teacher's
//! config templates use.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use papi_definitions::error::{Error, ErrorKind, Result};
use papi_definitions::workload::WorkloadKind;

pub struct TemplateStore {
    by_kind: BTreeMap<WorkloadKind, String>,
    snapshot_batch: String,
}

const ALL_KINDS: &[WorkloadKind] = &[
    WorkloadKind::Module,
    WorkloadKind::Tool,
    WorkloadKind::TryMe,
    WorkloadKind::BatchInference,
    WorkloadKind::Snapshot,
    WorkloadKind::FunctionService,
];

impl TemplateStore {
    pub fn load(dir: &Path) -> Result<TemplateStore> {
        let mut by_kind = BTreeMap::new();
        for kind in ALL_KINDS {
            let path = dir.join(format!("{}.tmpl", kind));
            let text = fs::read_to_string(&path).map_err(|e| {
                Error::from(ErrorKind::Internal(format!(
                    "reading job template {}: {}",
                    path.display(),
                    e
                )))
            })?;
            by_kind.insert(*kind, text);
        }
        let snapshot_batch_path = dir.join("snapshot_batch.tmpl");
        let snapshot_batch = fs::read_to_string(&snapshot_batch_path).map_err(|e| {
            Error::from(ErrorKind::Internal(format!(
                "reading snapshot batch template {}: {}",
                snapshot_batch_path.display(),
                e
            )))
        })?;
        Ok(TemplateStore { by_kind, snapshot_batch })
    }

    pub fn job_template(&self, kind: WorkloadKind) -> &str {
        // Populated for every `WorkloadKind` variant at `load()` time.
        self.by_kind.get(&kind).expect("all workload kinds have a loaded template")
    }

    pub fn snapshot_batch_template(&self) -> &str {
        &self.snapshot_batch
    }
}
