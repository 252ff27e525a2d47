//! Workload kinds and the user-facing config schema shape.
//!
//! A `WorkloadKind` binds to a config schema, a job template, default
//! resource caps and a namespace mapping (spec.md §3). The schema shape
//! itself (§4.1 "recognized config-schema fields") is modelled here so both
//! the Catalog Resolver and the Template Renderer share one definition.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, Result};

/// The discriminated workload-kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadKind {
    Module,
    Tool,
    TryMe,
    BatchInference,
    Snapshot,
    FunctionService,
}

impl WorkloadKind {
    /// Try-me and function-service workloads never run user-overridden
    /// images outside the allow-list check path; everything else does too,
    /// but this distinguishes the kinds that are always batch (non-restart).
    pub fn is_batch_only(self) -> bool {
        matches!(self, WorkloadKind::TryMe | WorkloadKind::BatchInference)
    }

    /// Priority band, used to resolve the `PRIORITY` computed template
    /// field (spec.md §4.3 step 3). Try-me gets the lowest band.
    pub fn priority_band(self) -> i64 {
        match self {
            WorkloadKind::TryMe => 10,
            WorkloadKind::BatchInference => 30,
            WorkloadKind::Snapshot => 40,
            WorkloadKind::FunctionService => 50,
            WorkloadKind::Module | WorkloadKind::Tool => 50,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            WorkloadKind::Module => "module",
            WorkloadKind::Tool => "tool",
            WorkloadKind::TryMe => "try-me",
            WorkloadKind::BatchInference => "batch-inference",
            WorkloadKind::Snapshot => "snapshot",
            WorkloadKind::FunctionService => "function-service",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for WorkloadKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<WorkloadKind> {
        Ok(match s {
            "module" => WorkloadKind::Module,
            "tool" => WorkloadKind::Tool,
            "try-me" | "try_me" => WorkloadKind::TryMe,
            "batch-inference" | "batch_inference" => WorkloadKind::BatchInference,
            "snapshot" => WorkloadKind::Snapshot,
            "function-service" | "function_service" => WorkloadKind::FunctionService,
            other => {
                return Err(ErrorKind::UnknownWorkload(other.to_string(), String::new()).into())
            }
        })
    }
}

/// One parameter in a config schema section.
///
/// ```yaml
/// cpu_num:
///   name: "CPU count"
///   value: 2
///   range: [1, 16]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigParam {
    /// Human label shown in the form.
    pub name: String,
    /// Default value.
    pub value: Value,
    /// Closed value set, when the parameter is an enum choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
    /// Inclusive numeric range `[min, max]`, when the parameter is bounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    /// Help text for the form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether a value must be supplied (no `value` fallback used).
    #[serde(default)]
    pub required: bool,
}

impl ConfigParam {
    /// Validates a user-supplied value against `options`/`range`; returns
    /// `Ok(())` when neither constraint is configured (free-form field).
    pub fn validate(&self, field: &str, supplied: &Value) -> Result<()> {
        if let Some(options) = &self.options {
            if !options.contains(supplied) {
                return Err(ErrorKind::BadRequest(format!(
                    "{}: value {} not in allowed options {:?}",
                    field, supplied, options
                ))
                .into());
            }
        }
        if let Some((min, max)) = self.range {
            let n = supplied.as_f64().ok_or_else(|| {
                ErrorKind::BadRequest(format!("{}: expected a number", field))
            })?;
            if n < min || n > max {
                return Err(ErrorKind::BadRequest(format!(
                    "{}: {} out of range [{}, {}]",
                    field, n, min, max
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// A named section of the config schema, e.g. `general`, `hardware`,
/// `storage`, or a workload-specific section.
pub type ConfigSection = BTreeMap<String, ConfigParam>;

/// The full user-facing config schema for one catalog item, grouped by
/// section as described in spec.md §4.1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSchema {
    #[serde(default)]
    pub general: ConfigSection,
    #[serde(default)]
    pub hardware: ConfigSection,
    #[serde(default)]
    pub storage: ConfigSection,
    /// Workload-specific sections keyed by section name (e.g.
    /// `federated_learning`, `cvat`).
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, ConfigSection>,
}

impl ConfigSchema {
    pub fn sections(&self) -> Vec<(&str, &ConfigSection)> {
        let mut out = vec![
            ("general", &self.general),
            ("hardware", &self.hardware),
            ("storage", &self.storage),
        ];
        for (k, v) in &self.extra {
            out.push((k.as_str(), v));
        }
        out
    }

    pub fn find(&self, field: &str) -> Option<&ConfigParam> {
        self.sections()
            .into_iter()
            .find_map(|(_, s)| s.get(field))
    }
}

/// The user's submitted parameter map, grouped the same way as the schema.
pub type UserConfig = BTreeMap<String, BTreeMap<String, Value>>;
