//! Virtual Organization registry.
//!
//! A VO partitions namespaces, quotas, domains, secret paths, inference
//! endpoints, MLflow URIs and dashboard URLs. The mapping is read-only and
//! loaded once at startup as part of `Config`.

use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};
use url::Url;

/// Everything a VO resolves to. Held inside `Config::vos` and looked up by
/// name; never mutated after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoMapping {
    /// Scheduler namespace this VO's jobs live in.
    pub namespace: String,
    /// Base domain used to build deployment endpoint URLs, e.g.
    /// `a.deploy.example`.
    pub domain: String,
    /// Inference (Function Platform) cluster endpoint for this VO.
    pub inference_endpoint: Url,
    /// MLflow tracking URI for this VO, used when rendering MLflow
    /// credential placeholders.
    pub mlflow_uri: Url,
    /// Vault-style secret root this VO's user paths are rooted under, e.g.
    /// `secret/papi`.
    pub secret_root: String,
    /// Per-user resource caps for this VO (overrides the global default).
    #[serde(default)]
    pub per_user_caps: Option<ResourceCaps>,
    /// Total VO-wide resource caps.
    #[serde(default)]
    pub vo_caps: Option<ResourceCaps>,
}

/// A resource cap table: CPUs, GPUs, RAM MB, disk MB, and deployment count.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceCaps {
    pub cpu: i64,
    pub gpu: i64,
    pub ram_mb: i64,
    pub disk_mb: i64,
    pub deployments: i64,
}

/// The process-wide, read-only `VO -> VoMapping` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoRegistry {
    vos: BTreeMap<String, VoMapping>,
}

impl VoRegistry {
    pub fn new(vos: BTreeMap<String, VoMapping>) -> VoRegistry {
        VoRegistry { vos }
    }

    pub fn get(&self, vo: &str) -> Option<&VoMapping> {
        self.vos.get(vo)
    }

    pub fn contains(&self, vo: &str) -> bool {
        self.vos.contains_key(vo)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vos.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VoMapping {
        VoMapping {
            namespace: "vo-a".into(),
            domain: "a.deploy.example".into(),
            inference_endpoint: Url::parse("https://oscar.a.example").unwrap(),
            mlflow_uri: Url::parse("https://mlflow.a.example").unwrap(),
            secret_root: "secret/papi".into(),
            per_user_caps: None,
            vo_caps: None,
        }
    }

    #[test]
    fn lookup_present_and_absent() {
        let mut map = BTreeMap::new();
        map.insert("vo.a".to_string(), sample());
        let reg = VoRegistry::new(map);
        assert!(reg.contains("vo.a"));
        assert!(reg.get("vo.a").is_some());
        assert!(reg.get("vo.b").is_none());
    }
}
