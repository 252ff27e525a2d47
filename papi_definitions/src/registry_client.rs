//! HTTP client for the backing container Registry, grounded on the same
//! thin-client shape as `scheduler_client::SchedulerClient`: one
//! `reqwest::Client` plus connection info, narrow typed methods.
//!
//! Used by the Snapshot Orchestrator (C6) to push committed images, sum a
//! user's snapshot storage usage against their quota, and list/delete
//! snapshots by label filter (spec.md §4.6).

use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};

/// One tagged image as the Registry's label-filter API reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryImage {
    pub repository: String,
    pub tag: String,
    pub size_bytes: i64,
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    addr: String,
}

impl RegistryClient {
    pub fn new(client: reqwest::Client, addr: impl Into<String>) -> RegistryClient {
        RegistryClient {
            client,
            addr: addr.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.addr.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Images under `repository`, filtered on the `owner` label (spec.md
    /// §4.6 "List and delete operations are served by the Registry's
    /// label-filter API").
    pub async fn list_by_owner(&self, repository: &str, owner: &str) -> Result<Vec<RegistryImage>> {
        let mut params = BTreeMap::new();
        params.insert("repository", repository);
        params.insert("label.owner", owner);
        let resp = self
            .client
            .get(self.url("v2/_catalog/filter"))
            .query(&params)
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(resp.json().await?)
    }

    /// Total bytes a user's snapshots occupy, used for quota admission
    /// before a new snapshot is pushed.
    pub async fn sum_owner_usage(&self, repository: &str, owner: &str) -> Result<i64> {
        let images = self.list_by_owner(repository, owner).await?;
        Ok(images.iter().map(|i| i.size_bytes).sum())
    }

    pub async fn delete(&self, repository: &str, tag: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("v2/{}/manifests/{}", repository, tag)))
            .send()
            .await?;
        if !resp.status().is_success() && resp.status().as_u16() != 404 {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(())
    }
}
