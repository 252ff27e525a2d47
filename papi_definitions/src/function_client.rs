//! C8 — Function Service Controller.
//!
//! Wraps the external Function Platform (spec.md §4.8): `list`,
//! `create(spec)`, `update(spec)`, `delete(name)`, `logs(name)`. The
//! declarative `FunctionSpec` is this system's vocabulary; `FunctionClient`
//! translates it into the Function Platform's native request and routes to
//! the VO's inference endpoint (`VoMapping::inference_endpoint`), the same
//! cross-cluster routing idea the Scheduler/Registry clients don't need
//! because there is one of each, but the Function Platform is VO-scoped.

use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};
use url::Url;

use crate::config::ImageAllowList;
use crate::error::{ErrorKind, Result};

/// A declarative function-service definition, the enumerated options from
/// spec.md §4.8: image, CPU, memory, VO, allowed-user list, environment
/// variables, input/output bucket paths, inline script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub image: String,
    pub cpu: i64,
    pub memory_mb: i64,
    pub vo: String,
    pub allowed_users: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub input_bucket_path: Option<String>,
    pub output_bucket_path: Option<String>,
    pub script: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionService {
    pub name: String,
    pub image: String,
    pub vo: String,
    pub owner: String,
    pub endpoint: Url,
    pub status: String,
}

pub struct FunctionClient {
    client: reqwest::Client,
    image_allow_list: ImageAllowList,
}

impl FunctionClient {
    pub fn new(client: reqwest::Client, image_allow_list: ImageAllowList) -> FunctionClient {
        FunctionClient {
            client,
            image_allow_list,
        }
    }

    fn check_image(&self, image: &str) -> Result<()> {
        if !self.image_allow_list.is_allowed(image) {
            return Err(ErrorKind::BadRequest(format!(
                "docker image '{}' is not in the allow-list",
                image
            ))
            .into());
        }
        Ok(())
    }

    /// The Function Platform's native request body: the same provenance
    /// metadata (`owner`, `vo`) every controller stamps, plus the spec's
    /// fields passed through (spec.md §4.8 "injects the same provenance
    /// metadata").
    fn to_native_request(spec: &FunctionSpec, owner: &str) -> serde_json::Value {
        serde_json::json!({
            "name": spec.name,
            "image": spec.image,
            "cpu": spec.cpu,
            "memory_mb": spec.memory_mb,
            "owner": owner,
            "vo": spec.vo,
            "allowed_users": spec.allowed_users,
            "env": spec.env,
            "input_bucket_path": spec.input_bucket_path,
            "output_bucket_path": spec.output_bucket_path,
            "script": spec.script,
        })
    }

    pub async fn list(&self, endpoint: &Url, owner: &str) -> Result<Vec<FunctionService>> {
        let resp = self
            .client
            .get(endpoint.join("v1/functions").map_err(|e| ErrorKind::Internal(e.to_string()))?)
            .query(&[("owner", owner)])
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(resp.json().await?)
    }

    pub async fn create(&self, endpoint: &Url, owner: &str, spec: &FunctionSpec) -> Result<FunctionService> {
        self.check_image(&spec.image)?;
        let resp = self
            .client
            .post(endpoint.join("v1/functions").map_err(|e| ErrorKind::Internal(e.to_string()))?)
            .json(&Self::to_native_request(spec, owner))
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(resp.json().await?)
    }

    pub async fn update(&self, endpoint: &Url, owner: &str, spec: &FunctionSpec) -> Result<FunctionService> {
        self.check_image(&spec.image)?;
        let path = format!("v1/functions/{}", spec.name);
        let resp = self
            .client
            .put(endpoint.join(&path).map_err(|e| ErrorKind::Internal(e.to_string()))?)
            .json(&Self::to_native_request(spec, owner))
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(resp.json().await?)
    }

    pub async fn delete(&self, endpoint: &Url, name: &str) -> Result<()> {
        let path = format!("v1/functions/{}", name);
        let resp = self
            .client
            .delete(endpoint.join(&path).map_err(|e| ErrorKind::Internal(e.to_string()))?)
            .send()
            .await?;
        if !resp.status().is_success() && resp.status().as_u16() != 404 {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(())
    }

    pub async fn logs(&self, endpoint: &Url, name: &str) -> Result<String> {
        let path = format!("v1/functions/{}/logs", name);
        let resp = self
            .client
            .get(endpoint.join(&path).map_err(|e| ErrorKind::Internal(e.to_string()))?)
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(body).into());
        }
        Ok(resp.text().await?)
    }
}
