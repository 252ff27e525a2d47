//! C4 — Secrets Broker.
//!
//! A path-scoped CRUD client over a key/value Secret Store, grounded
//! directly on the teacher's `vault::Vault` (a Hashicorp Vault HTTP client
//! using `reqwest`): same `X-Vault-Token` header, same JSON envelope
//! (`{"data": {...}}`), same `list`/`read` shape. The difference from the
//! teacher is that every path here is derived server-side from the caller's
//! VO and subject — spec.md §4.4 says the backing token has root-wide
//! privileges and PAPI itself enforces the per-user prefix, so that
//! enforcement lives here rather than in store-side ACLs.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde_derive::Deserialize;

use crate::error::{ErrorKind, Result};

/// Secret values can arrive as strings or integers (as in the teacher's
/// `vault::SecretValue`); integers are coerced to strings so clients never
/// have to special-case numeric-looking secrets.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
enum SecretValue {
    S(String),
    I(i64),
}
impl From<SecretValue> for String {
    fn from(sv: SecretValue) -> String {
        match sv {
            SecretValue::I(i) => i.to_string(),
            SecretValue::S(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SecretDocument {
    data: BTreeMap<String, SecretValue>,
}

#[derive(Debug, Deserialize)]
struct ListDocument {
    data: BTreeMap<String, Vec<String>>,
}

#[derive(Clone)]
pub struct SecretsBroker {
    client: reqwest::Client,
    addr: String,
    token: String,
}

/// Computes the effective, server-derived path root for a user: users can
/// never specify absolute paths, and any `user_path` that would resolve
/// outside this subtree is rejected with `forbidden` before any HTTP call
/// is made (spec.md §4.4, invariant in spec.md §8 property 6).
fn effective_path(secret_root: &str, vo: &str, subject: &str, user_path: &str) -> Result<String> {
    if user_path.starts_with('/') || user_path.contains("..") {
        return Err(ErrorKind::Forbidden(format!(
            "path '{}' attempts to escape the user's secret subtree",
            user_path
        ))
        .into());
    }
    let root = format!(
        "{}/{}/users/{}",
        secret_root.trim_end_matches('/'),
        vo,
        subject
    );
    if user_path.is_empty() {
        Ok(root)
    } else {
        Ok(format!("{}/{}", root, user_path))
    }
}

impl SecretsBroker {
    pub fn new(client: reqwest::Client, addr: impl Into<String>, token: impl Into<String>) -> SecretsBroker {
        SecretsBroker {
            client,
            addr: addr.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.addr.trim_end_matches('/'), path)
    }

    pub async fn list(&self, secret_root: &str, vo: &str, subject: &str, subpath: &str) -> Result<Vec<String>> {
        let path = effective_path(secret_root, vo, subject, subpath)?;
        let resp = self
            .client
            .get(self.url(&format!("{}?list=true", path)))
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(ErrorKind::BackendError(format!(
                "unexpected status {} listing secrets",
                resp.status()
            ))
            .into());
        }
        let doc: ListDocument = resp.json().await?;
        let keys = doc
            .data
            .get("keys")
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|k| !k.ends_with('/'))
            .collect();
        Ok(keys)
    }

    pub async fn get(&self, secret_root: &str, vo: &str, subject: &str, path: &str) -> Result<String> {
        let full = effective_path(secret_root, vo, subject, path)?;
        let resp = self
            .client
            .get(self.url(&full))
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ErrorKind::BackendError(format!(
                "secret '{}' could not be reached or accessed ({})",
                path,
                resp.status()
            ))
            .into());
        }
        let doc: SecretDocument = resp.json().await?;
        doc.data
            .get("value")
            .cloned()
            .map(String::from)
            .ok_or_else(|| ErrorKind::BackendError(format!("secret '{}' has no 'value' key", path)).into())
    }

    pub async fn put(&self, secret_root: &str, vo: &str, subject: &str, path: &str, value: &str) -> Result<()> {
        let full = effective_path(secret_root, vo, subject, path)?;
        let body = serde_json::json!({ "value": value });
        let resp = self
            .client
            .post(self.url(&full))
            .header("X-Vault-Token", &self.token)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ErrorKind::BackendError(format!(
                "unexpected status {} writing secret '{}'",
                resp.status(),
                path
            ))
            .into());
        }
        Ok(())
    }

    pub async fn delete(&self, secret_root: &str, vo: &str, subject: &str, path: &str) -> Result<()> {
        let full = effective_path(secret_root, vo, subject, path)?;
        let resp = self
            .client
            .delete(self.url(&full))
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(ErrorKind::BackendError(format!(
                "unexpected status {} deleting secret '{}'",
                resp.status(),
                path
            ))
            .into());
        }
        Ok(())
    }
}
