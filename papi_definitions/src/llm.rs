//! C10 — LLM Proxy & Catalog.
//!
//! Serves a static catalog (spec.md §4.10) and authenticates+forwards
//! inference calls to an upstream LLM gateway using a server-side API key.
//! Streaming passthrough itself belongs at the HTTP edge (the gateway's
//! chunked body is piped straight through); this module owns the catalog
//! data and the one piece of request shaping PAPI does before forwarding:
//! rejecting calls against a model that needs a gated token the caller
//! hasn't been granted.

use serde_derive::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmModel {
    pub name: String,
    pub family: String,
    pub license: String,
    pub context_window: i64,
    pub deployment_args: serde_json::Value,
    pub requires_gated_token: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCatalog {
    models: Vec<LlmModel>,
}

impl LlmCatalog {
    pub fn new(models: Vec<LlmModel>) -> LlmCatalog {
        LlmCatalog { models }
    }

    pub fn list(&self) -> &[LlmModel] {
        &self.models
    }

    pub fn find(&self, name: &str) -> Option<&LlmModel> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Rejects a proxy call for a gated model when the caller has not been
    /// granted it; `granted` is the caller's set of gated-model
    /// entitlements, resolved upstream from auth claims.
    pub fn check_access(&self, model: &str, granted: &[String]) -> Result<()> {
        let m = self
            .find(model)
            .ok_or_else(|| ErrorKind::BadRequest(format!("unknown LLM model '{}'", model)))?;
        if m.requires_gated_token && !granted.iter().any(|g| g == model) {
            return Err(ErrorKind::Forbidden(format!(
                "model '{}' requires a gated token the caller has not been granted",
                model
            ))
            .into());
        }
        Ok(())
    }
}

/// A thin client for the upstream LLM gateway: one outbound request per
/// proxy call, streamed straight through by the HTTP edge. Kept separate
/// from `LlmCatalog` so the catalog stays a plain, easily-tested data
/// structure.
pub struct LlmGateway {
    client: reqwest::Client,
    addr: String,
    api_key: String,
}

impl LlmGateway {
    pub fn new(client: reqwest::Client, addr: impl Into<String>, api_key: impl Into<String>) -> LlmGateway {
        LlmGateway {
            client,
            addr: addr.into(),
            api_key: api_key.into(),
        }
    }

    /// Forwards `body` to the gateway's inference endpoint for `model`,
    /// returning the raw response for the HTTP edge to stream back
    /// unchanged (spec.md §4.10 "request/response bodies are streamed
    /// unchanged").
    pub async fn forward(&self, model: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(format!("{}/v1/models/{}/generate", self.addr.trim_end_matches('/'), model))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ErrorKind::BackendError(text).into());
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> LlmCatalog {
        LlmCatalog::new(vec![
            LlmModel {
                name: "llama-open".into(),
                family: "llama".into(),
                license: "apache-2.0".into(),
                context_window: 8192,
                deployment_args: serde_json::json!({}),
                requires_gated_token: false,
            },
            LlmModel {
                name: "llama-gated".into(),
                family: "llama".into(),
                license: "custom".into(),
                context_window: 8192,
                deployment_args: serde_json::json!({}),
                requires_gated_token: true,
            },
        ])
    }

    #[test]
    fn open_model_never_needs_a_grant() {
        assert!(catalog().check_access("llama-open", &[]).is_ok());
    }

    #[test]
    fn gated_model_rejects_without_grant() {
        let err = catalog().check_access("llama-gated", &[]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Forbidden(_)));
    }

    #[test]
    fn gated_model_admits_with_grant() {
        assert!(catalog()
            .check_access("llama-gated", &["llama-gated".to_string()])
            .is_ok());
    }

    #[test]
    fn unknown_model_is_bad_request() {
        let err = catalog().check_access("does-not-exist", &[]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::BadRequest(_)));
    }
}
