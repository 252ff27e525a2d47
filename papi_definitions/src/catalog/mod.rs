//! C1 — Catalog Resolver.
//!
//! Replaces the "dynamic class patching" pattern flagged in Design Notes §9
//! with explicit polymorphism: `CatalogBackend` is the capability set
//! (`list`, `detail`, `metadata`, `config_template`, `refresh`); `GitCatalog`
//! is the git-backed implementation, and `CachedCatalog` wraps any backend
//! with the TTL + single-flight cache from `cache.rs`. Callers only ever
//! hold a `CachedCatalog<GitCatalog>` (or a fake backend in tests) behind
//! the trait object, never a concrete type with hidden method-swapping.

pub mod cache;
pub mod source;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_derive::{Deserialize, Serialize};

use crate::config::{CatalogSource as CatalogSourceConfig, ImageAllowList};
use crate::error::{ErrorKind, Result};
use crate::workload::{ConfigSchema, WorkloadKind};

use cache::Cache;
use source::{parse_and_validate_metadata, parse_index};

/// Full metadata for one catalog item (spec.md §3 "Catalog Item").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub title: String,
    pub summary: String,
    pub description: String,
    pub resources_recommended: Option<String>,
    pub docker_image: String,
    pub docker_tags: Vec<String>,
    pub license: String,
    pub keywords: Vec<String>,
}

/// A trimmed record for grid views (`detail`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub name: String,
    pub title: String,
    pub summary: String,
    pub docker_image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub kind: WorkloadKind,
    pub name: String,
    pub git_url: String,
    pub branch: String,
    pub metadata: ItemMetadata,
    pub config_schema: ConfigSchema,
    pub last_refresh: DateTime<Utc>,
}

impl CatalogItem {
    pub fn summary(&self) -> SummaryRecord {
        SummaryRecord {
            name: self.name.clone(),
            title: self.metadata.title.clone(),
            summary: self.metadata.summary.clone(),
            docker_image: self.metadata.docker_image.clone(),
        }
    }
}

/// The capability set every catalog backend implements.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn list(&self, kind: WorkloadKind) -> Result<Vec<String>>;
    async fn detail(&self, kind: WorkloadKind) -> Result<Vec<SummaryRecord>>;
    async fn metadata(&self, kind: WorkloadKind, name: &str) -> Result<CatalogItem>;
    async fn config_template(&self, kind: WorkloadKind, name: &str) -> Result<ConfigSchema>;
    /// Invalidates cached entries for `kind`/`name`. `None, None` clears
    /// everything. A concrete (non-cached) backend treats this as a no-op.
    async fn refresh(&self, kind: Option<WorkloadKind>, name: Option<&str>) -> Result<()>;
}

/// Fetches index + metadata documents over HTTPS from git-hosted catalog
/// sources (a "source-code host" in spec.md §4.1 terms — a raw-content URL
/// under the configured branch).
pub struct GitCatalog {
    client: reqwest::Client,
    sources: Vec<CatalogSourceConfig>,
    allow_list: ImageAllowList,
}

impl GitCatalog {
    pub fn new(
        client: reqwest::Client,
        sources: Vec<CatalogSourceConfig>,
        allow_list: ImageAllowList,
    ) -> GitCatalog {
        GitCatalog {
            client,
            sources,
            allow_list,
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(ErrorKind::BackendError(format!(
                "GET {} returned {}",
                url,
                resp.status()
            ))
            .into());
        }
        Ok(resp.text().await?)
    }

    async fn load_all(&self, kind: WorkloadKind) -> Result<BTreeMap<String, CatalogItem>> {
        let mut out = BTreeMap::new();
        for source in self.sources.iter().filter(|s| s.kind == kind) {
            let index_url = format!(
                "{}/raw/{}/index",
                source.git_url.as_str().trim_end_matches('/'),
                source.branch
            );
            let doc = match self.fetch_text(&index_url).await {
                Ok(d) => d,
                Err(e) => {
                    warn!("failed to fetch catalog index {}: {}", index_url, e);
                    continue;
                }
            };
            for entry in parse_index(&doc) {
                let meta_url = format!("{}/raw/{}/metadata.json", entry.url.trim_end_matches('/'), source.branch);
                let meta_doc = match self.fetch_text(&meta_url).await {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("dropping {} {}: metadata fetch failed: {}", kind, entry.name, e);
                        continue;
                    }
                };
                let raw = match parse_and_validate_metadata(&meta_doc, &self.allow_list) {
                    Ok(r) => r,
                    Err(reason) => {
                        warn!("dropping {} {}: {}", kind, entry.name, reason);
                        continue;
                    }
                };
                let config_url = format!("{}/raw/{}/config.json", entry.url.trim_end_matches('/'), source.branch);
                let schema = match self.fetch_text(&config_url).await {
                    Ok(d) => serde_json::from_str(&d).unwrap_or_default(),
                    Err(e) => {
                        debug!("no config schema for {} {} ({}), using empty schema", kind, entry.name, e);
                        ConfigSchema::default()
                    }
                };
                let item = CatalogItem {
                    kind,
                    name: entry.name.clone(),
                    git_url: entry.url.clone(),
                    branch: source.branch.clone(),
                    metadata: ItemMetadata {
                        title: raw.title,
                        summary: raw.summary,
                        description: raw.description,
                        resources_recommended: raw.resources_recommended,
                        docker_image: raw.docker_image,
                        docker_tags: raw.docker_tags,
                        license: raw.license,
                        keywords: raw.keywords,
                    },
                    config_schema: schema,
                    last_refresh: Utc::now(),
                };
                out.insert(entry.name, item);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl CatalogBackend for GitCatalog {
    async fn list(&self, kind: WorkloadKind) -> Result<Vec<String>> {
        Ok(self.load_all(kind).await?.into_keys().collect())
    }

    async fn detail(&self, kind: WorkloadKind) -> Result<Vec<SummaryRecord>> {
        Ok(self
            .load_all(kind)
            .await?
            .into_values()
            .map(|i| i.summary())
            .collect())
    }

    async fn metadata(&self, kind: WorkloadKind, name: &str) -> Result<CatalogItem> {
        self.load_all(kind)
            .await?
            .remove(name)
            .ok_or_else(|| ErrorKind::UnknownWorkload(kind.to_string(), name.to_string()).into())
    }

    async fn config_template(&self, kind: WorkloadKind, name: &str) -> Result<ConfigSchema> {
        Ok(self.metadata(kind, name).await?.config_schema)
    }

    async fn refresh(&self, _kind: Option<WorkloadKind>, _name: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// Wraps any `CatalogBackend` with TTL caching: 6 h for `metadata`/
/// `config_template`, 15 min for `list`/`detail` (spec.md §4.1).
pub struct CachedCatalog<B: CatalogBackend> {
    inner: Arc<B>,
    list_cache: Cache<WorkloadKind, Vec<String>>,
    detail_cache: Cache<WorkloadKind, Vec<SummaryRecord>>,
    metadata_cache: Cache<(WorkloadKind, String), CatalogItem>,
}

const LIST_TTL: Duration = Duration::from_secs(15 * 60);
const METADATA_TTL: Duration = Duration::from_secs(6 * 60 * 60);

impl<B: CatalogBackend> CachedCatalog<B> {
    pub fn new(inner: B) -> CachedCatalog<B> {
        CachedCatalog {
            inner: Arc::new(inner),
            list_cache: Cache::new(LIST_TTL),
            detail_cache: Cache::new(LIST_TTL),
            metadata_cache: Cache::new(METADATA_TTL),
        }
    }
}

#[async_trait]
impl<B: CatalogBackend> CatalogBackend for CachedCatalog<B> {
    async fn list(&self, kind: WorkloadKind) -> Result<Vec<String>> {
        let inner = self.inner.clone();
        self.list_cache
            .get_or_fetch(kind, || async move { inner.list(kind).await })
            .await
    }

    async fn detail(&self, kind: WorkloadKind) -> Result<Vec<SummaryRecord>> {
        let inner = self.inner.clone();
        self.detail_cache
            .get_or_fetch(kind, || async move { inner.detail(kind).await })
            .await
    }

    async fn metadata(&self, kind: WorkloadKind, name: &str) -> Result<CatalogItem> {
        let inner = self.inner.clone();
        let key = (kind, name.to_string());
        let name_owned = name.to_string();
        self.metadata_cache
            .get_or_fetch(key, || async move { inner.metadata(kind, &name_owned).await })
            .await
    }

    async fn config_template(&self, kind: WorkloadKind, name: &str) -> Result<ConfigSchema> {
        Ok(self.metadata(kind, name).await?.config_schema)
    }

    async fn refresh(&self, kind: Option<WorkloadKind>, name: Option<&str>) -> Result<()> {
        match (kind, name) {
            (Some(k), Some(n)) => {
                self.metadata_cache.invalidate(&(k, n.to_string())).await;
            }
            (Some(k), None) => {
                self.list_cache.invalidate(&k).await;
                self.detail_cache.invalidate(&k).await;
            }
            (None, _) => {
                self.list_cache.invalidate_all().await;
                self.detail_cache.invalidate_all().await;
                self.metadata_cache.invalidate_all().await;
            }
        }
        self.inner.refresh(kind, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogBackend for CountingBackend {
        async fn list(&self, _kind: WorkloadKind) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["demo-app".into()])
        }
        async fn detail(&self, _kind: WorkloadKind) -> Result<Vec<SummaryRecord>> {
            Ok(vec![])
        }
        async fn metadata(&self, kind: WorkloadKind, name: &str) -> Result<CatalogItem> {
            Err(ErrorKind::UnknownWorkload(kind.to_string(), name.to_string()).into())
        }
        async fn config_template(&self, _kind: WorkloadKind, _name: &str) -> Result<ConfigSchema> {
            Ok(ConfigSchema::default())
        }
        async fn refresh(&self, _kind: Option<WorkloadKind>, _name: Option<&str>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn list_is_cached_across_calls() {
        let cached = CachedCatalog::new(CountingBackend {
            calls: AtomicUsize::new(0),
        });
        cached.list(WorkloadKind::Module).await.unwrap();
        cached.list(WorkloadKind::Module).await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_clears_and_allows_refetch() {
        let cached = CachedCatalog::new(CountingBackend {
            calls: AtomicUsize::new(0),
        });
        cached.list(WorkloadKind::Module).await.unwrap();
        cached.refresh(Some(WorkloadKind::Module), None).await.unwrap();
        cached.list(WorkloadKind::Module).await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
    }
}
