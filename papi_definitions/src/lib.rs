#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate failure;

#[macro_use]
extern crate log;

/// The fixed error taxonomy every component boundary converges on.
pub mod error;
pub use error::{Error, ErrorKind, Result};

/// VO → namespace/domain/secret-root mapping and per-VO resource caps.
pub mod vo;
pub use vo::{ResourceCaps, VoMapping, VoRegistry};

/// Workload kinds and the user-facing config schema shape.
pub mod workload;
pub use workload::{ConfigParam, ConfigSchema, ConfigSection, UserConfig, WorkloadKind};

/// Static/operator configuration: auth, catalog sources, image allow-list,
/// global caps, quota policy, backend addresses.
pub mod config;
pub use config::Config;

/// C1 — Catalog Resolver: a cached read-through view of one or more catalog
/// sources (currently a Git-backed index).
pub mod catalog;
pub use catalog::{CatalogBackend, CatalogItem, ItemMetadata, SummaryRecord};

/// C2 — Quota Ledger: stateless per-user resource accounting over the
/// Scheduler's live jobs.
pub mod quota;
pub use quota::{QuotaLedger, QuotaSnapshot, ResourceRequest};

/// C3 — Template Renderer: the two-phase tokenize/substitute pipeline and
/// computed-field resolution.
pub mod template;

/// C4 — Secrets Broker: a path-scoped CRUD client over the backing Secret
/// Store.
pub mod secrets;
pub use secrets::SecretsBroker;

/// HTTP client for the backing Scheduler.
pub mod scheduler_client;
pub use scheduler_client::{JobStatus, NodeStatus, SchedulerClient, SchedulerJobState};

/// C5 — Deployment Controller: the create/list/get/delete protocol and the
/// pure status-derivation table.
pub mod deployment;
pub use deployment::{Deployment, DeploymentController, UserFacingStatus};

/// C6 — Snapshot Orchestrator.
pub mod snapshot;
pub use snapshot::{Snapshot, SnapshotController};

pub mod tryme;
pub use tryme::check_concurrency as check_tryme_concurrency;

/// HTTP client for the backing container Registry.
pub mod registry_client;
pub use registry_client::RegistryClient;

/// C8 — Function Service Controller: the Function Platform backend.
pub mod function_client;
pub use function_client::{FunctionClient, FunctionService};

/// C9 — Cluster Stats Aggregator.
pub mod stats;
pub use stats::{ClusterStats, StatsAggregator};

/// C10 — LLM Proxy & Catalog.
pub mod llm;
pub use llm::{LlmCatalog, LlmModel};

/// Supplemented notification collaborator (mail-relay client).
pub mod mailer;
pub use mailer::{Mailer, Notification};
