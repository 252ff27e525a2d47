//! The `Server` value: every collaborator client and controller, built once
//! at startup and shared behind `web::Data` (an explicit value rather than
//! scattered globals, per Design Notes §9 "explicit Server value
//! constructed once at startup").

use std::sync::Arc;
use std::time::Duration;

use papi_definitions::catalog::{CachedCatalog, CatalogBackend, GitCatalog};
use papi_definitions::config::Config;
use papi_definitions::deployment::DeploymentController;
use papi_definitions::function_client::FunctionClient;
use papi_definitions::llm::{LlmCatalog, LlmGateway};
use papi_definitions::mailer::Mailer;
use papi_definitions::quota::QuotaLedger;
use papi_definitions::registry_client::RegistryClient;
use papi_definitions::scheduler_client::SchedulerClient;
use papi_definitions::secrets::SecretsBroker;
use papi_definitions::snapshot::SnapshotController;
use papi_definitions::stats::StatsAggregator;

use crate::auth::ClaimsVerifier;
use crate::templates::TemplateStore;

pub struct Server {
    pub config: Arc<Config>,
    pub catalog: Arc<CachedCatalog<GitCatalog>>,
    pub deployments: DeploymentController,
    pub tryme: DeploymentController,
    pub snapshots: SnapshotController,
    pub functions: FunctionClient,
    pub stats: Arc<StatsAggregator>,
    pub llm_catalog: Arc<LlmCatalog>,
    pub llm_gateway: Arc<LlmGateway>,
    pub verifier: Arc<dyn ClaimsVerifier>,
    pub secrets: SecretsBroker,
    pub templates: Arc<TemplateStore>,
}

impl Server {
    pub fn new(
        config: Config,
        llm_catalog: LlmCatalog,
        verifier: Arc<dyn ClaimsVerifier>,
        templates: TemplateStore,
    ) -> Server {
        let config = Arc::new(config);
        let timeout = Duration::from_secs(config.backends.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds");

        let scheduler = SchedulerClient::new(http.clone(), config.backends.scheduler_addr.as_str());
        let registry = RegistryClient::new(http.clone(), config.backends.registry_addr.as_str());
        let secrets = SecretsBroker::new(
            http.clone(),
            config.backends.secret_store_addr.as_str(),
            config.backends.secret_store_token.clone(),
        );
        let mailer = config
            .backends
            .mailer_addr
            .as_ref()
            .map(|addr| Mailer::new(http.clone(), addr.as_str(), format!("papi@{}", config.this.domain)));

        let quota = QuotaLedger::new(scheduler.clone(), config.caps.gpu_per_user, config.quota_policy.count_dead_in_quota);
        let git_catalog = GitCatalog::new(http.clone(), config.catalog_sources.clone(), config.image_allow_list.clone());
        let catalog = Arc::new(CachedCatalog::new(git_catalog));
        let catalog_dyn: Arc<dyn CatalogBackend> = catalog.clone();

        let deployments = DeploymentController::new(
            catalog_dyn.clone(),
            quota.clone(),
            secrets.clone(),
            scheduler.clone(),
            mailer.clone(),
            config.clone(),
        );
        // Try-me shares C3/C5's machinery with a distinct priority band and
        // concurrency caps enforced at the route layer (spec.md §4.7).
        let tryme = DeploymentController::new(
            catalog_dyn,
            quota,
            secrets.clone(),
            scheduler.clone(),
            mailer.clone(),
            config.clone(),
        );

        let snapshots = SnapshotController::new(scheduler.clone(), registry, mailer)
            .with_caps(config.caps.snapshot_quota_bytes, config.caps.snapshot_max_container_bytes);
        let functions = FunctionClient::new(http.clone(), config.image_allow_list.clone());
        let stats = Arc::new(StatsAggregator::new(scheduler));
        let llm_gateway = Arc::new(LlmGateway::new(
            http,
            config.backends.llm_gateway_addr.as_str(),
            config.backends.llm_gateway_api_key.clone(),
        ));

        Server {
            config,
            catalog,
            deployments,
            tryme,
            snapshots,
            functions,
            stats,
            llm_catalog: Arc::new(llm_catalog),
            llm_gateway,
            verifier,
            secrets,
            templates: Arc::new(templates),
        }
    }
}
