//! PAPI server entrypoint. Loads config, wires the collaborator clients into
//! one `Server` value (Design Notes §9), and starts the actix-web app plus
//! two background pollers: the C9 cluster-stats refresh and the C1 catalog
//! refresh (spec.md §5).

#[macro_use]
extern crate log;

use std::env;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use papi_definitions::catalog::CatalogBackend;
use papi_definitions::config::Config;
use papi_definitions::llm::{LlmCatalog, LlmModel};

use papi_server::auth::{ClaimsVerifier, JwksVerifier};
use papi_server::state::Server;
use papi_server::templates::TemplateStore;

const STATS_POLL_INTERVAL: Duration = Duration::from_secs(30);
const CATALOG_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

fn config_path() -> PathBuf {
    env::var("PAPI_CONFIG").unwrap_or_else(|_| "/etc/papi/config.yaml".to_string()).into()
}

fn llm_catalog_path() -> PathBuf {
    env::var("PAPI_LLM_CATALOG").unwrap_or_else(|_| "/etc/papi/llm_catalog.json".to_string()).into()
}

fn load_llm_catalog(path: &Path) -> papi_definitions::error::Result<LlmCatalog> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        papi_definitions::error::ErrorKind::Internal(format!("reading LLM catalog {}: {}", path.display(), e))
    })?;
    let models: Vec<LlmModel> = serde_json::from_str(&raw)?;
    Ok(LlmCatalog::new(models))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    openssl_probe::init_ssl_cert_env_vars();
    env_logger::init();

    let _sentry_guard = env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let config = match Config::from_template_file(&config_path()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: invalid config: {}", e);
            exit(1);
        }
    };

    let llm_catalog = match load_llm_catalog(&llm_catalog_path()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: invalid LLM catalog: {}", e);
            exit(1);
        }
    };

    let templates = match TemplateStore::load(Path::new(&config.templates_path)) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("fatal: could not load job templates: {}", e);
            exit(1);
        }
    };

    let jwks_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.backends.timeout_secs))
        .build()
        .expect("reqwest client builds");
    let verifier: Arc<dyn ClaimsVerifier> = Arc::new(JwksVerifier::new(
        jwks_client,
        config.auth.issuers.clone(),
        config.auth.allowed_vos.clone(),
    ));

    let bind_addr = env::var("PAPI_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let cors_origins = config.auth.cors_origins.clone();

    let server = web::Data::new(Server::new(config, llm_catalog, verifier, templates));

    let stats_server = server.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            stats_server.stats.poll_once().await;
        }
    });

    let catalog_server = server.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CATALOG_REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = catalog_server.catalog.refresh(None, None).await {
                warn!("scheduled catalog refresh failed: {}", e);
            }
        }
    });

    info!("papi_server listening on {}", bind_addr);

    HttpServer::new(move || {
        let mut cors = Cors::default().allowed_methods(vec!["GET", "POST", "PUT", "DELETE"]).max_age(3600);
        for origin in &cors_origins {
            cors = cors.allowed_origin(origin);
        }
        App::new()
            .app_data(server.clone())
            .wrap(sentry_actix::Sentry::new())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(papi_server::routes::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
