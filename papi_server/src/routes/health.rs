//! Supplemented ambient endpoints (SPEC_FULL.md §2): liveness probe and a
//! version string, both unauthenticated, the shape most actix-web services
//! in this ecosystem expose for their orchestrator's health checks.

use actix_web::{get, HttpResponse};
use serde_derive::Serialize;

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[get("/v1/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(Health { status: "ok" })
}

#[derive(Serialize)]
struct Version {
    version: &'static str,
}

#[get("/v1/version")]
pub async fn version() -> HttpResponse {
    HttpResponse::Ok().json(Version {
        version: env!("CARGO_PKG_VERSION"),
    })
}
