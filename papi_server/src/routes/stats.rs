//! C9 — Cluster Stats Aggregator routes: per-user quota usage (authenticated)
//! and the unauthenticated cluster-wide capacity snapshot (spec.md §4.9).

use actix_web::{get, web, HttpResponse};
use serde_derive::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::errors::{HttpError, HttpResult};
use crate::routes::ensure_vo_membership;
use crate::state::Server;

#[derive(Deserialize)]
pub struct VoQuery {
    vo: String,
}

#[derive(Serialize)]
struct UsageView {
    usage: papi_definitions::quota::QuotaSnapshot,
    caps: papi_definitions::vo::ResourceCaps,
}

#[get("/v1/stats/deployments")]
pub async fn deployments(server: web::Data<Server>, auth: AuthUser, query: web::Query<VoQuery>) -> HttpResult<HttpResponse> {
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let (usage, caps) = server
        .deployments
        .quota_usage(&query.vo, &auth.0.subject)
        .await
        .map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(UsageView { usage, caps }))
}

#[get("/v1/stats/cluster")]
pub async fn cluster(server: web::Data<Server>) -> HttpResponse {
    let stats = server.stats.current().await;
    HttpResponse::Ok().json(&*stats)
}
