//! C6 — Snapshot Orchestrator routes.

use actix_web::{delete, get, post, web, HttpResponse};
use serde_derive::Deserialize;
use uuid::Uuid;

use papi_definitions::snapshot::SnapshotRequest;

use crate::auth::AuthUser;
use crate::errors::HttpResult;
use crate::routes::ensure_vo_membership;
use crate::state::Server;

#[derive(Deserialize)]
pub struct VoQuery {
    vo: String,
}

#[get("/v1/snapshots")]
pub async fn list(server: web::Data<Server>, auth: AuthUser, query: web::Query<VoQuery>) -> HttpResult<HttpResponse> {
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let images = server
        .snapshots
        .list(&query.vo, &auth.0.subject)
        .await
        .map_err(crate::errors::HttpError)?;
    Ok(HttpResponse::Ok().json(images))
}

#[derive(Deserialize)]
pub struct CreateBody {
    vo: String,
    deployment_uuid: Uuid,
    title: String,
    description: String,
}

#[post("/v1/snapshots")]
pub async fn create(server: web::Data<Server>, auth: AuthUser, body: web::Json<CreateBody>) -> HttpResult<HttpResponse> {
    let body = body.into_inner();
    ensure_vo_membership(&server, &auth.0, &body.vo)?;
    let req = SnapshotRequest {
        owner: auth.0.subject.clone(),
        owner_email: auth.0.email.clone(),
        vo: body.vo,
        deployment_uuid: body.deployment_uuid,
        title: body.title,
        description: body.description,
    };
    let template = server.templates.snapshot_batch_template();
    let snapshot = server.snapshots.create(req, template).await.map_err(crate::errors::HttpError)?;
    Ok(HttpResponse::Created().json(snapshot))
}

#[delete("/v1/snapshots/{tag}")]
pub async fn delete(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<String>,
    query: web::Query<VoQuery>,
) -> HttpResult<HttpResponse> {
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    server
        .snapshots
        .delete(&query.vo, &auth.0.subject, &path.into_inner())
        .await
        .map_err(crate::errors::HttpError)?;
    Ok(HttpResponse::NoContent().finish())
}
