//! C5 — Deployment Controller routes (module/tool/batch-inference/
//! function-service deployments; try-me and snapshots get their own route
//! modules since they have distinct semantics — spec.md §6).

use actix_web::{delete, get, post, web, HttpResponse};
use serde_derive::Deserialize;
use uuid::Uuid;

use papi_definitions::workload::{UserConfig, WorkloadKind};

use crate::auth::AuthUser;
use crate::errors::{HttpError, HttpResult};
use crate::routes::ensure_vo_membership;
use crate::state::Server;

#[derive(Deserialize)]
pub struct ListQuery {
    vo: String,
}

#[get("/v1/deployments/{kind}")]
pub async fn list(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> HttpResult<HttpResponse> {
    let kind: WorkloadKind = path.parse().map_err(HttpError)?;
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let deployments = server
        .deployments
        .list(&auth.0.subject, &query.vo, Some(&[kind]))
        .await
        .map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(deployments))
}

#[derive(Deserialize)]
pub struct CreateBody {
    vo: String,
    name: String,
    #[serde(flatten)]
    config: UserConfig,
}

#[post("/v1/deployments/{kind}")]
pub async fn create(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<String>,
    body: web::Json<CreateBody>,
) -> HttpResult<HttpResponse> {
    let kind: WorkloadKind = path.parse().map_err(HttpError)?;
    let body = body.into_inner();
    ensure_vo_membership(&server, &auth.0, &body.vo)?;

    let req = papi_definitions::deployment::CreateRequest {
        owner: auth.0.subject.clone(),
        owner_name: auth.0.name.clone(),
        owner_email: auth.0.email.clone(),
        vo: body.vo,
        kind,
        name: body.name,
        config: body.config,
    };
    let template = server.templates.job_template(kind);
    let result = server.deployments.create(req, template).await.map_err(HttpError)?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "uuid": result.uuid,
        "endpoints": result.endpoints,
    })))
}

#[derive(Deserialize)]
pub struct GetQuery {
    vo: String,
}

#[get("/v1/deployments/{kind}/{uuid}")]
pub async fn get(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<(String, Uuid)>,
    query: web::Query<GetQuery>,
) -> HttpResult<HttpResponse> {
    let (kind, uuid) = path.into_inner();
    let kind: WorkloadKind = kind.parse().map_err(HttpError)?;
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let deployment = server
        .deployments
        .get(&auth.0.subject, &query.vo, kind, &uuid)
        .await
        .map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(deployment))
}

#[delete("/v1/deployments/{kind}/{uuid}")]
pub async fn delete(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<(String, Uuid)>,
) -> HttpResult<HttpResponse> {
    let (_kind, uuid) = path.into_inner();
    server
        .deployments
        .delete(&auth.0.subject, &auth.0.email, &uuid)
        .await
        .map_err(HttpError)?;
    Ok(HttpResponse::NoContent().finish())
}
