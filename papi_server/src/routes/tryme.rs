//! C7 — Try-Me Controller routes: same `DeploymentController` protocol as
//! regular deployments, gated by the per-user/per-VO concurrency cap
//! (spec.md §4.7, S5) before `create` is attempted.

use actix_web::{delete, get, post, web, HttpResponse};
use serde_derive::Deserialize;
use uuid::Uuid;

use papi_definitions::check_tryme_concurrency;
use papi_definitions::workload::{UserConfig, WorkloadKind};

use crate::auth::AuthUser;
use crate::errors::{HttpError, HttpResult};
use crate::routes::ensure_vo_membership;
use crate::state::Server;

#[derive(Deserialize)]
pub struct ListQuery {
    vo: String,
}

#[get("/v1/try_me/{kind}")]
pub async fn list(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> HttpResult<HttpResponse> {
    let kind: WorkloadKind = path.parse().map_err(HttpError)?;
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let deployments = server
        .tryme
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

#[post("/v1/try_me/{kind}")]
pub async fn create(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<String>,
    body: web::Json<CreateBody>,
) -> HttpResult<HttpResponse> {
    let kind: WorkloadKind = path.parse().map_err(HttpError)?;
    let body = body.into_inner();
    ensure_vo_membership(&server, &auth.0, &body.vo)?;

    let vo_mapping = server.config.vo.get(&body.vo).ok_or_else(|| {
        HttpError(papi_definitions::error::ErrorKind::BadRequest(format!("unknown VO '{}'", body.vo)).into())
    })?;
    check_tryme_concurrency(
        server.tryme.scheduler(),
        &vo_mapping.namespace,
        &auth.0.subject,
        server.config.caps.tryme_per_user,
        server.config.caps.tryme_per_vo,
    )
    .await
    .map_err(HttpError)?;

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
    let result = server.tryme.create(req, template).await.map_err(HttpError)?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "uuid": result.uuid,
        "endpoints": result.endpoints,
    })))
}

#[delete("/v1/try_me/{kind}/{uuid}")]
pub async fn delete(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<(String, Uuid)>,
) -> HttpResult<HttpResponse> {
    let (_kind, uuid) = path.into_inner();
    server
        .tryme
        .delete(&auth.0.subject, &auth.0.email, &uuid)
        .await
        .map_err(HttpError)?;
    Ok(HttpResponse::NoContent().finish())
}
