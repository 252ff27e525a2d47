//! C8 — Function Service Controller routes. Requests are routed to the
//! caller's VO inference endpoint (`VoMapping::inference_endpoint`); the
//! image allow-list check happens inside `FunctionClient` before any
//! outbound call (spec.md §4.8).

use actix_web::{delete, get, post, put, web, HttpResponse};
use serde_derive::Deserialize;

use papi_definitions::function_client::FunctionSpec;

use crate::auth::AuthUser;
use crate::errors::{HttpError, HttpResult};
use crate::routes::ensure_vo_membership;
use crate::state::Server;

#[derive(Deserialize)]
pub struct VoQuery {
    vo: String,
}

fn resolve_endpoint(server: &Server, vo: &str) -> HttpResult<url::Url> {
    server
        .config
        .vo
        .get(vo)
        .map(|m| m.inference_endpoint.clone())
        .ok_or_else(|| HttpError(papi_definitions::error::ErrorKind::BadRequest(format!("unknown VO '{}'", vo)).into()))
}

#[get("/v1/inference")]
pub async fn list(server: web::Data<Server>, auth: AuthUser, query: web::Query<VoQuery>) -> HttpResult<HttpResponse> {
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let endpoint = resolve_endpoint(&server, &query.vo)?;
    let services = server.functions.list(&endpoint, &auth.0.subject).await.map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(services))
}

#[post("/v1/inference")]
pub async fn create(server: web::Data<Server>, auth: AuthUser, body: web::Json<FunctionSpec>) -> HttpResult<HttpResponse> {
    let spec = body.into_inner();
    ensure_vo_membership(&server, &auth.0, &spec.vo)?;
    let endpoint = resolve_endpoint(&server, &spec.vo)?;
    let svc = server.functions.create(&endpoint, &auth.0.subject, &spec).await.map_err(HttpError)?;
    Ok(HttpResponse::Created().json(svc))
}

#[put("/v1/inference/{name}")]
pub async fn update(
    server: web::Data<Server>,
    auth: AuthUser,
    _path: web::Path<String>,
    body: web::Json<FunctionSpec>,
) -> HttpResult<HttpResponse> {
    let spec = body.into_inner();
    ensure_vo_membership(&server, &auth.0, &spec.vo)?;
    let endpoint = resolve_endpoint(&server, &spec.vo)?;
    let svc = server.functions.update(&endpoint, &auth.0.subject, &spec).await.map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(svc))
}

#[delete("/v1/inference/{name}")]
pub async fn delete(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<String>,
    query: web::Query<VoQuery>,
) -> HttpResult<HttpResponse> {
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let endpoint = resolve_endpoint(&server, &query.vo)?;
    server.functions.delete(&endpoint, &path.into_inner()).await.map_err(HttpError)?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/v1/inference/{name}/logs")]
pub async fn logs(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<String>,
    query: web::Query<VoQuery>,
) -> HttpResult<HttpResponse> {
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let endpoint = resolve_endpoint(&server, &query.vo)?;
    let text = server.functions.logs(&endpoint, &path.into_inner()).await.map_err(HttpError)?;
    Ok(HttpResponse::Ok().content_type("text/plain").body(text))
}
