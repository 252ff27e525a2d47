//! C4 — Secrets Broker routes. Path scoping to the caller's own subtree is
//! enforced inside `SecretsBroker`; these handlers only resolve the VO's
//! `secret_root` and forward the caller's subject (spec.md §4.4).

use actix_web::{delete, get, post, web, HttpResponse};
use serde_derive::Deserialize;

use crate::auth::AuthUser;
use crate::errors::{HttpError, HttpResult};
use crate::routes::ensure_vo_membership;
use crate::state::Server;

#[derive(Deserialize)]
pub struct VoQuery {
    vo: String,
    #[serde(default)]
    path: String,
}

fn secret_root(server: &Server, vo: &str) -> HttpResult<String> {
    server
        .config
        .vo
        .get(vo)
        .map(|m| m.secret_root.clone())
        .ok_or_else(|| HttpError(papi_definitions::error::ErrorKind::BadRequest(format!("unknown VO '{}'", vo)).into()))
}

#[get("/v1/secrets")]
pub async fn list(server: web::Data<Server>, auth: AuthUser, query: web::Query<VoQuery>) -> HttpResult<HttpResponse> {
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let root = secret_root(&server, &query.vo)?;
    let keys = server
        .secrets
        .list(&root, &query.vo, &auth.0.subject, &query.path)
        .await
        .map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(keys))
}

#[get("/v1/secrets/{path:.*}")]
pub async fn get(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<String>,
    query: web::Query<VoQueryNoPath>,
) -> HttpResult<HttpResponse> {
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let root = secret_root(&server, &query.vo)?;
    let value = server
        .secrets
        .get(&root, &query.vo, &auth.0.subject, &path.into_inner())
        .await
        .map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "value": value })))
}

#[derive(Deserialize)]
pub struct VoQueryNoPath {
    vo: String,
}

#[derive(Deserialize)]
pub struct PutBody {
    vo: String,
    value: String,
}

#[post("/v1/secrets/{path:.*}")]
pub async fn put(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<String>,
    body: web::Json<PutBody>,
) -> HttpResult<HttpResponse> {
    let body = body.into_inner();
    ensure_vo_membership(&server, &auth.0, &body.vo)?;
    let root = secret_root(&server, &body.vo)?;
    server
        .secrets
        .put(&root, &body.vo, &auth.0.subject, &path.into_inner(), &body.value)
        .await
        .map_err(HttpError)?;
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/v1/secrets/{path:.*}")]
pub async fn delete(
    server: web::Data<Server>,
    auth: AuthUser,
    path: web::Path<String>,
    query: web::Query<VoQueryNoPath>,
) -> HttpResult<HttpResponse> {
    ensure_vo_membership(&server, &auth.0, &query.vo)?;
    let root = secret_root(&server, &query.vo)?;
    server
        .secrets
        .delete(&root, &query.vo, &auth.0.subject, &path.into_inner())
        .await
        .map_err(HttpError)?;
    Ok(HttpResponse::NoContent().finish())
}
