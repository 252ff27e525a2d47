//! C1 — Catalog Resolver routes. Unauthenticated except `refresh`, which
//! requires the admin token configured out of band (spec.md §6 route
//! table: "admin").

use actix_web::{get, post, web, HttpResponse};
use serde_derive::Deserialize;

use papi_definitions::catalog::CatalogBackend;
use papi_definitions::error::ErrorKind;
use papi_definitions::workload::WorkloadKind;

use crate::errors::{HttpError, HttpResult};
use crate::state::Server;

fn parse_kind(raw: &str) -> HttpResult<WorkloadKind> {
    raw.parse().map_err(HttpError)
}

#[get("/v1/catalog/{kind}")]
pub async fn list(server: web::Data<Server>, path: web::Path<String>) -> HttpResult<HttpResponse> {
    let kind = parse_kind(&path)?;
    let names = server.catalog.list(kind).await.map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(names))
}

#[get("/v1/catalog/{kind}/detail")]
pub async fn detail(server: web::Data<Server>, path: web::Path<String>) -> HttpResult<HttpResponse> {
    let kind = parse_kind(&path)?;
    let records = server.catalog.detail(kind).await.map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(records))
}

#[get("/v1/catalog/{kind}/{name}/metadata")]
pub async fn metadata(server: web::Data<Server>, path: web::Path<(String, String)>) -> HttpResult<HttpResponse> {
    let (kind, name) = path.into_inner();
    let kind = parse_kind(&kind)?;
    let item = server.catalog.metadata(kind, &name).await.map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(item))
}

#[get("/v1/catalog/{kind}/{name}/config")]
pub async fn config_schema(server: web::Data<Server>, path: web::Path<(String, String)>) -> HttpResult<HttpResponse> {
    let (kind, name) = path.into_inner();
    let kind = parse_kind(&kind)?;
    let schema = server.catalog.config_template(kind, &name).await.map_err(HttpError)?;
    Ok(HttpResponse::Ok().json(schema))
}

#[derive(Deserialize)]
pub struct RefreshQuery {
    kind: Option<String>,
    name: Option<String>,
}

#[post("/v1/catalog/refresh")]
pub async fn refresh(
    req: actix_web::HttpRequest,
    server: web::Data<Server>,
    query: web::Query<RefreshQuery>,
) -> HttpResult<HttpResponse> {
    let admin_token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    if admin_token != Some(server.config.auth.admin_token.as_str()) || server.config.auth.admin_token.is_empty() {
        return Err(HttpError(ErrorKind::Forbidden("admin token required".into()).into()));
    }
    let kind = query.kind.as_deref().map(parse_kind).transpose()?;
    server
        .catalog
        .refresh(kind, query.name.as_deref())
        .await
        .map_err(HttpError)?;
    Ok(HttpResponse::NoContent().finish())
}
