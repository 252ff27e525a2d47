//! C10 — LLM Proxy & Catalog routes. The proxy streams the upstream
//! gateway's response straight back through the HTTP edge unchanged
//! (spec.md §4.10).

use actix_web::{get, post, web, HttpResponse};
use futures_util::TryStreamExt;
use serde_derive::Deserialize;

use crate::auth::AuthUser;
use crate::errors::{HttpError, HttpResult};
use crate::state::Server;

#[get("/v1/llm/models")]
pub async fn list_models(server: web::Data<Server>, _auth: AuthUser) -> HttpResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(server.llm_catalog.list()))
}

#[derive(Deserialize)]
pub struct ProxyBody {
    model: String,
    #[serde(flatten)]
    rest: serde_json::Value,
}

#[post("/v1/llm/proxy")]
pub async fn proxy(server: web::Data<Server>, auth: AuthUser, body: web::Json<ProxyBody>) -> HttpResult<HttpResponse> {
    let body = body.into_inner();
    server
        .llm_catalog
        .check_access(&body.model, &auth.0.entitlements)
        .map_err(HttpError)?;
    let upstream = server.llm_gateway.forward(&body.model, body.rest).await.map_err(HttpError)?;
    let status = actix_web::http::StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);
    let stream = upstream.bytes_stream().map_err(|e| actix_web::error::ErrorBadGateway(e.to_string()));
    Ok(HttpResponse::build(status).streaming(stream))
}
